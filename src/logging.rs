//! 日志系统模块
//!
//! 提供结构化日志配置和管理功能。日志写入标准错误或日志文件，
//! 标准输出留给检测报告。

use crate::config::{GlobalConfig, LogFormat};
use crate::health::ResultMatrix;
use log::LevelFilter;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 初始化失败时的错误信息
    init_error: Option<String>,
}

static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

fn lock_state(state: &Mutex<GlobalLoggingState>) -> MutexGuard<'_, GlobalLoggingState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 无法识别的级别名称回退到 info
fn parse_level(level: &str) -> LevelFilter {
    LevelFilter::from_str(level).unwrap_or(LevelFilter::Info)
}

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 全局日志级别
    pub level: LevelFilter,
    /// 日志文件路径，为空时写入标准错误
    pub file_path: Option<PathBuf>,
    /// 输出格式
    pub format: LogFormat,
    /// 模块级别日志控制
    pub module_levels: BTreeMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            format: LogFormat::Text,
            module_levels: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// 从配置文件的全局段构建日志配置
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            level: parse_level(&global.log_level),
            file_path: global.log_file.clone(),
            format: global.log_format,
            module_levels: global
                .log_modules
                .iter()
                .map(|(module, level)| (module.clone(), parse_level(level)))
                .collect(),
        }
    }
}

/// 日志系统管理器
pub struct LoggingSystem {
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// # 参数
    /// * `config` - 日志配置
    ///
    /// # 返回
    /// * `Result<LoggingSystem, anyhow::Error>` - 初始化结果
    ///
    /// 重复调用不会重复安装 subscriber。
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        Self::setup_logging_with_options(config, false)
    }

    /// 初始化日志系统（带选项）
    ///
    /// # 参数
    /// * `config` - 日志配置
    /// * `force_reinit` - 是否强制重新初始化（主要用于测试）
    pub fn setup_logging_with_options(
        config: LogConfig,
        force_reinit: bool,
    ) -> anyhow::Result<Self> {
        let state_mutex =
            GLOBAL_LOGGING_STATE.get_or_init(|| Mutex::new(GlobalLoggingState::default()));

        {
            let state = lock_state(state_mutex);
            if state.initialized && !force_reinit {
                return match &state.init_error {
                    None => Ok(Self { config }),
                    Some(e) => Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e)),
                };
            }
        }

        let init_result = Self::init_log_tracer().and_then(|_| Self::init_subscriber(&config));

        {
            let mut state = lock_state(state_mutex);
            state.initialized = true;
            state.init_error = init_result.as_ref().err().map(|e| e.to_string());
        }

        init_result?;
        Ok(Self { config })
    }

    /// log crate 到 tracing 的桥接，进程内只安装一次
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        LOG_TRACER_INIT
            .get_or_init(|| LogTracer::init().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    /// 构建环境过滤器：全局级别加模块级别指令
    fn build_env_filter(config: &LogConfig) -> EnvFilter {
        let mut env_filter =
            EnvFilter::from_default_env().add_directive(level_directive(config.level));

        for (module, level) in &config.module_levels {
            match format!("{}={}", module, level_name(*level)).parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(e) => eprintln!("忽略无效的模块日志级别 {module}: {e}"),
            }
        }
        env_filter
    }

    /// 打开日志文件（追加写入），必要时创建父目录
    fn open_log_file(path: &Path) -> anyhow::Result<File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("创建日志目录失败 {}: {}", parent.display(), e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("打开日志文件失败 {}: {}", path.display(), e))
    }

    /// 安装 tracing subscriber
    fn init_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let env_filter = Self::build_env_filter(config);

        let (writer, ansi) = match &config.file_path {
            Some(path) => (
                BoxMakeWriter::new(Mutex::new(Self::open_log_file(path)?)),
                false,
            ),
            None => (BoxMakeWriter::new(std::io::stderr), true),
        };

        let layer = match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            LogFormat::Text => fmt::layer()
                .with_writer(writer)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_ansi(ansi)
                .with_target(false)
                .boxed(),
        };

        match registry().with(env_filter).with(layer).try_init() {
            Ok(()) => {
                tracing::debug!("日志系统初始化完成: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("already been set")
                    || error_msg.contains("already initialized")
                {
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("tracing subscriber初始化失败: {}", error_msg))
                }
            }
        }
    }

    /// 重置日志系统状态（主要用于测试）
    #[cfg(test)]
    pub fn reset_for_testing() {
        if let Some(state_mutex) = GLOBAL_LOGGING_STATE.get() {
            *lock_state(state_mutex) = GlobalLoggingState::default();
        }
    }

    /// 当前生效的日志配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 记录一次运行的汇总，单元格明细由运行器逐条记录
    pub fn run_summary_log(&self, matrix: &ResultMatrix) {
        let summary = matrix.summary();
        let duration_ms = matrix
            .duration()
            .map(|d| d.num_milliseconds())
            .unwrap_or_default();

        match self.config.format {
            LogFormat::Json => {
                let entry = json!({
                    "type": "run_summary",
                    "run_id": matrix.run_id().to_string(),
                    "domain": matrix.domain(),
                    "hosts": summary.hosts,
                    "probes": matrix.columns().len(),
                    "passed": summary.passed,
                    "failed": summary.failed,
                    "skipped": summary.skipped,
                    "errors": summary.errors,
                    "duration_ms": duration_ms,
                });
                tracing::info!("{entry}");
            }
            LogFormat::Text => {
                tracing::info!(
                    "RUN: {} [{}] - {} 台主机, 通过 {}, 失败 {}, 跳过 {}, 错误 {} ({}ms)",
                    matrix.domain(),
                    matrix.run_id(),
                    summary.hosts,
                    summary.passed,
                    summary.failed,
                    summary.skipped,
                    summary.errors,
                    duration_ms
                );
            }
        }
    }
}

/// 将 log::LevelFilter 转换为 tracing 的指令
fn level_directive(level: LevelFilter) -> tracing_subscriber::filter::Directive {
    use tracing_subscriber::filter::{Directive, LevelFilter as TracingLevel};
    match level {
        LevelFilter::Off => Directive::from(TracingLevel::OFF),
        LevelFilter::Error => Directive::from(tracing::Level::ERROR),
        LevelFilter::Warn => Directive::from(tracing::Level::WARN),
        LevelFilter::Info => Directive::from(tracing::Level::INFO),
        LevelFilter::Debug => Directive::from(tracing::Level::DEBUG),
        LevelFilter::Trace => Directive::from(tracing::Level::TRACE),
    }
}

fn level_name(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_logging_system_single_initialization() {
        LoggingSystem::reset_for_testing();

        let result1 = LoggingSystem::setup_logging(LogConfig::default());
        assert!(result1.is_ok());

        // 第二次初始化不会重复安装
        let result2 = LoggingSystem::setup_logging(LogConfig::default());
        assert!(result2.is_ok());
    }

    #[test]
    #[serial]
    fn test_logging_system_force_reinit() {
        LoggingSystem::reset_for_testing();

        let _system = LoggingSystem::setup_logging(LogConfig::default()).unwrap();
        let result = LoggingSystem::setup_logging_with_options(LogConfig::default(), true);
        assert!(result.is_ok());
    }

    #[test]
    #[serial]
    fn test_file_output_creates_log_directory() {
        LoggingSystem::reset_for_testing();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("dc-vitals.log");
        let config = LogConfig {
            file_path: Some(path.clone()),
            format: LogFormat::Json,
            ..Default::default()
        };

        let system = LoggingSystem::setup_logging_with_options(config, true).unwrap();
        assert!(path.exists());
        assert_eq!(system.config().format, LogFormat::Json);
    }

    #[test]
    fn test_from_global_carries_logging_keys() {
        let global: GlobalConfig = toml::from_str(
            r#"
domain = "corp.example.com"
log_level = "warn"
log_file = "dc-vitals.log"
log_format = "json"

[log_modules]
"dc_vitals::remote" = "debug"
"dc_vitals::health" = "nonsense"
"#,
        )
        .unwrap();

        let config = LogConfig::from_global(&global);
        assert_eq!(config.level, LevelFilter::Warn);
        assert_eq!(config.file_path, Some(PathBuf::from("dc-vitals.log")));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.module_levels["dc_vitals::remote"], LevelFilter::Debug);
        assert_eq!(config.module_levels["dc_vitals::health"], LevelFilter::Info);
    }

    #[test]
    fn test_module_directives_are_applied() {
        let mut config = LogConfig::default();
        config
            .module_levels
            .insert("dc_vitals::remote".to_string(), LevelFilter::Debug);

        let filter = LoggingSystem::build_env_filter(&config).to_string();
        assert!(filter.contains("dc_vitals::remote=debug"));
    }
}
