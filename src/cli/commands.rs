//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, ConfigTemplate, OutputFormat};
use crate::cli::report::{render_hosts, render_matrix};
use crate::config::{Config, ConfigLoader, GlobalConfig, TomlConfigLoader};
use crate::error::Result;
use crate::health::{build_probe_set, implicit_reachability, Capabilities, ProbeRunner};
use crate::inventory::registry_from_config;
use crate::logging::{LogConfig, LoggingSystem};
use crate::remote::CommandBackend;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// 正常结束
pub const EXIT_OK: i32 = 0;
/// 运行失败（配置错误、主机发现失败等）
pub const EXIT_FAILURE: i32 = 1;
/// 检测完成但存在失败或错误的单元格
pub const EXIT_PROBLEMS: i32 = 2;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    ///
    /// # 返回
    /// * `Result<i32>` - 进程退出码
    async fn execute(&self, args: &Args) -> Result<i32>;
}

/// 根据命令行参数和配置文件确定日志配置
///
/// 输出位置、格式和模块级别来自配置文件；命令行指定的级别优先于
/// 配置文件中的级别，`--verbose` 至少开启 debug。
pub fn log_config_for(args: &Args, global: Option<&GlobalConfig>) -> LogConfig {
    let mut log_config = global.map(LogConfig::from_global).unwrap_or_default();
    if let Some(level) = &args.log_level {
        log_config.level = level.clone().into();
    }
    if args.verbose && log_config.level < log::LevelFilter::Debug {
        log_config.level = log::LevelFilter::Debug;
    }
    log_config
}

/// 初始化日志系统
pub fn init_logging(
    args: &Args,
    global: Option<&GlobalConfig>,
) -> anyhow::Result<LoggingSystem> {
    LoggingSystem::setup_logging(log_config_for(args, global))
}

/// 加载并验证配置文件
async fn load_config(path: &Path) -> Result<Config> {
    TomlConfigLoader::new(true).load_from_file(path).await
}

/// 把报告写到文件或标准输出
async fn emit(report: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, report).await?;
            info!("报告已写入: {}", path.display());
        }
        None => print!("{report}"),
    }
    Ok(())
}

/// 检测命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Run {
            format,
            output,
            hosts,
            concurrency,
            fail_on_problem,
        } = &args.command
        {
            let config = load_config(&args.get_config_path()).await?;
            let logging = init_logging(args, Some(&config.global))?;

            let mut registry = registry_from_config(&config)?;
            if !hosts.is_empty() {
                registry = registry.with_include_filter(hosts.clone());
            }
            // 主机发现失败时直接中止，不产生部分结果
            let targets = registry.enumerate().await?;

            let caps = Capabilities::from_backend(CommandBackend::new(
                config.commands.clone(),
                Duration::from_secs(config.global.call_timeout_seconds),
            ));
            let probes = build_probe_set(&config.effective_probes(), &caps)?;

            let runner = ProbeRunner::new(implicit_reachability(&caps))
                .with_max_concurrent_hosts(
                    concurrency.unwrap_or(config.global.max_concurrent_hosts),
                )
                .with_domain(registry.domain());
            let matrix = runner.run(&targets, &probes).await;
            logging.run_summary_log(&matrix);

            let report = render_matrix(&matrix, *format)?;
            emit(&report, output.as_deref()).await?;

            if *fail_on_problem && matrix.has_problems() {
                return Ok(EXIT_PROBLEMS);
            }
        }
        Ok(EXIT_OK)
    }
}

/// 主机列表命令
pub struct HostsCommand;

#[async_trait]
impl Command for HostsCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Hosts { format } = &args.command {
            let config = load_config(&args.get_config_path()).await?;
            init_logging(args, Some(&config.global))?;

            let hosts = registry_from_config(&config)?.enumerate().await?;
            print!("{}", render_hosts(&hosts, *format)?);
        }
        Ok(EXIT_OK)
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Validate { config_path } = &args.command {
            init_logging(args, None)?;
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, args.is_verbose())
                .await?;
        }
        Ok(EXIT_OK)
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let config = load_config(config_path).await?;
        let probe_configs = config.effective_probes();

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  目标域: {}", config.global.domain);
            println!("  日志级别: {}", config.global.log_level);
            println!("  调用超时: {}秒", config.global.call_timeout_seconds);
            println!("  主机并发: {}", config.global.max_concurrent_hosts);

            println!("主机发现:");
            if config.discovery.hosts.is_empty() {
                if let Some(command) = &config.discovery.command {
                    println!("  命令: {command}");
                    println!("  主机名正则: {}", config.discovery.host_pattern);
                }
            } else {
                for host in &config.discovery.hosts {
                    println!("  - {host}");
                }
            }

            // 通过目录构建一遍，确保运行时的探针集合与配置一致
            let caps = Capabilities::from_backend(CommandBackend::new(
                config.commands.clone(),
                Duration::from_secs(config.global.call_timeout_seconds),
            ));
            let probes = build_probe_set(&probe_configs, &caps)?;
            let source = if config.probes.is_empty() {
                "标准检查集"
            } else {
                "配置文件"
            };
            println!("探针（{source}）:");
            for (i, probe) in probes.iter().enumerate() {
                println!(
                    "  {}. {}{}",
                    i + 1,
                    probe.name(),
                    if probe.requires_reachability() {
                        " [需要可达]"
                    } else {
                        ""
                    }
                );
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 共 {} 个探针", probe_configs.len());
        }

        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Init {
            config_path,
            force,
            template,
        } = &args.command
        {
            init_logging(args, None)?;
            return self.create_config_file(config_path, *force, *template).await;
        }
        Ok(EXIT_OK)
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(
        &self,
        config_path: &Path,
        force: bool,
        template: ConfigTemplate,
    ) -> Result<i32> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(EXIT_FAILURE);
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(config_path, Self::template_content(template)).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件中的目标域和主机发现方式");

        Ok(EXIT_OK)
    }

    /// 配置模板内容
    fn template_content(template: ConfigTemplate) -> &'static str {
        match template {
            ConfigTemplate::Full => include_str!("../../configs/dc-vitals.toml"),
            ConfigTemplate::Minimal => include_str!("../../configs/minimal.toml"),
        }
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                _ => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(EXIT_OK)
    }
}
