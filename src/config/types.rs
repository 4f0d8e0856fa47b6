//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::inventory::Host;
use crate::remote::CommandTemplate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// 主配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    pub global: GlobalConfig,
    /// 主机发现配置
    pub discovery: DiscoveryConfig,
    /// 探针列表（为空时使用标准域控制器检查集）
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
    /// 外部命令模板
    #[serde(default)]
    pub commands: CommandsConfig,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 目标域名
    pub domain: String,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 单次外部调用超时（秒）
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,
    /// 最大并发检测主机数（1 表示顺序执行）
    #[serde(default = "default_max_concurrent_hosts")]
    pub max_concurrent_hosts: usize,
    /// 日志文件路径，未设置时写入标准错误
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// 日志格式
    #[serde(default)]
    pub log_format: LogFormat,
    /// 按模块覆盖日志级别，例如 `"dc_vitals::remote" = "debug"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub log_modules: BTreeMap<String, String>,
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 单行文本
    #[default]
    Text,
    /// 每条记录一个 JSON 对象
    Json,
}

/// 主机发现配置
///
/// 静态主机列表优先；否则执行发现命令并用正则提取主机名。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// 静态主机列表
    #[serde(default)]
    pub hosts: Vec<Host>,
    /// 发现命令，支持 `{domain}` 占位符
    pub command: Option<CommandTemplate>,
    /// 从命令输出的每一行提取主机名的正则（需要一个捕获组）
    #[serde(default = "default_host_pattern")]
    pub host_pattern: String,
}

/// 探针配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeConfig {
    /// 可达性
    Reachability {
        name: Option<String>,
    },
    /// 运行天数
    Uptime {
        name: Option<String>,
        requires_reachability: Option<bool>,
        /// 低于该天数判为失败
        min_days: Option<u64>,
    },
    /// 服务状态
    ServiceStatus {
        name: Option<String>,
        requires_reachability: Option<bool>,
        service: String,
    },
    /// 数据文件所在卷的剩余空间百分比
    DiskFreePercent {
        name: Option<String>,
        requires_reachability: Option<bool>,
        /// 配置键路径
        key_path: String,
        /// 配置值名称
        value_name: String,
        /// 低于该百分比判为失败
        min_free_percent: Option<u8>,
    },
    /// 外部诊断测试
    DiagnosticTest {
        name: Option<String>,
        requires_reachability: Option<bool>,
        test: String,
    },
    /// 操作系统版本
    OsVersion {
        name: Option<String>,
        requires_reachability: Option<bool>,
    },
}

/// 外部命令模板集合
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandsConfig {
    /// 可达性检测
    #[serde(default = "default_ping_command")]
    pub ping: CommandTemplate,
    /// 最近启动时间
    #[serde(default = "default_last_boot_command")]
    pub last_boot: CommandTemplate,
    /// 服务状态
    #[serde(default = "default_service_command")]
    pub service: CommandTemplate,
    /// 远程配置读取
    #[serde(default = "default_config_value_command")]
    pub config_value: CommandTemplate,
    /// 卷空间
    #[serde(default = "default_volume_space_command")]
    pub volume_space: CommandTemplate,
    /// 诊断测试
    #[serde(default = "default_diagnostic_command")]
    pub diagnostic: CommandTemplate,
    /// 操作系统信息
    #[serde(default = "default_os_info_command")]
    pub os_info: CommandTemplate,
    /// 诊断输出中表示通过的正则，支持 `{test}` 占位符
    #[serde(default = "default_diagnostic_pass_pattern")]
    pub diagnostic_pass_pattern: Option<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            ping: default_ping_command(),
            last_boot: default_last_boot_command(),
            service: default_service_command(),
            config_value: default_config_value_command(),
            volume_space: default_volume_space_command(),
            diagnostic: default_diagnostic_command(),
            os_info: default_os_info_command(),
            diagnostic_pass_pattern: default_diagnostic_pass_pattern(),
        }
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_call_timeout() -> u64 {
    10
}
fn default_max_concurrent_hosts() -> usize {
    1
}
fn default_host_pattern() -> String {
    // nltest /dclist 输出: "    DC1.corp.example.com [PDC]  [DS] Site: Default"
    r"^\s*([A-Za-z0-9][A-Za-z0-9.\-]*)\s+\[".to_string()
}

#[cfg(windows)]
fn default_ping_command() -> CommandTemplate {
    CommandTemplate::new("ping", &["-n", "1", "-w", "1000", "{host}"])
}
#[cfg(not(windows))]
fn default_ping_command() -> CommandTemplate {
    CommandTemplate::new("ping", &["-c", "1", "-W", "1", "{host}"])
}
fn default_last_boot_command() -> CommandTemplate {
    CommandTemplate::new(
        "wmic",
        &["/node:{host}", "os", "get", "LastBootUpTime", "/value"],
    )
}
fn default_service_command() -> CommandTemplate {
    CommandTemplate::new("sc", &["\\\\{host}", "query", "{service}"])
}
fn default_config_value_command() -> CommandTemplate {
    CommandTemplate::new("reg", &["query", "\\\\{host}\\{key}", "/v", "{value}"])
}
fn default_volume_space_command() -> CommandTemplate {
    CommandTemplate::new(
        "wmic",
        &[
            "/node:{host}",
            "logicaldisk",
            "where",
            "DeviceID='{volume}'",
            "get",
            "FreeSpace,Size",
            "/value",
        ],
    )
}
fn default_diagnostic_command() -> CommandTemplate {
    CommandTemplate::new("dcdiag", &["/s:{host}", "/test:{test}"])
}
fn default_os_info_command() -> CommandTemplate {
    CommandTemplate::new("wmic", &["/node:{host}", "os", "get", "Caption,Version", "/value"])
}
fn default_diagnostic_pass_pattern() -> Option<String> {
    Some(r"passed test {test}".to_string())
}

/// 标准域控制器检查集
pub fn default_probes() -> Vec<ProbeConfig> {
    let mut probes = vec![
        ProbeConfig::Reachability { name: None },
        ProbeConfig::Uptime {
            name: None,
            requires_reachability: None,
            min_days: None,
        },
    ];
    for service in ["NTDS", "Netlogon", "DNS"] {
        probes.push(ProbeConfig::ServiceStatus {
            name: None,
            requires_reachability: Some(true),
            service: service.to_string(),
        });
    }
    probes.push(ProbeConfig::DiskFreePercent {
        name: None,
        requires_reachability: Some(true),
        key_path: r"HKLM\SYSTEM\CurrentControlSet\Services\NTDS\Parameters".to_string(),
        value_name: "DSA Database file".to_string(),
        min_free_percent: Some(20),
    });
    for test in ["Netlogons", "Replications", "Services", "Advertising", "FsmoCheck"] {
        probes.push(ProbeConfig::DiagnosticTest {
            name: None,
            requires_reachability: None,
            test: test.to_string(),
        });
    }
    probes.push(ProbeConfig::OsVersion {
        name: None,
        requires_reachability: Some(true),
    });
    probes
}

impl ProbeConfig {
    /// 探针在结果矩阵中的列名
    pub fn display_name(&self) -> String {
        match self {
            ProbeConfig::Reachability { name } => {
                name.clone().unwrap_or_else(|| "Reachability".to_string())
            }
            ProbeConfig::Uptime { name, .. } => name.clone().unwrap_or_else(|| "Uptime".to_string()),
            ProbeConfig::ServiceStatus { name, service, .. } => name
                .clone()
                .unwrap_or_else(|| format!("ServiceStatus({service})")),
            ProbeConfig::DiskFreePercent { name, .. } => {
                name.clone().unwrap_or_else(|| "DiskFreePercent".to_string())
            }
            ProbeConfig::DiagnosticTest { name, test, .. } => name
                .clone()
                .unwrap_or_else(|| format!("DiagnosticTest({test})")),
            ProbeConfig::OsVersion { name, .. } => {
                name.clone().unwrap_or_else(|| "OSVersion".to_string())
            }
        }
    }
}

impl Config {
    /// 实际生效的探针列表
    pub fn effective_probes(&self) -> Vec<ProbeConfig> {
        if self.probes.is_empty() {
            default_probes()
        } else {
            self.probes.clone()
        }
    }
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.domain.trim().is_empty() {
        return Err("域名不能为空".to_string());
    }

    if config.global.call_timeout_seconds == 0 {
        return Err("调用超时时间不能为0".to_string());
    }

    if config.global.max_concurrent_hosts == 0 {
        return Err("最大并发主机数不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    for (module, level) in &config.global.log_modules {
        if module.trim().is_empty() {
            return Err("模块日志级别的模块名不能为空".to_string());
        }
        if !valid_log_levels.contains(&level.as_str()) {
            return Err(format!("模块 {module} 的日志级别无效: {level}"));
        }
    }

    // 验证主机发现配置
    let discovery = &config.discovery;
    if discovery.hosts.is_empty() {
        match &discovery.command {
            None => return Err("必须配置静态主机列表或发现命令".to_string()),
            Some(command) if command.program.trim().is_empty() => {
                return Err("发现命令不能为空".to_string())
            }
            Some(_) => {}
        }
        let pattern = Regex::new(&discovery.host_pattern)
            .map_err(|e| format!("主机名正则无效: {e}"))?;
        if pattern.captures_len() < 2 {
            return Err("主机名正则必须包含一个捕获组".to_string());
        }
    }
    for host in &discovery.hosts {
        if host.name.trim().is_empty() {
            return Err("主机名不能为空".to_string());
        }
    }

    // 验证探针配置
    let mut names = HashSet::new();
    for probe in config.effective_probes() {
        let name = probe.display_name();
        if name.trim().is_empty() {
            return Err("探针名称不能为空".to_string());
        }
        if !names.insert(name.clone()) {
            return Err(format!("探针名称重复: {name}"));
        }

        match &probe {
            ProbeConfig::ServiceStatus { service, .. } if service.trim().is_empty() => {
                return Err(format!("探针 {name} 的服务名不能为空"));
            }
            ProbeConfig::DiagnosticTest { test, .. } if test.trim().is_empty() => {
                return Err(format!("探针 {name} 的诊断测试名不能为空"));
            }
            ProbeConfig::DiskFreePercent {
                key_path,
                value_name,
                min_free_percent,
                ..
            } => {
                if key_path.trim().is_empty() || value_name.trim().is_empty() {
                    return Err(format!("探针 {name} 的配置键不能为空"));
                }
                if min_free_percent.is_some_and(|p| p > 100) {
                    return Err(format!("探针 {name} 的剩余空间阈值不能超过100"));
                }
            }
            _ => {}
        }
    }

    let reachability_count = config
        .effective_probes()
        .iter()
        .filter(|p| matches!(p, ProbeConfig::Reachability { .. }))
        .count();
    if reachability_count > 1 {
        return Err("最多只能配置一个可达性探针".to_string());
    }

    // 验证命令模板
    let commands = &config.commands;
    for (label, template) in [
        ("ping", &commands.ping),
        ("last_boot", &commands.last_boot),
        ("service", &commands.service),
        ("config_value", &commands.config_value),
        ("volume_space", &commands.volume_space),
        ("diagnostic", &commands.diagnostic),
        ("os_info", &commands.os_info),
    ] {
        if template.program.trim().is_empty() {
            return Err(format!("命令模板 {label} 的程序不能为空"));
        }
    }
    if let Some(pattern) = &commands.diagnostic_pass_pattern {
        Regex::new(&pattern.replace("{test}", "x"))
            .map_err(|e| format!("诊断通过规则无效: {e}"))?;
    }

    Ok(())
}
