//! 基于外部命令的远程能力实现
//!
//! 默认模板面向 Windows 工具链（ping、sc、reg、wmic、dcdiag），
//! 所有模板都可以在配置文件的 `[commands]` 段覆盖。

use crate::config::types::CommandsConfig;
use crate::error::ProbeError;
use crate::inventory::Host;
use crate::remote::command::{render_placeholders, run_command};
use crate::remote::{
    ConfigKey, DiagnosticInvoker, DiagnosticOutcome, OsInfo, OsInfoQuery, ReachabilityCheck,
    RemoteConfigRead, ServiceQuery, ServiceState, UptimeQuery, VolumeQuery, VolumeSpace,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

/// 命令行后端，实现全部远程能力 trait
#[derive(Debug, Clone)]
pub struct CommandBackend {
    /// 命令模板集合
    commands: CommandsConfig,
    /// 单次调用超时
    call_timeout: Duration,
}

impl CommandBackend {
    /// 创建命令行后端
    ///
    /// # 参数
    /// * `commands` - 命令模板集合
    /// * `call_timeout` - 单次外部调用的超时时间
    pub fn new(commands: CommandsConfig, call_timeout: Duration) -> Self {
        Self {
            commands,
            call_timeout,
        }
    }

    /// 诊断通过判定的正则（已代入测试名）
    fn pass_regex(&self, test: &str) -> Result<Option<Regex>, ProbeError> {
        let Some(pattern) = &self.commands.diagnostic_pass_pattern else {
            return Ok(None);
        };
        let rendered = render_placeholders(pattern, &[("test", &regex::escape(test))]);
        RegexBuilder::new(&rendered)
            .case_insensitive(true)
            .build()
            .map(Some)
            .map_err(|e| ProbeError::Unexpected(format!("诊断通过规则无效: {e}")))
    }
}

#[async_trait]
impl ReachabilityCheck for CommandBackend {
    async fn ping_host(&self, host: &Host) -> Result<bool, ProbeError> {
        let target = host.target();
        let output = run_command(
            &self.commands.ping,
            &[("host", &target)],
            self.call_timeout,
            "ping",
        )
        .await?;
        Ok(output.success())
    }
}

#[async_trait]
impl UptimeQuery for CommandBackend {
    async fn query_last_boot(&self, host: &Host) -> Result<DateTime<Utc>, ProbeError> {
        let target = host.target();
        let template = &self.commands.last_boot;
        let output = run_command(template, &[("host", &target)], self.call_timeout, "uptime").await?;
        if !output.success() {
            return Err(output.into_failure(&template.program));
        }
        parse_last_boot(&output.stdout)
    }
}

#[async_trait]
impl ServiceQuery for CommandBackend {
    async fn query_service_state(
        &self,
        host: &Host,
        service: &str,
    ) -> Result<ServiceState, ProbeError> {
        let target = host.target();
        let template = &self.commands.service;
        let output = run_command(
            template,
            &[("host", &target), ("service", service)],
            self.call_timeout,
            "service",
        )
        .await?;
        // 非零退出意味着没有拿到服务的应答
        if !output.success() {
            return Err(output.into_failure(&template.program));
        }
        parse_service_state(&output.stdout)
    }
}

#[async_trait]
impl RemoteConfigRead for CommandBackend {
    async fn read_config_value(
        &self,
        host: &Host,
        key: &ConfigKey,
    ) -> Result<Option<String>, ProbeError> {
        let target = host.target();
        let template = &self.commands.config_value;
        let output = run_command(
            template,
            &[("host", &target), ("key", &key.path), ("value", &key.value)],
            self.call_timeout,
            "config",
        )
        .await?;
        if !output.success() {
            if is_not_found(&output.combined()) {
                return Ok(None);
            }
            return Err(output.into_failure(&template.program));
        }
        Ok(parse_config_value(&output.stdout))
    }
}

#[async_trait]
impl VolumeQuery for CommandBackend {
    async fn query_volume_space(
        &self,
        host: &Host,
        volume: &str,
    ) -> Result<VolumeSpace, ProbeError> {
        let target = host.target();
        let template = &self.commands.volume_space;
        let output = run_command(
            template,
            &[("host", &target), ("volume", volume)],
            self.call_timeout,
            "volume",
        )
        .await?;
        if !output.success() {
            return Err(output.into_failure(&template.program));
        }
        parse_volume_space(&output.stdout)
    }
}

#[async_trait]
impl DiagnosticInvoker for CommandBackend {
    async fn invoke_diagnostic(
        &self,
        host: &Host,
        test: &str,
    ) -> Result<DiagnosticOutcome, ProbeError> {
        let pass_regex = self.pass_regex(test)?;
        let target = host.target();
        let output = run_command(
            &self.commands.diagnostic,
            &[("host", &target), ("test", test)],
            self.call_timeout,
            "diagnostic",
        )
        .await?;

        let pattern_matched = pass_regex
            .map(|re| re.is_match(&output.stdout))
            .unwrap_or(true);

        Ok(DiagnosticOutcome {
            passed: output.success() && pattern_matched,
            summary: last_meaningful_line(&output.stdout),
        })
    }
}

#[async_trait]
impl OsInfoQuery for CommandBackend {
    async fn query_os_info(&self, host: &Host) -> Result<OsInfo, ProbeError> {
        let target = host.target();
        let template = &self.commands.os_info;
        let output = run_command(template, &[("host", &target)], self.call_timeout, "os").await?;
        if !output.success() {
            return Err(output.into_failure(&template.program));
        }
        parse_os_info(&output.stdout)
    }
}

/// 解析 `Key=Value` 形式的输出（键转换为小写）
fn key_values(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn non_empty_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn last_meaningful_line(raw: &str) -> Option<String> {
    non_empty_lines(raw).last().map(str::to_string)
}

fn is_not_found(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("unable to find") || lower.contains("not found") || lower.contains("找不到")
}

fn parse_error(what: &str, raw: &str) -> ProbeError {
    ProbeError::Parse {
        what: what.to_string(),
        raw: raw.trim().to_string(),
    }
}

/// 解析最近启动时间
///
/// 支持 RFC 3339、CIM 日期时间（`yyyymmddHHMMSS.ffffff+zzz`）和 Unix 秒。
pub(crate) fn parse_last_boot(raw: &str) -> Result<DateTime<Utc>, ProbeError> {
    let line = last_meaningful_line(raw).ok_or_else(|| parse_error("启动时间", raw))?;
    let value = match line.split_once('=') {
        Some((_, v)) => v.trim(),
        None => line.as_str(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    static CIM: OnceLock<Regex> = OnceLock::new();
    let cim = CIM.get_or_init(|| {
        Regex::new(r"^(\d{14})\.(\d{6})([+-]\d{3})$").expect("CIM datetime regex")
    });
    if let Some(caps) = cim.captures(value) {
        let local = NaiveDateTime::parse_from_str(&caps[1], "%Y%m%d%H%M%S")
            .map_err(|_| parse_error("启动时间", raw))?;
        let micros: i64 = caps[2].parse().map_err(|_| parse_error("启动时间", raw))?;
        let offset_minutes: i64 = caps[3].parse().map_err(|_| parse_error("启动时间", raw))?;
        let utc = local.and_utc() + ChronoDuration::microseconds(micros)
            - ChronoDuration::minutes(offset_minutes);
        return Ok(utc);
    }

    if let Ok(secs) = value.parse::<i64>() {
        if let Some(dt) = DateTime::<Utc>::from_timestamp(secs, 0) {
            return Ok(dt);
        }
    }

    Err(parse_error("启动时间", raw))
}

/// 解析服务状态（兼容 `sc query` 输出）
pub(crate) fn parse_service_state(raw: &str) -> Result<ServiceState, ProbeError> {
    static STATE: OnceLock<Regex> = OnceLock::new();
    let state = STATE.get_or_init(|| {
        Regex::new(r"(?m)^\s*STATE\s*:\s*\d+\s+(\w+)").expect("service state regex")
    });
    if let Some(caps) = state.captures(raw) {
        return Ok(ServiceState(caps[1].to_string()));
    }
    non_empty_lines(raw)
        .next()
        .map(|line| ServiceState(line.to_string()))
        .ok_or_else(|| parse_error("服务状态", raw))
}

/// 解析配置值（兼容 `reg query` 输出），没有值时返回 None
pub(crate) fn parse_config_value(raw: &str) -> Option<String> {
    static REG_VALUE: OnceLock<Regex> = OnceLock::new();
    let reg_value = REG_VALUE.get_or_init(|| {
        Regex::new(r"(?m)\sREG_\w+\s+(.+?)\s*$").expect("registry value regex")
    });
    if let Some(caps) = reg_value.captures(raw) {
        return Some(caps[1].to_string());
    }
    non_empty_lines(raw).next().map(str::to_string)
}

/// 解析卷空间
pub(crate) fn parse_volume_space(raw: &str) -> Result<VolumeSpace, ProbeError> {
    let pairs = key_values(raw);
    if let (Some(free), Some(size)) = (pairs.get("freespace"), pairs.get("size")) {
        let free_bytes = free.parse().map_err(|_| parse_error("卷空间", raw))?;
        let total_bytes = size.parse().map_err(|_| parse_error("卷空间", raw))?;
        return Ok(VolumeSpace {
            free_bytes,
            total_bytes,
        });
    }

    let numbers: Vec<u64> = raw
        .split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect();
    match numbers.as_slice() {
        [free_bytes, total_bytes] => Ok(VolumeSpace {
            free_bytes: *free_bytes,
            total_bytes: *total_bytes,
        }),
        _ => Err(parse_error("卷空间", raw)),
    }
}

/// 解析操作系统信息
pub(crate) fn parse_os_info(raw: &str) -> Result<OsInfo, ProbeError> {
    let pairs = key_values(raw);
    if let (Some(caption), Some(version)) = (pairs.get("caption"), pairs.get("version")) {
        return Ok(OsInfo {
            caption: caption.clone(),
            version: version.clone(),
        });
    }

    let mut lines = non_empty_lines(raw);
    match (lines.next(), lines.next()) {
        (Some(caption), Some(version)) => Ok(OsInfo {
            caption: caption.to_string(),
            version: version.to_string(),
        }),
        _ => Err(parse_error("系统信息", raw)),
    }
}
