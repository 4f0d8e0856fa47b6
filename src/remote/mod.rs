//! 远程能力模块
//!
//! 每个 trait 封装一种外部查询能力，探针只依赖这些窄接口，
//! 测试中可以替换为伪实现而无需改动运行器。

pub mod backend;
pub mod command;

use crate::error::ProbeError;
use crate::inventory::Host;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 重新导出主要类型
pub use backend::CommandBackend;
pub use command::{run_command, CommandOutput, CommandTemplate};

/// 服务上报的状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState(pub String);

impl ServiceState {
    /// 服务是否处于运行状态
    pub fn is_running(&self) -> bool {
        self.0.eq_ignore_ascii_case("running")
    }

    /// 状态文本
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 远程配置项定位
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigKey {
    /// 键路径
    pub path: String,
    /// 值名称
    pub value: String,
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\\{}", self.path, self.value)
    }
}

/// 卷空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpace {
    /// 可用字节数
    pub free_bytes: u64,
    /// 总字节数
    pub total_bytes: u64,
}

/// 诊断工具执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticOutcome {
    /// 是否通过
    pub passed: bool,
    /// 输出摘要
    pub summary: Option<String>,
}

/// 操作系统信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    /// 系统名称
    pub caption: String,
    /// 版本号
    pub version: String,
}

/// 可达性检测（单次、有界）
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    async fn ping_host(&self, host: &Host) -> Result<bool, ProbeError>;
}

/// 最近启动时间查询
#[async_trait]
pub trait UptimeQuery: Send + Sync {
    async fn query_last_boot(&self, host: &Host) -> Result<DateTime<Utc>, ProbeError>;
}

/// 服务状态查询
#[async_trait]
pub trait ServiceQuery: Send + Sync {
    /// 查询命名服务的状态
    ///
    /// 返回 `Err` 表示没有得到任何应答（拒绝访问、RPC失败等）。
    async fn query_service_state(
        &self,
        host: &Host,
        service: &str,
    ) -> Result<ServiceState, ProbeError>;
}

/// 远程配置读取
#[async_trait]
pub trait RemoteConfigRead: Send + Sync {
    /// 读取配置值，键不存在时返回 `Ok(None)`
    async fn read_config_value(
        &self,
        host: &Host,
        key: &ConfigKey,
    ) -> Result<Option<String>, ProbeError>;
}

/// 卷空间查询
#[async_trait]
pub trait VolumeQuery: Send + Sync {
    async fn query_volume_space(&self, host: &Host, volume: &str)
        -> Result<VolumeSpace, ProbeError>;
}

/// 外部诊断工具调用
#[async_trait]
pub trait DiagnosticInvoker: Send + Sync {
    async fn invoke_diagnostic(
        &self,
        host: &Host,
        test: &str,
    ) -> Result<DiagnosticOutcome, ProbeError>;
}

/// 操作系统信息查询
#[async_trait]
pub trait OsInfoQuery: Send + Sync {
    async fn query_os_info(&self, host: &Host) -> Result<OsInfo, ProbeError>;
}
