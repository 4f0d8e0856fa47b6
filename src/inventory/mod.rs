//! 主机清单模块
//!
//! 提供目标主机定义、目录查询接口和主机注册表

pub mod host;
pub mod registry;

use crate::config::Config;
use crate::error::ConfigError;
use std::sync::Arc;
use std::time::Duration;

// 重新导出主要类型
pub use host::Host;
pub use registry::{CommandDirectory, DirectoryLookup, HostRegistry, StaticDirectory};

/// 根据配置构建主机注册表
///
/// 配置了静态主机时直接使用，否则使用发现命令。
pub fn registry_from_config(config: &Config) -> Result<HostRegistry, ConfigError> {
    let discovery = &config.discovery;
    let lookup: Arc<dyn DirectoryLookup> = if !discovery.hosts.is_empty() {
        Arc::new(StaticDirectory::new(discovery.hosts.clone()))
    } else {
        let command = discovery
            .command
            .clone()
            .ok_or_else(|| ConfigError::ValidationError("未配置主机发现来源".to_string()))?;
        let directory = CommandDirectory::new(
            command,
            &discovery.host_pattern,
            Duration::from_secs(config.global.call_timeout_seconds),
        )
        .map_err(|e| ConfigError::ValidationError(format!("主机名正则无效: {e}")))?;
        Arc::new(directory)
    };

    Ok(HostRegistry::new(lookup, config.global.domain.clone()))
}
