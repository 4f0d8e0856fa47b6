//! 主机注册表
//!
//! 从外部目录查询获得一次运行的目标主机列表。列表要么完整，要么整个运行中止。

use crate::error::DiscoveryError;
use crate::inventory::Host;
use crate::remote::command::run_command;
use crate::remote::CommandTemplate;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 目录查询能力：给定域名，返回域控制器列表
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    async fn discover_controllers(&self, domain: &str) -> Result<Vec<Host>, DiscoveryError>;
}

/// 静态主机列表（来自配置文件）
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    hosts: Vec<Host>,
}

impl StaticDirectory {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl DirectoryLookup for StaticDirectory {
    async fn discover_controllers(&self, _domain: &str) -> Result<Vec<Host>, DiscoveryError> {
        Ok(self.hosts.clone())
    }
}

/// 通过外部命令（如 `nltest /dclist:{domain}`）发现域控制器
#[derive(Debug, Clone)]
pub struct CommandDirectory {
    /// 发现命令
    command: CommandTemplate,
    /// 主机名提取正则
    host_pattern: Regex,
    /// 调用超时
    call_timeout: Duration,
}

impl CommandDirectory {
    /// 创建命令发现器
    ///
    /// # 参数
    /// * `command` - 发现命令模板
    /// * `host_pattern` - 每行输出上匹配的正则，第一个捕获组为主机名
    /// * `call_timeout` - 调用超时
    pub fn new(
        command: CommandTemplate,
        host_pattern: &str,
        call_timeout: Duration,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            command,
            host_pattern: Regex::new(host_pattern)?,
            call_timeout,
        })
    }

    /// 从命令输出中提取主机
    fn parse_hosts(&self, output: &str) -> Vec<Host> {
        output
            .lines()
            .filter_map(|line| self.host_pattern.captures(line))
            .filter_map(|caps| caps.get(1))
            .map(|m| Host::new(m.as_str().trim()))
            .collect()
    }
}

#[async_trait]
impl DirectoryLookup for CommandDirectory {
    async fn discover_controllers(&self, domain: &str) -> Result<Vec<Host>, DiscoveryError> {
        let lookup_failed = |reason: String| DiscoveryError::LookupFailed {
            domain: domain.to_string(),
            reason,
        };

        let output = run_command(
            &self.command,
            &[("domain", domain)],
            self.call_timeout,
            "discovery",
        )
        .await
        .map_err(|e| lookup_failed(e.to_string()))?;

        if !output.success() {
            return Err(lookup_failed(
                output.into_failure(&self.command.program).to_string(),
            ));
        }

        Ok(self.parse_hosts(&output.stdout))
    }
}

/// 主机注册表
pub struct HostRegistry {
    /// 目录查询
    lookup: Arc<dyn DirectoryLookup>,
    /// 目标域
    domain: String,
    /// 主机名过滤（为空表示不过滤）
    include: Vec<String>,
}

impl HostRegistry {
    /// 创建主机注册表
    pub fn new(lookup: Arc<dyn DirectoryLookup>, domain: impl Into<String>) -> Self {
        Self {
            lookup,
            domain: domain.into(),
            include: Vec::new(),
        }
    }

    /// 只保留指定名称的主机（不区分大小写）
    pub fn with_include_filter(mut self, names: Vec<String>) -> Self {
        self.include = names;
        self
    }

    /// 目标域
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// 枚举本次运行的主机
    ///
    /// # 返回
    /// * `Result<Vec<Host>, DiscoveryError>` - 按发现顺序排列的主机；
    ///   查询失败、结果为空或主机名重复时返回错误
    pub async fn enumerate(&self) -> Result<Vec<Host>, DiscoveryError> {
        info!("开始枚举域控制器: {}", self.domain);

        let hosts = self.lookup.discover_controllers(&self.domain).await?;
        debug!("目录查询返回 {} 台主机", hosts.len());

        let mut seen = HashSet::new();
        for host in &hosts {
            if !seen.insert(host.name.to_lowercase()) {
                return Err(DiscoveryError::DuplicateHost {
                    name: host.name.clone(),
                });
            }
        }

        let hosts: Vec<Host> = if self.include.is_empty() {
            hosts
        } else {
            hosts
                .into_iter()
                .filter(|host| {
                    self.include
                        .iter()
                        .any(|name| name.eq_ignore_ascii_case(&host.name))
                })
                .collect()
        };

        if hosts.is_empty() {
            warn!("域 {} 中没有可检测的域控制器", self.domain);
            return Err(DiscoveryError::NoControllers {
                domain: self.domain.clone(),
            });
        }

        info!("共枚举到 {} 台域控制器", hosts.len());
        Ok(hosts)
    }
}
