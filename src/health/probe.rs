//! 探针定义
//!
//! 每个探针只包装一次远程能力调用，并把结果映射为 [`ResultCell`]。
//! 调用失败以 `Err(ProbeError)` 返回，由运行器统一转换为 `Error` 单元格。

use crate::error::{ConfigError, ProbeError};
use crate::health::result::{ProbeValue, ResultCell};
use crate::inventory::Host;
use crate::remote::{
    ConfigKey, DiagnosticInvoker, OsInfoQuery, ReachabilityCheck, RemoteConfigRead, ServiceQuery,
    UptimeQuery, VolumeQuery, VolumeSpace,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// 探针种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Reachability,
    Uptime,
    ServiceStatus,
    DiskFreePercent,
    DiagnosticTest,
    OsVersion,
}

/// 探针trait，定义单台主机上的一项检查
#[async_trait]
pub trait Probe: Send + Sync {
    /// 探针名称（结果矩阵的列键，运行内唯一）
    fn name(&self) -> &str;

    /// 探针种类
    fn kind(&self) -> ProbeKind;

    /// 是否要求主机先通过可达性检测
    fn requires_reachability(&self) -> bool {
        false
    }

    /// 对一台主机执行检查
    ///
    /// # 参数
    /// * `host` - 目标主机
    ///
    /// # 返回
    /// * `Result<ResultCell, ProbeError>` - 检查结果；外部调用失败时返回错误
    async fn evaluate(&self, host: &Host) -> Result<ResultCell, ProbeError>;
}

/// 时钟，用于计算运行时间
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 自上次启动以来的整天数（向下取整）
///
/// 启动时间晚于当前时间（时钟偏差）时按 0 天计。
pub fn uptime_days(last_boot: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last_boot).num_days().max(0)
}

/// 剩余空间百分比，四舍五入到整数
pub fn free_percent(volume: &str, space: VolumeSpace) -> Result<i64, ProbeError> {
    if space.total_bytes == 0 || space.free_bytes > space.total_bytes {
        return Err(ProbeError::InvalidVolumeMetrics {
            volume: volume.to_string(),
            free_bytes: space.free_bytes,
            total_bytes: space.total_bytes,
        });
    }
    let ratio = space.free_bytes as f64 / space.total_bytes as f64;
    Ok((ratio * 100.0).round() as i64)
}

/// 文件路径所在的卷
///
/// Windows 路径取盘符（`C:`），其他路径原样返回，由卷查询自行解析。
pub fn volume_of(path: &str) -> String {
    let path = path.trim();
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        path[..2].to_ascii_uppercase()
    } else {
        path.to_string()
    }
}

/// 可达性探针
pub struct ReachabilityProbe {
    name: String,
    check: Arc<dyn ReachabilityCheck>,
}

impl ReachabilityProbe {
    pub fn new(check: Arc<dyn ReachabilityCheck>) -> Self {
        Self {
            name: "Reachability".to_string(),
            check,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Probe for ReachabilityProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Reachability
    }

    async fn evaluate(&self, host: &Host) -> Result<ResultCell, ProbeError> {
        if self.check.ping_host(host).await? {
            Ok(ResultCell::passed())
        } else {
            Ok(ResultCell::failed().with_detail("主机无响应"))
        }
    }
}

/// 运行天数探针
pub struct UptimeProbe {
    name: String,
    query: Arc<dyn UptimeQuery>,
    clock: Arc<dyn Clock>,
    min_days: Option<u64>,
    requires_reachability: bool,
}

impl UptimeProbe {
    pub fn new(query: Arc<dyn UptimeQuery>) -> Self {
        Self {
            name: "Uptime".to_string(),
            query,
            clock: Arc::new(SystemClock),
            min_days: None,
            requires_reachability: true,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn gated(mut self, requires_reachability: bool) -> Self {
        self.requires_reachability = requires_reachability;
        self
    }

    /// 运行天数低于阈值时判为失败
    pub fn with_min_days(mut self, min_days: Option<u64>) -> Self {
        self.min_days = min_days;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl Probe for UptimeProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Uptime
    }

    fn requires_reachability(&self) -> bool {
        self.requires_reachability
    }

    async fn evaluate(&self, host: &Host) -> Result<ResultCell, ProbeError> {
        let last_boot = self.query.query_last_boot(host).await?;
        let days = uptime_days(last_boot, self.clock.now());
        let cell = match self.min_days {
            Some(min) if (days as u64) < min => ResultCell::failed()
                .with_detail(format!("运行时间少于 {min} 天，最近启动于 {last_boot}")),
            _ => ResultCell::passed(),
        };
        Ok(cell.with_value(ProbeValue::Integer(days)))
    }
}

/// 服务状态探针
pub struct ServiceStatusProbe {
    name: String,
    service: String,
    query: Arc<dyn ServiceQuery>,
    requires_reachability: bool,
}

impl ServiceStatusProbe {
    pub fn new(service: impl Into<String>, query: Arc<dyn ServiceQuery>) -> Self {
        let service = service.into();
        Self {
            name: format!("ServiceStatus({service})"),
            service,
            query,
            requires_reachability: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn gated(mut self, requires_reachability: bool) -> Self {
        self.requires_reachability = requires_reachability;
        self
    }
}

#[async_trait]
impl Probe for ServiceStatusProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::ServiceStatus
    }

    fn requires_reachability(&self) -> bool {
        self.requires_reachability
    }

    async fn evaluate(&self, host: &Host) -> Result<ResultCell, ProbeError> {
        // 查询失败直接返回错误；服务应答了非运行状态才是失败
        let state = self.query.query_service_state(host, &self.service).await?;
        let cell = if state.is_running() {
            ResultCell::passed()
        } else {
            ResultCell::failed().with_detail(format!("服务 {} 未运行", self.service))
        };
        Ok(cell.with_value(ProbeValue::Text(state.0)))
    }
}

/// 数据文件路径解析：读取远程配置值得到文件路径，再映射到所在卷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    pub key: ConfigKey,
}

impl PathResolver {
    pub fn new(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: ConfigKey {
                path: path.into(),
                value: value.into(),
            },
        }
    }

    /// 解析数据文件路径及其所在卷
    ///
    /// # 返回
    /// * `Result<(String, String), ProbeError>` - (文件路径, 卷)；配置项不存在时返回
    ///   `ProbeError::ConfigurationNotFound`
    pub async fn resolve(
        &self,
        host: &Host,
        config: &dyn RemoteConfigRead,
    ) -> Result<(String, String), ProbeError> {
        let path = config
            .read_config_value(host, &self.key)
            .await?
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ProbeError::ConfigurationNotFound {
                key: self.key.to_string(),
            })?;
        let volume = volume_of(&path);
        Ok((path, volume))
    }
}

/// 剩余空间百分比探针
pub struct DiskFreePercentProbe {
    name: String,
    resolver: PathResolver,
    config: Arc<dyn RemoteConfigRead>,
    volumes: Arc<dyn VolumeQuery>,
    min_free_percent: Option<u8>,
    requires_reachability: bool,
}

impl DiskFreePercentProbe {
    pub fn new(
        resolver: PathResolver,
        config: Arc<dyn RemoteConfigRead>,
        volumes: Arc<dyn VolumeQuery>,
    ) -> Self {
        Self {
            name: "DiskFreePercent".to_string(),
            resolver,
            config,
            volumes,
            min_free_percent: None,
            requires_reachability: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn gated(mut self, requires_reachability: bool) -> Self {
        self.requires_reachability = requires_reachability;
        self
    }

    /// 剩余空间低于阈值时判为失败
    pub fn with_min_free_percent(mut self, min_free_percent: Option<u8>) -> Self {
        self.min_free_percent = min_free_percent;
        self
    }
}

#[async_trait]
impl Probe for DiskFreePercentProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::DiskFreePercent
    }

    fn requires_reachability(&self) -> bool {
        self.requires_reachability
    }

    async fn evaluate(&self, host: &Host) -> Result<ResultCell, ProbeError> {
        let (path, volume) = self.resolver.resolve(host, self.config.as_ref()).await?;
        let space = self.volumes.query_volume_space(host, &volume).await?;
        let percent = free_percent(&volume, space)?;

        let cell = match self.min_free_percent {
            Some(min) if percent < i64::from(min) => ResultCell::failed(),
            _ => ResultCell::passed(),
        };
        Ok(cell
            .with_value(ProbeValue::Integer(percent))
            .with_detail(format!("{path} 位于卷 {volume}")))
    }
}

/// 外部诊断测试探针
pub struct DiagnosticTestProbe {
    name: String,
    test: String,
    invoker: Arc<dyn DiagnosticInvoker>,
    requires_reachability: bool,
}

impl DiagnosticTestProbe {
    pub fn new(test: impl Into<String>, invoker: Arc<dyn DiagnosticInvoker>) -> Self {
        let test = test.into();
        Self {
            name: format!("DiagnosticTest({test})"),
            test,
            invoker,
            requires_reachability: true,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn gated(mut self, requires_reachability: bool) -> Self {
        self.requires_reachability = requires_reachability;
        self
    }
}

#[async_trait]
impl Probe for DiagnosticTestProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::DiagnosticTest
    }

    fn requires_reachability(&self) -> bool {
        self.requires_reachability
    }

    async fn evaluate(&self, host: &Host) -> Result<ResultCell, ProbeError> {
        let outcome = self.invoker.invoke_diagnostic(host, &self.test).await?;
        let mut cell = if outcome.passed {
            ResultCell::passed()
        } else {
            ResultCell::failed()
        };
        if let Some(summary) = outcome.summary {
            cell = cell.with_detail(summary);
        }
        Ok(cell)
    }
}

/// 操作系统版本探针
pub struct OsVersionProbe {
    name: String,
    query: Arc<dyn OsInfoQuery>,
    requires_reachability: bool,
}

impl OsVersionProbe {
    pub fn new(query: Arc<dyn OsInfoQuery>) -> Self {
        Self {
            name: "OSVersion".to_string(),
            query,
            requires_reachability: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn gated(mut self, requires_reachability: bool) -> Self {
        self.requires_reachability = requires_reachability;
        self
    }
}

#[async_trait]
impl Probe for OsVersionProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::OsVersion
    }

    fn requires_reachability(&self) -> bool {
        self.requires_reachability
    }

    async fn evaluate(&self, host: &Host) -> Result<ResultCell, ProbeError> {
        let info = self.query.query_os_info(host).await?;
        Ok(ResultCell::passed().with_value(ProbeValue::OsVersion {
            caption: info.caption,
            version: info.version,
        }))
    }
}

/// 一次运行请求的探针集合，名称唯一且保持顺序
#[derive(Clone)]
pub struct ProbeSet {
    probes: Vec<Arc<dyn Probe>>,
}

impl ProbeSet {
    /// 创建探针集合
    ///
    /// # 返回
    /// * `Result<Self, ConfigError>` - 名称重复或包含多个可达性探针时返回错误
    pub fn new(probes: Vec<Arc<dyn Probe>>) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        for probe in &probes {
            if !names.insert(probe.name().to_string()) {
                return Err(ConfigError::ValidationError(format!(
                    "探针名称重复: {}",
                    probe.name()
                )));
            }
        }
        let reachability_count = probes
            .iter()
            .filter(|p| p.kind() == ProbeKind::Reachability)
            .count();
        if reachability_count > 1 {
            return Err(ConfigError::ValidationError(
                "最多只能配置一个可达性探针".to_string(),
            ));
        }
        Ok(Self { probes })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Probe>> {
        self.probes.iter()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// 探针名称（按请求顺序）
    pub fn names(&self) -> Vec<String> {
        self.probes.iter().map(|p| p.name().to_string()).collect()
    }

    /// 请求中的可达性探针
    pub fn reachability(&self) -> Option<&Arc<dyn Probe>> {
        self.probes
            .iter()
            .find(|p| p.kind() == ProbeKind::Reachability)
    }

    /// 是否有探针声明了可达性前置条件
    pub fn any_gated(&self) -> bool {
        self.probes.iter().any(|p| p.requires_reachability())
    }
}

impl std::fmt::Debug for ProbeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeSet")
            .field("probes", &self.names())
            .finish()
    }
}
