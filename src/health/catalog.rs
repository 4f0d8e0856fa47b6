//! 探针目录
//!
//! 根据配置中的探针描述和一组远程能力构建探针集合

use crate::config::ProbeConfig;
use crate::error::ConfigError;
use crate::health::probe::{
    DiagnosticTestProbe, DiskFreePercentProbe, OsVersionProbe, PathResolver, Probe, ProbeSet,
    ReachabilityProbe, ServiceStatusProbe, UptimeProbe,
};
use crate::remote::{
    CommandBackend, DiagnosticInvoker, OsInfoQuery, ReachabilityCheck, RemoteConfigRead,
    ServiceQuery, UptimeQuery, VolumeQuery,
};
use std::sync::Arc;

/// 探针使用的远程能力集合
#[derive(Clone)]
pub struct Capabilities {
    pub reachability: Arc<dyn ReachabilityCheck>,
    pub uptime: Arc<dyn UptimeQuery>,
    pub services: Arc<dyn ServiceQuery>,
    pub config: Arc<dyn RemoteConfigRead>,
    pub volumes: Arc<dyn VolumeQuery>,
    pub diagnostics: Arc<dyn DiagnosticInvoker>,
    pub os_info: Arc<dyn OsInfoQuery>,
}

impl Capabilities {
    /// 所有能力都由同一个实现提供
    pub fn uniform<T>(backend: Arc<T>) -> Self
    where
        T: ReachabilityCheck
            + UptimeQuery
            + ServiceQuery
            + RemoteConfigRead
            + VolumeQuery
            + DiagnosticInvoker
            + OsInfoQuery
            + 'static,
    {
        Self {
            reachability: backend.clone(),
            uptime: backend.clone(),
            services: backend.clone(),
            config: backend.clone(),
            volumes: backend.clone(),
            diagnostics: backend.clone(),
            os_info: backend,
        }
    }

    /// 基于外部命令的能力
    pub fn from_backend(backend: CommandBackend) -> Self {
        Self::uniform(Arc::new(backend))
    }
}

/// 根据单条配置构建探针
pub fn build_probe(config: &ProbeConfig, caps: &Capabilities) -> Arc<dyn Probe> {
    let name = config.display_name();
    match config {
        ProbeConfig::Reachability { .. } => {
            Arc::new(ReachabilityProbe::new(caps.reachability.clone()).named(name))
        }
        ProbeConfig::Uptime {
            requires_reachability,
            min_days,
            ..
        } => {
            let probe = UptimeProbe::new(caps.uptime.clone())
                .named(name)
                .with_min_days(*min_days);
            Arc::new(match requires_reachability {
                Some(gated) => probe.gated(*gated),
                None => probe,
            })
        }
        ProbeConfig::ServiceStatus {
            requires_reachability,
            service,
            ..
        } => {
            let probe = ServiceStatusProbe::new(service.clone(), caps.services.clone()).named(name);
            Arc::new(match requires_reachability {
                Some(gated) => probe.gated(*gated),
                None => probe,
            })
        }
        ProbeConfig::DiskFreePercent {
            requires_reachability,
            key_path,
            value_name,
            min_free_percent,
            ..
        } => {
            let probe = DiskFreePercentProbe::new(
                PathResolver::new(key_path.clone(), value_name.clone()),
                caps.config.clone(),
                caps.volumes.clone(),
            )
            .named(name)
            .with_min_free_percent(*min_free_percent);
            Arc::new(match requires_reachability {
                Some(gated) => probe.gated(*gated),
                None => probe,
            })
        }
        ProbeConfig::DiagnosticTest {
            requires_reachability,
            test,
            ..
        } => {
            let probe = DiagnosticTestProbe::new(test.clone(), caps.diagnostics.clone()).named(name);
            Arc::new(match requires_reachability {
                Some(gated) => probe.gated(*gated),
                None => probe,
            })
        }
        ProbeConfig::OsVersion {
            requires_reachability,
            ..
        } => {
            let probe = OsVersionProbe::new(caps.os_info.clone()).named(name);
            Arc::new(match requires_reachability {
                Some(gated) => probe.gated(*gated),
                None => probe,
            })
        }
    }
}

/// 根据配置列表构建探针集合，保持配置顺序
pub fn build_probe_set(
    configs: &[ProbeConfig],
    caps: &Capabilities,
) -> Result<ProbeSet, ConfigError> {
    ProbeSet::new(configs.iter().map(|c| build_probe(c, caps)).collect())
}

/// 运行器在未请求可达性探针时隐式使用的可达性探针
pub fn implicit_reachability(caps: &Capabilities) -> Arc<dyn Probe> {
    Arc::new(ReachabilityProbe::new(caps.reachability.clone()))
}
