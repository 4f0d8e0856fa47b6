//! 探针运行器集成测试
//!
//! 通过替换远程能力的假实现驱动主机注册表和探针运行器

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use dc_vitals::error::{DiscoveryError, ProbeError};
use dc_vitals::health::{
    build_probe_set, implicit_reachability, Capabilities, CellStatus, Clock,
    DiagnosticTestProbe, DiskFreePercentProbe, OsVersionProbe, PathResolver, Probe, ProbeKind,
    ProbeRunner, ProbeSet, ProbeValue, ReachabilityProbe, ResultCell, ServiceStatusProbe,
    UptimeProbe,
};
use dc_vitals::inventory::{DirectoryLookup, Host, HostRegistry, StaticDirectory};
use dc_vitals::remote::{
    ConfigKey, DiagnosticInvoker, DiagnosticOutcome, OsInfo, OsInfoQuery, ReachabilityCheck,
    RemoteConfigRead, ServiceQuery, ServiceState, UptimeQuery, VolumeQuery, VolumeSpace,
};
use dc_vitals::config::{default_probes, ProbeConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()
}

struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// 单台假主机的状态
#[derive(Clone)]
struct FakeHost {
    reachable: Result<bool, String>,
    last_boot: DateTime<Utc>,
    services: HashMap<String, String>,
    database_path: Option<String>,
    space: VolumeSpace,
    diagnostics: HashMap<String, bool>,
}

impl FakeHost {
    fn healthy() -> Self {
        let services = ["NTDS", "Netlogon", "DNS"]
            .iter()
            .map(|s| (s.to_string(), "Running".to_string()))
            .collect();
        Self {
            reachable: Ok(true),
            last_boot: now() - ChronoDuration::hours(36),
            services,
            database_path: Some(r"D:\NTDS\ntds.dit".to_string()),
            space: VolumeSpace {
                free_bytes: 50,
                total_bytes: 200,
            },
            diagnostics: HashMap::new(),
        }
    }

    fn unreachable() -> Self {
        Self {
            reachable: Ok(false),
            ..Self::healthy()
        }
    }
}

/// 所有远程能力的假实现，记录每次调用
#[derive(Default)]
struct FakeDomain {
    hosts: HashMap<String, FakeHost>,
    calls: Mutex<Vec<(String, &'static str)>>,
}

impl FakeDomain {
    fn with_host(mut self, name: &str, host: FakeHost) -> Self {
        self.hosts.insert(name.to_string(), host);
        self
    }

    fn host(&self, host: &Host, capability: &'static str) -> Result<&FakeHost, ProbeError> {
        self.calls
            .lock()
            .unwrap()
            .push((host.name.clone(), capability));
        self.hosts
            .get(&host.name)
            .ok_or_else(|| ProbeError::Unexpected(format!("unknown host {}", host.name)))
    }

    fn calls_for(&self, host: &str) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| *c)
            .collect()
    }
}

#[async_trait]
impl ReachabilityCheck for FakeDomain {
    async fn ping_host(&self, host: &Host) -> Result<bool, ProbeError> {
        self.host(host, "ping")?
            .reachable
            .clone()
            .map_err(ProbeError::Unexpected)
    }
}

#[async_trait]
impl UptimeQuery for FakeDomain {
    async fn query_last_boot(&self, host: &Host) -> Result<DateTime<Utc>, ProbeError> {
        Ok(self.host(host, "last_boot")?.last_boot)
    }
}

#[async_trait]
impl ServiceQuery for FakeDomain {
    async fn query_service_state(
        &self,
        host: &Host,
        service: &str,
    ) -> Result<ServiceState, ProbeError> {
        self.host(host, "service")?
            .services
            .get(service)
            .map(|s| ServiceState(s.clone()))
            .ok_or_else(|| ProbeError::Unexpected(format!("OpenService FAILED 1060: {service}")))
    }
}

#[async_trait]
impl RemoteConfigRead for FakeDomain {
    async fn read_config_value(
        &self,
        host: &Host,
        _key: &ConfigKey,
    ) -> Result<Option<String>, ProbeError> {
        Ok(self.host(host, "config_value")?.database_path.clone())
    }
}

#[async_trait]
impl VolumeQuery for FakeDomain {
    async fn query_volume_space(
        &self,
        host: &Host,
        volume: &str,
    ) -> Result<VolumeSpace, ProbeError> {
        assert_eq!(volume, "D:");
        Ok(self.host(host, "volume_space")?.space)
    }
}

#[async_trait]
impl DiagnosticInvoker for FakeDomain {
    async fn invoke_diagnostic(
        &self,
        host: &Host,
        test: &str,
    ) -> Result<DiagnosticOutcome, ProbeError> {
        let passed = *self
            .host(host, "diagnostic")?
            .diagnostics
            .get(test)
            .unwrap_or(&true);
        Ok(DiagnosticOutcome {
            passed,
            summary: None,
        })
    }
}

#[async_trait]
impl OsInfoQuery for FakeDomain {
    async fn query_os_info(&self, host: &Host) -> Result<OsInfo, ProbeError> {
        self.host(host, "os_info")?;
        Ok(OsInfo {
            caption: "Microsoft Windows Server 2019 Datacenter".to_string(),
            version: "10.0.17763".to_string(),
        })
    }
}

/// 指定主机上会异常终止的探针
struct PanickingProbe {
    on_host: &'static str,
}

#[async_trait]
impl Probe for PanickingProbe {
    fn name(&self) -> &str {
        "Exploding"
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::DiagnosticTest
    }

    async fn evaluate(&self, host: &Host) -> Result<ResultCell, ProbeError> {
        if host.name == self.on_host {
            panic!("probe exploded on {}", host.name);
        }
        Ok(ResultCell::passed())
    }
}

/// 计数的探针
struct CountingProbe {
    calls: AtomicUsize,
}

#[async_trait]
impl Probe for CountingProbe {
    fn name(&self) -> &str {
        "Counting"
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::DiagnosticTest
    }

    fn requires_reachability(&self) -> bool {
        true
    }

    async fn evaluate(&self, _host: &Host) -> Result<ResultCell, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ResultCell::passed())
    }
}

/// 记录同时执行数量峰值的检测
#[derive(Default)]
struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Probe for InFlightGauge {
    fn name(&self) -> &str {
        "InFlight"
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::OsVersion
    }

    async fn evaluate(&self, _host: &Host) -> Result<ResultCell, ProbeError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ResultCell::passed())
    }
}

fn dc1_dc2() -> Arc<FakeDomain> {
    Arc::new(
        FakeDomain::default()
            .with_host("DC1", FakeHost::healthy())
            .with_host("DC2", FakeHost::unreachable()),
    )
}

fn hosts(names: &[&str]) -> Vec<Host> {
    names.iter().map(|n| Host::new(*n)).collect()
}

fn runner(domain: &Arc<FakeDomain>) -> ProbeRunner {
    ProbeRunner::new(Arc::new(ReachabilityProbe::new(domain.clone())))
}

#[tokio::test]
async fn test_reachable_and_unreachable_scenario() {
    let domain = dc1_dc2();
    let probes = ProbeSet::new(vec![
        Arc::new(ReachabilityProbe::new(domain.clone())),
        Arc::new(UptimeProbe::new(domain.clone()).with_clock(Arc::new(FixedClock))),
        Arc::new(ServiceStatusProbe::new("NTDS", domain.clone()).gated(true)),
    ])
    .unwrap();

    let matrix = runner(&domain).run(&hosts(&["DC1", "DC2"]), &probes).await;

    let dc1 = |probe| matrix.get("DC1", probe).unwrap();
    assert_eq!(dc1("Reachability").status, CellStatus::Passed);
    assert_eq!(dc1("Uptime").status, CellStatus::Passed);
    assert_eq!(dc1("Uptime").as_integer(), Some(1));
    assert_eq!(dc1("ServiceStatus(NTDS)").status, CellStatus::Passed);
    assert_eq!(
        dc1("ServiceStatus(NTDS)").value,
        Some(ProbeValue::Text("Running".to_string()))
    );

    let dc2 = |probe| matrix.get("DC2", probe).unwrap();
    assert_eq!(dc2("Reachability").status, CellStatus::Failed);
    assert_eq!(dc2("Uptime").status, CellStatus::Skipped);
    assert_eq!(dc2("ServiceStatus(NTDS)").status, CellStatus::Skipped);

    // 跳过的探针不会调用远程能力
    assert_eq!(domain.calls_for("DC2"), vec!["ping"]);
}

#[tokio::test]
async fn test_matrix_has_one_cell_per_host_and_probe() {
    let domain = Arc::new(
        FakeDomain::default()
            .with_host("DC1", FakeHost::healthy())
            .with_host("DC2", FakeHost::unreachable())
            .with_host("DC3", FakeHost::healthy()),
    );
    let caps = Capabilities::uniform(domain.clone());
    let probes = build_probe_set(&default_probes(), &caps).unwrap();

    let matrix = ProbeRunner::new(implicit_reachability(&caps))
        .with_domain("corp.example.com")
        .run(&hosts(&["DC3", "DC1", "DC2"]), &probes)
        .await;

    let host_order: Vec<_> = matrix.hosts().map(|h| h.name.as_str()).collect();
    assert_eq!(host_order, vec!["DC3", "DC1", "DC2"]);
    assert_eq!(matrix.columns().len(), probes.len());
    for row in matrix.rows() {
        let columns: Vec<_> = row.cells.iter().map(|c| c.probe.clone()).collect();
        assert_eq!(columns, matrix.columns());
    }
    assert_eq!(matrix.summary().cells, 3 * probes.len());
    assert_eq!(matrix.domain(), "corp.example.com");
    assert!(matrix.finished_at().is_some());
}

#[tokio::test]
async fn test_unreachable_host_runs_only_ungated_probes() {
    let domain = dc1_dc2();
    let probes = ProbeSet::new(vec![
        Arc::new(ReachabilityProbe::new(domain.clone())),
        Arc::new(ServiceStatusProbe::new("DNS", domain.clone())),
        Arc::new(DiagnosticTestProbe::new("Replications", domain.clone())),
        Arc::new(OsVersionProbe::new(domain.clone())),
    ])
    .unwrap();

    let matrix = runner(&domain).run(&hosts(&["DC2"]), &probes).await;

    assert_eq!(
        matrix.get("DC2", "DiagnosticTest(Replications)").unwrap().status,
        CellStatus::Skipped
    );
    // 未声明前置条件的探针照常执行
    assert_eq!(
        matrix.get("DC2", "ServiceStatus(DNS)").unwrap().status,
        CellStatus::Passed
    );
    assert_eq!(
        matrix.get("DC2", "OSVersion").unwrap().status,
        CellStatus::Passed
    );
    assert!(!domain.calls_for("DC2").contains(&"diagnostic"));
}

#[tokio::test]
async fn test_implicit_reachability_is_not_recorded() {
    let domain = dc1_dc2();
    let probes = ProbeSet::new(vec![
        Arc::new(UptimeProbe::new(domain.clone()).with_clock(Arc::new(FixedClock))),
    ])
    .unwrap();

    let matrix = runner(&domain).run(&hosts(&["DC1", "DC2"]), &probes).await;

    assert_eq!(matrix.columns(), &["Uptime".to_string()]);
    assert!(matrix.get("DC1", "Reachability").is_none());
    assert_eq!(matrix.get("DC1", "Uptime").unwrap().as_integer(), Some(1));
    assert_eq!(matrix.get("DC2", "Uptime").unwrap().status, CellStatus::Skipped);
    assert_eq!(domain.calls_for("DC1"), vec!["ping", "last_boot"]);
}

#[tokio::test]
async fn test_reachability_error_gates_like_failure() {
    let domain = Arc::new(FakeDomain::default().with_host(
        "DC1",
        FakeHost {
            reachable: Err("ICMP blocked".to_string()),
            ..FakeHost::healthy()
        },
    ));
    let counting = Arc::new(CountingProbe {
        calls: AtomicUsize::new(0),
    });
    let probes = ProbeSet::new(vec![
        Arc::new(ReachabilityProbe::new(domain.clone())),
        counting.clone(),
    ])
    .unwrap();

    let matrix = runner(&domain).run(&hosts(&["DC1"]), &probes).await;

    let reachability = matrix.get("DC1", "Reachability").unwrap();
    assert_eq!(reachability.status, CellStatus::Error);
    assert!(reachability.detail.as_deref().unwrap().contains("ICMP blocked"));
    assert_eq!(matrix.get("DC1", "Counting").unwrap().status, CellStatus::Skipped);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_panicking_probe_is_isolated() {
    let domain = Arc::new(
        FakeDomain::default()
            .with_host("DC1", FakeHost::healthy())
            .with_host("DC2", FakeHost::healthy()),
    );
    let probes = ProbeSet::new(vec![
        Arc::new(OsVersionProbe::new(domain.clone())),
        Arc::new(PanickingProbe { on_host: "DC1" }),
        Arc::new(ServiceStatusProbe::new("NTDS", domain.clone())),
    ])
    .unwrap();

    let matrix = runner(&domain)
        .with_max_concurrent_hosts(2)
        .run(&hosts(&["DC1", "DC2"]), &probes)
        .await;

    let exploded = matrix.get("DC1", "Exploding").unwrap();
    assert_eq!(exploded.status, CellStatus::Error);
    assert!(exploded
        .detail
        .as_deref()
        .unwrap()
        .contains("probe exploded on DC1"));

    // 同一主机的其他探针和其他主机不受影响
    assert_eq!(matrix.get("DC1", "OSVersion").unwrap().status, CellStatus::Passed);
    assert_eq!(
        matrix.get("DC1", "ServiceStatus(NTDS)").unwrap().status,
        CellStatus::Passed
    );
    assert_eq!(matrix.get("DC2", "Exploding").unwrap().status, CellStatus::Passed);
    assert_eq!(matrix.summary().errors, 1);
}

#[tokio::test]
async fn test_probe_errors_are_scoped_to_one_cell() {
    let mut broken = FakeHost::healthy();
    broken.services.remove("DNS");
    broken.database_path = None;
    let domain = Arc::new(
        FakeDomain::default()
            .with_host("DC1", broken)
            .with_host("DC2", FakeHost::healthy()),
    );
    let probes = ProbeSet::new(vec![
        Arc::new(ServiceStatusProbe::new("DNS", domain.clone())),
        Arc::new(DiskFreePercentProbe::new(
            PathResolver::new(r"HKLM\SYSTEM\CurrentControlSet\Services\NTDS\Parameters", "DSA Database file"),
            domain.clone(),
            domain.clone(),
        )),
        Arc::new(ServiceStatusProbe::new("NTDS", domain.clone())),
    ])
    .unwrap();

    let matrix = runner(&domain).run(&hosts(&["DC1", "DC2"]), &probes).await;

    assert_eq!(
        matrix.get("DC1", "ServiceStatus(DNS)").unwrap().status,
        CellStatus::Error
    );
    let disk = matrix.get("DC1", "DiskFreePercent").unwrap();
    assert_eq!(disk.status, CellStatus::Error);
    assert!(disk.detail.as_deref().unwrap().contains("DSA Database file"));
    assert_eq!(
        matrix.get("DC1", "ServiceStatus(NTDS)").unwrap().status,
        CellStatus::Passed
    );

    assert_eq!(
        matrix.get("DC2", "DiskFreePercent").unwrap().as_integer(),
        Some(25)
    );
    assert_eq!(
        matrix.get("DC2", "ServiceStatus(DNS)").unwrap().status,
        CellStatus::Passed
    );
}

#[tokio::test]
async fn test_stopped_service_and_failed_diagnostic_are_failures() {
    let mut degraded = FakeHost::healthy();
    degraded
        .services
        .insert("Netlogon".to_string(), "Stopped".to_string());
    degraded
        .diagnostics
        .insert("Advertising".to_string(), false);
    let domain = Arc::new(FakeDomain::default().with_host("DC1", degraded));

    let configs = vec![
        ProbeConfig::ServiceStatus {
            name: None,
            requires_reachability: None,
            service: "Netlogon".to_string(),
        },
        ProbeConfig::DiagnosticTest {
            name: Some("dcdiag-advertising".to_string()),
            requires_reachability: None,
            test: "Advertising".to_string(),
        },
    ];
    let caps = Capabilities::uniform(domain.clone());
    let probes = build_probe_set(&configs, &caps).unwrap();
    let matrix = ProbeRunner::new(implicit_reachability(&caps))
        .run(&hosts(&["DC1"]), &probes)
        .await;

    let netlogon = matrix.get("DC1", "ServiceStatus(Netlogon)").unwrap();
    assert_eq!(netlogon.status, CellStatus::Failed);
    assert_eq!(netlogon.value, Some(ProbeValue::Text("Stopped".to_string())));
    assert_eq!(
        matrix.get("DC1", "dcdiag-advertising").unwrap().status,
        CellStatus::Failed
    );
    assert!(matrix.has_problems());
}

#[tokio::test]
async fn test_concurrent_hosts_keep_enumeration_order() {
    let mut domain = FakeDomain::default();
    let names: Vec<String> = (1..=8).map(|i| format!("DC{i}")).collect();
    for name in &names {
        domain = domain.with_host(name, FakeHost::healthy());
    }
    let domain = Arc::new(domain);
    let probes = ProbeSet::new(vec![Arc::new(OsVersionProbe::new(domain.clone()))]).unwrap();
    let targets: Vec<Host> = names.iter().map(Host::new).collect();

    let matrix = runner(&domain)
        .with_max_concurrent_hosts(3)
        .run(&targets, &probes)
        .await;

    let order: Vec<_> = matrix.hosts().map(|h| h.name.clone()).collect();
    assert_eq!(order, names);
    assert_eq!(matrix.summary().passed, 8);
}

#[tokio::test]
async fn test_max_concurrent_hosts_bounds_parallel_work() {
    let domain = Arc::new(FakeDomain::default());
    let gauge = Arc::new(InFlightGauge::default());
    let check: Arc<dyn Probe> = gauge.clone();
    let probes = ProbeSet::new(vec![check]).unwrap();
    let targets: Vec<Host> = (1..=10).map(|i| Host::new(format!("DC{i}"))).collect();

    let matrix = runner(&domain)
        .with_max_concurrent_hosts(3)
        .run(&targets, &probes)
        .await;

    let peak = gauge.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "同时检测的主机数超过上限: {peak}");
    assert!(peak > 1, "主机没有并发检测: {peak}");
    assert_eq!(matrix.summary().passed, 10);
}

#[tokio::test]
async fn test_default_runner_checks_one_host_at_a_time() {
    let domain = Arc::new(FakeDomain::default());
    let gauge = Arc::new(InFlightGauge::default());
    let check: Arc<dyn Probe> = gauge.clone();
    let probes = ProbeSet::new(vec![check]).unwrap();
    let targets = hosts(&["DC1", "DC2", "DC3", "DC4"]);

    runner(&domain).run(&targets, &probes).await;

    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_registry_feeds_runner() {
    let domain = dc1_dc2();
    let registry = HostRegistry::new(
        Arc::new(StaticDirectory::new(hosts(&["DC1", "DC2"]))),
        "corp.example.com",
    );
    let targets = assert_ok!(registry.enumerate().await);

    let probes = ProbeSet::new(vec![Arc::new(ReachabilityProbe::new(domain.clone()))]).unwrap();
    let matrix = runner(&domain).run(&targets, &probes).await;
    assert_eq!(matrix.summary().hosts, 2);
}

struct UnavailableDirectory;

#[async_trait]
impl DirectoryLookup for UnavailableDirectory {
    async fn discover_controllers(&self, domain: &str) -> Result<Vec<Host>, DiscoveryError> {
        Err(DiscoveryError::LookupFailed {
            domain: domain.to_string(),
            reason: "ERROR_NO_SUCH_DOMAIN".to_string(),
        })
    }
}

#[tokio::test]
async fn test_discovery_failure_produces_no_matrix() {
    let registry = HostRegistry::new(Arc::new(UnavailableDirectory), "corp.example.com");
    let err = assert_err!(registry.enumerate().await);
    assert!(err.to_string().contains("ERROR_NO_SUCH_DOMAIN"));
}
