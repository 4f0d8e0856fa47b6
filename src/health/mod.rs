//! 健康检测模块
//!
//! 提供探针定义、探针目录、探针运行器和结果矩阵

pub mod catalog;
pub mod matrix;
pub mod probe;
pub mod result;
pub mod runner;

// 重新导出主要类型
pub use catalog::{build_probe, build_probe_set, implicit_reachability, Capabilities};
pub use matrix::{HostRow, MatrixSummary, ProbeCell, ResultMatrix};
pub use probe::{
    free_percent, uptime_days, volume_of, Clock, DiagnosticTestProbe, DiskFreePercentProbe,
    OsVersionProbe, PathResolver, Probe, ProbeKind, ProbeSet, ReachabilityProbe,
    ServiceStatusProbe, SystemClock, UptimeProbe,
};
pub use result::{CellStatus, ProbeValue, ResultCell};
pub use runner::ProbeRunner;
