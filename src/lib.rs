//! DC Vitals - 域控制器健康检测工具
//!
//! 枚举一个域中的全部域控制器，对每台主机执行一组探针，输出结果矩阵：
//! - 可达性、运行天数、服务状态、数据库所在卷剩余空间
//! - 外部诊断工具测试、操作系统版本
//! - 依赖可达性的探针在主机不可达时跳过
//! - 单个探针失败不影响其他探针和其他主机
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod inventory;
pub mod logging;
pub mod remote;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, ProbeConfig};
pub use error::{ConfigError, DcVitalsError, DiscoveryError, ProbeError};
pub use health::{CellStatus, Probe, ProbeRunner, ProbeSet, ResultCell, ResultMatrix};
pub use inventory::{Host, HostRegistry};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
