//! 命令行接口模块
//!
//! 提供CLI参数解析、命令处理和报告输出功能

pub mod args;
pub mod commands;
pub mod report;

// 重新导出主要类型
pub use args::{Args, Commands, OutputFormat};
pub use commands::{
    Command, HostsCommand, InitCommand, RunCommand, ValidateCommand, VersionCommand, EXIT_FAILURE,
    EXIT_OK, EXIT_PROBLEMS,
};
