//! DC Vitals 主程序入口
//!
//! 域控制器健康检测工具

use clap::Parser;
use dc_vitals::cli::args::{Args, Commands};
use dc_vitals::cli::commands::{
    Command, HostsCommand, InitCommand, RunCommand, ValidateCommand, VersionCommand, EXIT_FAILURE,
    EXIT_OK,
};
use dc_vitals::error::DcVitalsError;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let args = Args::parse();

    // 日志在各命令中按配置初始化
    let code = match execute_command(&args).await {
        Ok(code) => code,
        Err(e) => {
            error!("命令执行失败: {}", e);
            eprintln!("错误: {}", describe_error(&e));
            EXIT_FAILURE
        }
    };

    if code != EXIT_OK {
        std::process::exit(code);
    }
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<i32, DcVitalsError> {
    let command: &dyn Command = match &args.command {
        Commands::Run { .. } => &RunCommand,
        Commands::Hosts { .. } => &HostsCommand,
        Commands::Validate { .. } => &ValidateCommand,
        Commands::Init { .. } => &InitCommand,
        Commands::Version { .. } => &VersionCommand,
    };

    let code = command.execute(args).await?;
    info!("{} v{} 执行完成", dc_vitals::APP_NAME, dc_vitals::VERSION);
    Ok(code)
}

/// 生成面向用户的错误描述
fn describe_error(error: &DcVitalsError) -> String {
    match error {
        DcVitalsError::Discovery(e) => format!("{e}（运行已中止，未执行任何检测）"),
        DcVitalsError::Other(e) => format!("{e:#}"),
        other => other.to_string(),
    }
}
