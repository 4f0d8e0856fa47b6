//! 外部命令模板与执行
//!
//! 所有远程能力最终都通过一条带占位符的命令完成，调用在此处统一加上超时。

use crate::error::ProbeError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// 命令模板
///
/// 参数中的 `{host}`、`{service}` 等占位符在执行前被替换。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    /// 可执行程序
    pub program: String,
    /// 参数列表
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// 创建命令模板
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    /// 替换占位符，返回参数列表
    ///
    /// # 参数
    /// * `vars` - 占位符名称与取值
    pub fn render_args(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| render_placeholders(arg, vars))
            .collect()
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// 替换字符串中的 `{name}` 占位符
///
/// 一次扫描完成替换，替换进去的值不会再被展开；未知占位符保持原样。
pub fn render_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let placeholder =
        PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("占位符正则无效"));

    placeholder
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// 命令执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// 退出码（被信号终止时为 None）
    pub code: Option<i32>,
    /// 标准输出
    pub stdout: String,
    /// 标准错误
    pub stderr: String,
}

impl CommandOutput {
    /// 命令是否成功退出
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// 标准输出与标准错误合并后的文本
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// 转换为执行失败错误
    pub fn into_failure(self, program: &str) -> ProbeError {
        let message = if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };
        ProbeError::CommandFailed {
            program: program.to_string(),
            code: self.code,
            stderr: message,
        }
    }
}

/// 执行命令模板（单次尝试，带超时）
///
/// 超时后子进程随 future 一起被丢弃并终止。
///
/// # 参数
/// * `template` - 命令模板
/// * `vars` - 占位符取值
/// * `call_timeout` - 超时时间
/// * `operation` - 操作名称，用于错误信息
pub async fn run_command(
    template: &CommandTemplate,
    vars: &[(&str, &str)],
    call_timeout: Duration,
    operation: &str,
) -> Result<CommandOutput, ProbeError> {
    let args = template.render_args(vars);
    debug!("执行命令: {} {}", template.program, args.join(" "));

    let child = Command::new(&template.program)
        .args(&args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match timeout(call_timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ProbeError::Spawn {
                program: template.program.clone(),
                source: e,
            })
        }
        Err(_) => {
            return Err(ProbeError::Timeout {
                operation: operation.to_string(),
                timeout_secs: call_timeout.as_secs(),
            })
        }
    };

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
