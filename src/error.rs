//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// DC Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum DcVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 主机发现错误（会中止整个运行）
    #[error("主机发现错误: {0}")]
    Discovery(#[from] DiscoveryError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 主机发现错误类型
///
/// 任何一种都意味着主机列表不完整，运行必须立即中止。
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// 目录查询无法完成
    #[error("域 {domain} 的目录查询失败: {reason}")]
    LookupFailed { domain: String, reason: String },

    /// 没有找到任何域控制器
    #[error("域 {domain} 中未找到任何域控制器")]
    NoControllers { domain: String },

    /// 主机名重复
    #[error("主机名重复: {name}")]
    DuplicateHost { name: String },
}

/// 探针错误类型
///
/// 仅作用于单个 (主机, 探针) 单元格，由运行器转换为 `Error` 状态，从不向上传播。
#[derive(Error, Debug)]
pub enum ProbeError {
    /// 外部调用超时
    #[error("{operation} 调用超时 ({timeout_secs}秒)")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    /// 外部命令无法启动
    #[error("无法启动命令 {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 外部命令执行失败
    #[error("命令 {program} 执行失败 (退出码 {code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// 输出无法解析
    #[error("无法解析{what}: {raw}")]
    Parse { what: String, raw: String },

    /// 远程配置项不存在
    #[error("未找到配置项: {key}")]
    ConfigurationNotFound { key: String },

    /// 存储指标无效
    #[error("卷 {volume} 的容量数据无效: 可用 {free_bytes}, 总计 {total_bytes}")]
    InvalidVolumeMetrics {
        volume: String,
        free_bytes: u64,
        total_bytes: u64,
    },

    /// 其他意外失败
    #[error("{0}")]
    Unexpected(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, DcVitalsError>;
