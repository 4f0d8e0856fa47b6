//! 检测结果数据结构
//!
//! 定义单元格状态、取值和单个 (主机, 探针) 的检测结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 单元格状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    /// 检查通过
    Passed,
    /// 得到了明确的否定结果
    Failed,
    /// 可达性前置条件不满足，未执行
    Skipped,
    /// 外部调用本身失败，没有得到结果
    Error,
}

impl std::fmt::Display for CellStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellStatus::Passed => write!(f, "通过"),
            CellStatus::Failed => write!(f, "失败"),
            CellStatus::Skipped => write!(f, "跳过"),
            CellStatus::Error => write!(f, "错误"),
        }
    }
}

impl CellStatus {
    /// 是否为需要关注的状态
    pub fn is_problem(&self) -> bool {
        matches!(self, CellStatus::Failed | CellStatus::Error)
    }
}

/// 探针取值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ProbeValue {
    /// 整数（天数、百分比）
    Integer(i64),
    /// 文本（服务状态）
    Text(String),
    /// 操作系统版本
    OsVersion { caption: String, version: String },
}

impl std::fmt::Display for ProbeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeValue::Integer(n) => write!(f, "{n}"),
            ProbeValue::Text(s) => write!(f, "{s}"),
            ProbeValue::OsVersion { caption, version } => write!(f, "{caption} ({version})"),
        }
    }
}

/// 单个 (主机, 探针) 的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultCell {
    /// 状态
    pub status: CellStatus,
    /// 取值（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ProbeValue>,
    /// 诊断信息（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
    /// 耗时
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

impl ResultCell {
    /// 创建指定状态的结果
    pub fn new(status: CellStatus) -> Self {
        Self {
            status,
            value: None,
            detail: None,
            checked_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn passed() -> Self {
        Self::new(CellStatus::Passed)
    }

    pub fn failed() -> Self {
        Self::new(CellStatus::Failed)
    }

    /// 前置条件不满足而跳过
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::new(CellStatus::Skipped).with_detail(reason)
    }

    /// 外部调用失败
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(CellStatus::Error).with_detail(message)
    }

    /// 设置取值
    pub fn with_value(mut self, value: ProbeValue) -> Self {
        self.value = Some(value);
        self
    }

    /// 设置诊断信息
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// 设置耗时
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// 获取耗时（毫秒）
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// 取整数值
    pub fn as_integer(&self) -> Option<i64> {
        match self.value {
            Some(ProbeValue::Integer(n)) => Some(n),
            _ => None,
        }
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_status_display() {
        assert_eq!(CellStatus::Passed.to_string(), "通过");
        assert_eq!(CellStatus::Failed.to_string(), "失败");
        assert_eq!(CellStatus::Skipped.to_string(), "跳过");
        assert_eq!(CellStatus::Error.to_string(), "错误");
    }

    #[test]
    fn test_cell_status_is_problem() {
        assert!(!CellStatus::Passed.is_problem());
        assert!(CellStatus::Failed.is_problem());
        assert!(!CellStatus::Skipped.is_problem());
        assert!(CellStatus::Error.is_problem());
    }

    #[test]
    fn test_result_cell_builder_pattern() {
        let cell = ResultCell::failed()
            .with_value(ProbeValue::Text("STOPPED".to_string()))
            .with_detail("服务未运行")
            .with_elapsed(Duration::from_millis(1500));

        assert_eq!(cell.status, CellStatus::Failed);
        assert_eq!(cell.value, Some(ProbeValue::Text("STOPPED".to_string())));
        assert_eq!(cell.detail.as_deref(), Some("服务未运行"));
        assert_eq!(cell.elapsed_ms(), 1500);
    }

    #[test]
    fn test_skipped_and_error_carry_detail() {
        assert_eq!(
            ResultCell::skipped("主机不可达").detail.as_deref(),
            Some("主机不可达")
        );
        let error = ResultCell::error("RPC server unavailable");
        assert_eq!(error.status, CellStatus::Error);
        assert!(error.value.is_none());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(ProbeValue::Integer(25).to_string(), "25");
        assert_eq!(
            ProbeValue::OsVersion {
                caption: "Windows Server 2019".to_string(),
                version: "10.0.17763".to_string(),
            }
            .to_string(),
            "Windows Server 2019 (10.0.17763)"
        );
    }

    #[test]
    fn test_result_cell_serialization() {
        let cell = ResultCell::passed()
            .with_value(ProbeValue::Integer(12))
            .with_elapsed(Duration::from_millis(40));

        let json = serde_json::to_string(&cell).unwrap();
        assert!(json.contains(r#""status":"passed""#));
        assert!(json.contains(r#""value":{"type":"integer","value":12}"#));
        assert!(!json.contains("detail"));

        let back: ResultCell = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_integer(), Some(12));
        assert_eq!(back.elapsed_ms(), 40);
    }
}
