//! 目标主机定义

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// 一次运行中的目标主机（域控制器）
///
/// 枚举完成后不可变，名称在一次运行中唯一，是结果矩阵的行键。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// 主机名
    pub name: String,
    /// 已解析的地址（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<IpAddr>,
}

impl Host {
    /// 创建只有名称的主机
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    /// 设置已解析的地址
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    /// 外部调用使用的目标：优先使用地址，否则使用主机名
    pub fn target(&self) -> String {
        self.address
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| self.name.clone())
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.address {
            Some(addr) => write!(f, "{} ({})", self.name, addr),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_target_prefers_address() {
        let host = Host::new("DC1").with_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(host.target(), "10.0.0.5");
        assert_eq!(host.to_string(), "DC1 (10.0.0.5)");

        let bare = Host::new("DC2");
        assert_eq!(bare.target(), "DC2");
    }

    #[test]
    fn test_host_deserializes_without_address() {
        let host: Host = toml::from_str(r#"name = "DC1""#).unwrap();
        assert_eq!(host, Host::new("DC1"));
    }
}
