use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// HTTP 服务绑定配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpBindConfig {
    /// 域名
    ///
    /// 仅用于日志和对外宣告的 URL。
    #[serde(default = "default_domain_name")]
    pub domain_name: String,

    /// 绑定 IP 地址
    ///
    /// 通常使用 "0.0.0.0" 监听所有接口。
    #[serde(default = "default_ip")]
    pub ip: String,

    /// 绑定端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_domain_name() -> String {
    "localhost".to_string()
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for HttpBindConfig {
    fn default() -> Self {
        Self {
            domain_name: default_domain_name(),
            ip: default_ip(),
            port: default_port(),
        }
    }
}

impl HttpBindConfig {
    /// 解析监听地址
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let ip: IpAddr = self.ip.trim().parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// 对外宣告的基础 URL
    pub fn public_url(&self) -> String {
        format!("http://{}:{}", self.domain_name, self.port)
    }
}
