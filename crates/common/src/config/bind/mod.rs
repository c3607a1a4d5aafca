pub mod http;

pub use crate::config::bind::http::HttpBindConfig;
use serde::{Deserialize, Serialize};

/// 网络绑定配置
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BindConfig {
    /// HTTP 服务绑定配置
    ///
    /// TLS 由前置反向代理终止，服务本身只监听 HTTP。
    #[serde(default)]
    pub http: HttpBindConfig,
}
