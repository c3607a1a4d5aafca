//! # addrbook
//!
//! 用户与地址簿服务，变更类接口由 HMAC 签名准入网关保护

pub mod service;

// Re-export commonly used types
pub use addrbook_common::config::AppConfig;
pub use service::{HttpRouterService, RegistryHttpService, ServiceManager};
