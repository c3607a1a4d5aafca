//! addrbook 通用基础设施：配置、错误类型、指标导出

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{AppConfig, LogConfig, ObservabilityConfig};
pub use error::{BaseError, ConfigError, Result};
