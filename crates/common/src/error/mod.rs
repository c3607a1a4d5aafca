//! 错误处理模块
//!
//! 按概念分离的错误类型定义

mod base_error;
mod config_error;

pub use base_error::{BaseError, Result};
pub use config_error::ConfigError;
