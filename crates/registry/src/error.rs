//! Registry 服务错误定义

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Registry 服务错误类型
#[derive(Error, Debug)]
pub enum RegistryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 字段校验失败
    #[error("Validation error: {0}")]
    Validation(String),

    /// 无效的请求参数
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 邮箱或密码错误
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// 记录已存在（邮箱重复、用户已有地址）
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 记录不存在
    #[error("Not found: {0}")]
    NotFound(String),

    /// 密码哈希错误
    #[error("Password hash error: {0}")]
    PasswordHash(String),

    /// 迁移错误
    #[error("Migration {version} failed: {source}")]
    Migration {
        version: String,
        #[source]
        source: sqlx::Error,
    },

    /// 内部服务器错误
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            RegistryError::Validation(msg) | RegistryError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            RegistryError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Invalid email or password".to_string(),
            ),
            RegistryError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            RegistryError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            RegistryError::Database(_)
            | RegistryError::PasswordHash(_)
            | RegistryError::Migration { .. }
            | RegistryError::Internal(_) => {
                // 不向客户端暴露内部错误详情
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Registry 结果类型别名
pub type RegistryResult<T> = Result<T, RegistryError>;
