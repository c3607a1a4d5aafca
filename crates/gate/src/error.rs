//! 准入网关错误定义

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// 拒绝原因
///
/// 精确的原因只写入日志和指标；对外响应中三类凭据错误共用 `invalid_credentials`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// 缺少必需的请求头
    MissingHeaders,
    /// 请求头格式错误（时间戳或用户 ID 不是整数）
    MalformedHeader,
    /// 时间戳超出接受窗口
    TimestampInvalid,
    /// nonce 已被使用
    NonceReused,
    /// 签名无法解码
    MalformedSignature,
    /// 签名不匹配
    InvalidSignature,
    /// 用户不存在
    UnknownUser,
    /// 用户查询失败
    ResolverUnavailable,
    /// nonce 账本已满
    LedgerSaturated,
}

impl RejectReason {
    /// 内部标签，用于日志和指标
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingHeaders => "missing_headers",
            RejectReason::MalformedHeader => "malformed_header",
            RejectReason::TimestampInvalid => "timestamp_invalid",
            RejectReason::NonceReused => "nonce_reused",
            RejectReason::MalformedSignature => "malformed_signature",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::UnknownUser => "unknown_user",
            RejectReason::ResolverUnavailable => "resolver_unavailable",
            RejectReason::LedgerSaturated => "ledger_saturated",
        }
    }

    /// 对外暴露的原因码
    pub fn public_code(&self) -> &'static str {
        match self {
            RejectReason::MalformedSignature
            | RejectReason::InvalidSignature
            | RejectReason::UnknownUser => "invalid_credentials",
            RejectReason::ResolverUnavailable | RejectReason::LedgerSaturated => {
                "service_unavailable"
            }
            other => other.as_str(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RejectReason::MissingHeaders | RejectReason::MalformedHeader => {
                StatusCode::BAD_REQUEST
            }
            RejectReason::TimestampInvalid
            | RejectReason::NonceReused
            | RejectReason::MalformedSignature
            | RejectReason::InvalidSignature
            | RejectReason::UnknownUser => StatusCode::UNAUTHORIZED,
            RejectReason::ResolverUnavailable | RejectReason::LedgerSaturated => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    fn message(&self) -> &'static str {
        match self {
            RejectReason::MissingHeaders => "Missing authentication headers",
            RejectReason::MalformedHeader => "Malformed authentication header",
            RejectReason::TimestampInvalid => "Request timestamp outside accepted window",
            RejectReason::NonceReused => "Request rejected",
            RejectReason::MalformedSignature
            | RejectReason::InvalidSignature
            | RejectReason::UnknownUser => "Authentication failed",
            RejectReason::ResolverUnavailable | RejectReason::LedgerSaturated => {
                "Service temporarily unavailable"
            }
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntoResponse for RejectReason {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.message(),
            "code": status.as_u16(),
            "reason": self.public_code(),
        }));

        (status, body).into_response()
    }
}

/// 时间戳超出窗口
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampOutOfWindow {
    #[error("timestamp {ts} is more than {window}s ahead of {now}")]
    Future { ts: i64, now: i64, window: i64 },

    #[error("timestamp {ts} is more than {window}s behind {now}")]
    Stale { ts: i64, now: i64, window: i64 },
}

/// nonce 准入失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NonceError {
    #[error("nonce has already been used")]
    Reused,

    #[error("nonce ledger is full (capacity {capacity})")]
    Saturated { capacity: usize },
}

impl From<NonceError> for RejectReason {
    fn from(err: NonceError) -> Self {
        match err {
            NonceError::Reused => RejectReason::NonceReused,
            NonceError::Saturated { .. } => RejectReason::LedgerSaturated,
        }
    }
}

/// 签名文本无法按 URL-safe base64 解码
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed signature: {0}")]
pub struct MalformedSignature(pub String);

/// 身份查询失败
#[derive(Error, Debug, Clone)]
#[error("identity lookup failed: {message}")]
pub struct ResolverError {
    pub message: String,
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 网关初始化错误
#[derive(Error, Debug)]
pub enum GateError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 密钥加载错误
    #[error("Secret error: {0}")]
    Secret(String),

    /// Base64 编码/解码错误
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_credential_reasons_share_public_code() {
        let public: Vec<_> = [
            RejectReason::MalformedSignature,
            RejectReason::InvalidSignature,
            RejectReason::UnknownUser,
        ]
        .iter()
        .map(|r| (r.public_code(), r.status(), r.message()))
        .collect();

        assert!(public.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(public[0].0, "invalid_credentials");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(RejectReason::MissingHeaders.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RejectReason::MalformedHeader.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RejectReason::NonceReused.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            RejectReason::ResolverUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RejectReason::LedgerSaturated.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_reject_response_body() {
        let response = RejectReason::UnknownUser.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], 401);
        assert_eq!(json["reason"], "invalid_credentials");
        assert_eq!(json["error"], "Authentication failed");
    }

    #[test]
    fn test_nonce_error_conversion() {
        assert_eq!(
            RejectReason::from(NonceError::Reused),
            RejectReason::NonceReused
        );
        assert_eq!(
            RejectReason::from(NonceError::Saturated { capacity: 4 }),
            RejectReason::LedgerSaturated
        );
    }
}
