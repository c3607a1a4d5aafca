//! axum 中间件
//!
//! 被保护路由的请求体只读取一次，准入通过后原样挂回请求，供下游 handler 使用。

use crate::admission::{Admission, AdmissionGate};
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

/// 通过准入的用户 ID
///
/// 由 [`require_signature`] 写入请求扩展，handler 直接作为提取器使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i64);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .copied()
            .ok_or_else(|| {
                // 路由未挂载准入中间件
                error!("AuthenticatedUser requested on a route without the admission gate");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error",
                        "code": StatusCode::INTERNAL_SERVER_ERROR.as_u16()
                    })),
                )
                    .into_response()
            })
    }
}

/// 签名准入中间件
pub async fn require_signature(
    State(gate): State<AdmissionGate>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let bytes = match to_bytes(body, gate.max_body_bytes()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = parts.uri.path(), "Failed to read request body: {}", e);
            let status = StatusCode::PAYLOAD_TOO_LARGE;
            return (
                status,
                Json(json!({
                    "error": "Request body too large or unreadable",
                    "code": status.as_u16()
                })),
            )
                .into_response();
        }
    };

    match gate
        .admit_parts(&parts.method, &parts.uri, &parts.headers, bytes.clone())
        .await
    {
        Admission::Accept { user_id } => {
            parts.extensions.insert(AuthenticatedUser(user_id));
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        Admission::Reject { reason } => reason.into_response(),
    }
}

/// 为路由挂载签名准入
///
/// 使用 `route_layer`，未匹配的路径仍返回 404 而不是准入错误
pub fn protect<S>(router: Router<S>, gate: AdmissionGate) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(gate, require_signature))
}
