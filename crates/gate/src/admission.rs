//! 请求准入
//!
//! 按固定顺序执行各项检查，遇到第一个失败立即拒绝：
//!
//! ```text
//! Start → HeadersExtracted → TimestampOK → NonceAdmitted → SignatureOK → IdentityConfirmed
//! ```
//!
//! nonce 在签名校验之前登记，因此即使后续步骤失败，该 nonce 也已被消耗。

use crate::codec::{self, CanonicalMessage, SharedSecret};
use crate::config::GateConfig;
use crate::error::{RejectReason, ResolverError};
use crate::ledger::NonceLedger;
use crate::metrics;
use crate::timestamp::{TimestampGuard, unix_now};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use std::sync::Arc;
use tracing::{debug, warn};

pub const HEADER_TIMESTAMP: &str = "x-timestamp";
pub const HEADER_NONCE: &str = "x-nonce";
pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_AUTHORIZATION: &str = "authorization";

/// `Authorization` 头可选的方案前缀
pub const SIGNATURE_SCHEME: &str = "HMAC ";

/// 身份查询能力
///
/// 网关只需要确认用户是否存在
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn user_exists(&self, user_id: i64) -> Result<bool, ResolverError>;
}

/// 待准入的签名请求（仅在请求期间存在）
#[derive(Clone)]
pub struct SignedRequest {
    pub method: String,
    /// 不含 query string
    pub path: String,
    pub timestamp: i64,
    pub body: Bytes,
    pub nonce: String,
    pub claimed_user_id: i64,
    pub supplied_signature: String,
}

impl std::fmt::Debug for SignedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("timestamp", &self.timestamp)
            .field("body_len", &self.body.len())
            .field("nonce", &self.nonce)
            .field("claimed_user_id", &self.claimed_user_id)
            .finish_non_exhaustive()
    }
}

impl SignedRequest {
    /// 从 HTTP 请求各部分提取
    ///
    /// 缺少或为空的头返回 `MissingHeaders`，时间戳或用户 ID 非整数返回 `MalformedHeader`
    pub fn from_parts(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Self, RejectReason> {
        let timestamp = required_header(headers, HEADER_TIMESTAMP)?;
        let nonce = required_header(headers, HEADER_NONCE)?;
        let user_id = required_header(headers, HEADER_USER_ID)?;
        let authorization = required_header(headers, HEADER_AUTHORIZATION)?;

        let timestamp = timestamp
            .parse::<i64>()
            .map_err(|_| RejectReason::MalformedHeader)?;
        let claimed_user_id = user_id
            .parse::<i64>()
            .map_err(|_| RejectReason::MalformedHeader)?;

        let signature = authorization
            .strip_prefix(SIGNATURE_SCHEME)
            .unwrap_or(authorization)
            .trim();
        if signature.is_empty() {
            return Err(RejectReason::MissingHeaders);
        }

        Ok(Self {
            method: method.as_str().to_owned(),
            path: uri.path().to_owned(),
            timestamp,
            body,
            nonce: nonce.to_owned(),
            claimed_user_id,
            supplied_signature: signature.to_owned(),
        })
    }

    pub fn canonical_message(&self) -> CanonicalMessage {
        CanonicalMessage::for_request(
            &self.method,
            &self.path,
            self.timestamp,
            &self.body,
            &self.nonce,
        )
    }
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, RejectReason> {
    let value = headers.get(name).ok_or(RejectReason::MissingHeaders)?;
    let value = value.to_str().map_err(|_| RejectReason::MalformedHeader)?.trim();
    if value.is_empty() {
        return Err(RejectReason::MissingHeaders);
    }
    Ok(value)
}

/// 准入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept { user_id: i64 },
    Reject { reason: RejectReason },
}

impl Admission {
    pub fn is_accept(&self) -> bool {
        matches!(self, Admission::Accept { .. })
    }
}

/// 准入状态机的阶段，用于日志定位失败位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Start,
    HeadersExtracted,
    TimestampOk,
    NonceAdmitted,
    SignatureOk,
    IdentityConfirmed,
}

/// 请求准入网关
#[derive(Clone)]
pub struct AdmissionGate {
    secret: SharedSecret,
    guard: TimestampGuard,
    ledger: Arc<NonceLedger>,
    resolver: Arc<dyn IdentityResolver>,
    max_body_bytes: usize,
}

impl AdmissionGate {
    pub fn new(
        secret: SharedSecret,
        guard: TimestampGuard,
        ledger: Arc<NonceLedger>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            secret,
            guard,
            ledger,
            resolver,
            max_body_bytes: crate::config::DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// 从网关配置创建（账本需已启动清理任务）
    pub fn from_config(
        config: &GateConfig,
        secret: SharedSecret,
        ledger: Arc<NonceLedger>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self::new(secret, TimestampGuard::new(config.window()), ledger, resolver)
            .with_max_body_bytes(config.max_body_bytes)
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn ledger(&self) -> &Arc<NonceLedger> {
        &self.ledger
    }

    pub fn secret(&self) -> &SharedSecret {
        &self.secret
    }

    /// 以当前时间做准入决策
    pub async fn admit(&self, request: &SignedRequest) -> Admission {
        self.admit_at(request, unix_now()).await
    }

    /// 以给定时间做准入决策
    pub async fn admit_at(&self, request: &SignedRequest, now: i64) -> Admission {
        let admission = match self.evaluate(request, now).await {
            Ok(user_id) => Admission::Accept { user_id },
            Err((state, reason)) => {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    user_id = request.claimed_user_id,
                    stage = ?state,
                    "Request rejected: {}",
                    reason
                );
                Admission::Reject { reason }
            }
        };

        match admission {
            Admission::Accept { user_id } => {
                debug!(
                    user_id,
                    path = %request.path,
                    stage = ?GateState::IdentityConfirmed,
                    "Request admitted"
                );
                metrics::record_accept();
            }
            Admission::Reject { reason } => metrics::record_reject(reason.as_str()),
        }

        admission
    }

    /// 从 HTTP 请求各部分直接准入
    pub async fn admit_parts(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Admission {
        match SignedRequest::from_parts(method, uri, headers, body) {
            Ok(request) => self.admit(&request).await,
            Err(reason) => {
                warn!(
                    method = %method,
                    path = uri.path(),
                    stage = ?GateState::Start,
                    "Request rejected: {}",
                    reason
                );
                metrics::record_reject(reason.as_str());
                Admission::Reject { reason }
            }
        }
    }

    /// 依次执行各项检查，失败时返回所在阶段和原因
    async fn evaluate(
        &self,
        request: &SignedRequest,
        now: i64,
    ) -> Result<i64, (GateState, RejectReason)> {
        let state = GateState::HeadersExtracted;

        if let Err(e) = self.guard.validate_at(request.timestamp, now) {
            debug!("Timestamp check failed: {}", e);
            return Err((state, RejectReason::TimestampInvalid));
        }
        let state = GateState::TimestampOk;

        self.ledger
            .admit(&request.nonce)
            .map_err(|e| (state, RejectReason::from(e)))?;
        let state = GateState::NonceAdmitted;

        let message = request.canonical_message();
        match codec::verify(&message, &request.supplied_signature, &self.secret) {
            Ok(true) => {}
            Ok(false) => return Err((state, RejectReason::InvalidSignature)),
            Err(e) => {
                debug!("{}", e);
                return Err((state, RejectReason::MalformedSignature));
            }
        }
        let state = GateState::SignatureOk;

        match self.resolver.user_exists(request.claimed_user_id).await {
            Ok(true) => Ok(request.claimed_user_id),
            Ok(false) => Err((state, RejectReason::UnknownUser)),
            Err(e) => {
                warn!("Identity resolver failed: {}", e);
                Err((state, RejectReason::ResolverUnavailable))
            }
        }
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("secret", &self.secret)
            .field("guard", &self.guard)
            .field("ledger_size", &self.ledger.len())
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}
