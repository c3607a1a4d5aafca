//! Gate - HMAC 请求准入网关
//!
//! 保护变更类接口免受重放和篡改：
//! 1. 规范化签名消息（method、path、timestamp、body、nonce）与 HMAC-SHA256 校验
//! 2. 带时间窗口的 nonce 账本，同一 nonce 在保留期内只接受一次
//! 3. 准入状态机：请求头提取 → 时间戳 → nonce → 签名 → 身份确认
//!
//! 身份查询通过 [`IdentityResolver`] 注入，网关本身不依赖任何存储。

pub mod admission;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod middleware;
pub mod timestamp;

pub use admission::{
    Admission, AdmissionGate, GateState, HEADER_AUTHORIZATION, HEADER_NONCE, HEADER_TIMESTAMP,
    HEADER_USER_ID, IdentityResolver, SignedRequest,
};
pub use client::{RequestSigner, SignedHeaders};
pub use codec::{CanonicalMessage, SharedSecret, sign, verify};
pub use config::{GateConfig, SecretSource};
pub use error::{
    GateError, GateResult, MalformedSignature, NonceError, RejectReason, ResolverError,
    TimestampOutOfWindow,
};
pub use ledger::{NonceLedger, ReaperHandle};
pub use metrics::register_gate_metrics;
pub use middleware::{AuthenticatedUser, protect, require_signature};
pub use timestamp::{TimestampGuard, unix_now};
