//! 客户端签名工具
//!
//! 按网关的校验方式生成四个认证头，供客户端和集成测试使用。
//!
//! # Example
//!
//! ```ignore
//! let signer = RequestSigner::new(secret, user_id);
//! let headers = signer.sign("POST", "/address/create", body.as_bytes());
//! let mut request = http.post(url).body(body);
//! for (name, value) in headers.pairs() {
//!     request = request.header(name, value);
//! }
//! ```

use crate::admission::{HEADER_AUTHORIZATION, HEADER_NONCE, HEADER_TIMESTAMP, HEADER_USER_ID};
use crate::codec::{self, CanonicalMessage, SharedSecret};
use crate::timestamp::unix_now;

/// 一次请求的认证头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub timestamp: i64,
    pub nonce: String,
    pub user_id: i64,
    pub signature: String,
}

impl SignedHeaders {
    /// (头名称, 头值) 列表
    pub fn pairs(&self) -> [(&'static str, String); 4] {
        [
            (HEADER_TIMESTAMP, self.timestamp.to_string()),
            (HEADER_NONCE, self.nonce.clone()),
            (HEADER_USER_ID, self.user_id.to_string()),
            (HEADER_AUTHORIZATION, self.signature.clone()),
        ]
    }
}

/// 请求签名器
#[derive(Debug, Clone)]
pub struct RequestSigner {
    secret: SharedSecret,
    user_id: i64,
}

impl RequestSigner {
    pub fn new(secret: SharedSecret, user_id: i64) -> Self {
        Self { secret, user_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// 使用当前时间和新的 UUID v4 nonce 签名
    pub fn sign(&self, method: &str, path: &str, body: &[u8]) -> SignedHeaders {
        let nonce = uuid::Uuid::new_v4().to_string();
        self.sign_with(method, path, body, unix_now(), &nonce)
    }

    /// 使用指定的时间戳和 nonce 签名
    pub fn sign_with(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        timestamp: i64,
        nonce: &str,
    ) -> SignedHeaders {
        let message = CanonicalMessage::for_request(method, path, timestamp, body, nonce);
        SignedHeaders {
            timestamp,
            nonce: nonce.to_owned(),
            user_id: self.user_id,
            signature: codec::sign(&message, &self.secret),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> RequestSigner {
        RequestSigner::new(SharedSecret::new(b"s3cr3t".to_vec()).unwrap(), 9)
    }

    #[test]
    fn test_fresh_nonce_per_request() {
        let signer = signer();
        let a = signer.sign("POST", "/users/get", b"");
        let b = signer.sign("POST", "/users/get", b"");

        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.signature, b.signature);
        assert!(uuid::Uuid::parse_str(&a.nonce).is_ok());
    }

    #[test]
    fn test_signature_verifies() {
        let headers = signer().sign_with("POST", "/address/create", b"{}", 1_700_000_000, "abc123");
        let message = CanonicalMessage::for_request("POST", "/address/create", 1_700_000_000, b"{}", "abc123");
        let secret = SharedSecret::new(b"s3cr3t".to_vec()).unwrap();

        assert!(codec::verify(&message, &headers.signature, &secret).unwrap());
    }

    #[test]
    fn test_pairs() {
        let headers = signer().sign_with("POST", "/users/get", b"", 1_700_000_000, "n");
        let pairs = headers.pairs();

        assert_eq!(pairs[0], ("x-timestamp", "1700000000".to_string()));
        assert_eq!(pairs[1], ("x-nonce", "n".to_string()));
        assert_eq!(pairs[2], ("x-user-id", "9".to_string()));
        assert_eq!(pairs[3].0, "authorization");
    }
}
