//! 签名编解码
//!
//! 规范化消息 + HMAC-SHA256。标签使用 URL-safe、无填充的 base64 编码（43 字符）。
//!
//! # 规范化格式
//!
//! 每个字段写成 `<字节长度>:<字段>,`，按 method、path、timestamp、body、nonce 的顺序拼接：
//!
//! ```text
//! 4:POST,15:/address/create,10:1700000000,26:{"address_street":"Rua A"},6:abc123,
//! ```
//!
//! 长度前缀保证不同的字段组合不会得到相同的字节序列。

use crate::error::{GateError, GateResult, MalformedSignature};
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// 签名标签编码：URL-safe，输出不带填充，解码时填充可有可无
const TAG_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// 进程级共享密钥
///
/// 加载后不可变；`Debug` 输出已脱敏
#[derive(Clone)]
pub struct SharedSecret(Arc<[u8]>);

impl SharedSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> GateResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(GateError::Secret("shared secret must not be empty".to_string()));
        }
        Ok(Self(Arc::from(bytes)))
    }

    /// 从标准 base64 解码
    pub fn from_base64(encoded: &str) -> GateResult<Self> {
        let bytes = STANDARD.decode(encoded)?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC 接受任意长度的密钥
        <HmacSha256 as Mac>::new_from_slice(&self.0)
            .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts keys of any length"))
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED; {} bytes])", self.0.len())
    }
}

/// 规范化签名消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage(Vec<u8>);

impl CanonicalMessage {
    /// 按顺序对任意字段做长度前缀编码
    pub fn from_fields<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let mut buf = Vec::new();
        for field in fields {
            let field = field.as_ref();
            buf.extend_from_slice(field.len().to_string().as_bytes());
            buf.push(b':');
            buf.extend_from_slice(field);
            buf.push(b',');
        }
        Self(buf)
    }

    /// 请求签名消息：method、path（不含 query）、timestamp、body、nonce
    pub fn for_request(method: &str, path: &str, timestamp: i64, body: &[u8], nonce: &str) -> Self {
        let method = method.to_ascii_uppercase();
        let timestamp = timestamp.to_string();
        Self::from_fields([
            method.as_bytes(),
            path.as_bytes(),
            timestamp.as_bytes(),
            body,
            nonce.as_bytes(),
        ])
    }

    /// 登录响应签名消息：`["login", user_id, timestamp]`
    pub fn for_login(user_id: i64, timestamp: i64) -> Self {
        let user_id = user_id.to_string();
        let timestamp = timestamp.to_string();
        Self::from_fields([b"login".as_slice(), user_id.as_bytes(), timestamp.as_bytes()])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// 计算签名标签
pub fn sign(message: &CanonicalMessage, secret: &SharedSecret) -> String {
    let mut mac = secret.mac();
    mac.update(message.as_bytes());
    TAG_ENGINE.encode(mac.finalize().into_bytes())
}

/// 校验签名标签
///
/// 标签无法解码时返回 `MalformedSignature`；比较为常数时间
pub fn verify(
    message: &CanonicalMessage,
    supplied_tag: &str,
    secret: &SharedSecret,
) -> Result<bool, MalformedSignature> {
    let tag = TAG_ENGINE
        .decode(supplied_tag.trim())
        .map_err(|e| MalformedSignature(e.to_string()))?;

    let mut mac = secret.mac();
    mac.update(message.as_bytes());
    Ok(mac.verify_slice(&tag).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"address_street":"Rua A"}"#;

    fn secret() -> SharedSecret {
        SharedSecret::new(b"s3cr3t".to_vec()).unwrap()
    }

    fn message() -> CanonicalMessage {
        CanonicalMessage::for_request("POST", "/address/create", 1_700_000_000, BODY, "abc123")
    }

    #[test]
    fn test_canonical_layout() {
        assert_eq!(
            message().as_bytes(),
            br#"4:POST,15:/address/create,10:1700000000,26:{"address_street":"Rua A"},6:abc123,"#
        );
    }

    #[test]
    fn test_canonical_is_unambiguous() {
        // 朴素的 ':' 拼接下这两组字段会得到同一个字符串
        let a = CanonicalMessage::for_request("POST", "/a:1", 1, b"x", "n");
        let b = CanonicalMessage::for_request("POST", "/a", 1, b"1:x", "n");
        assert_ne!(a, b);
    }

    #[test]
    fn test_method_is_uppercased() {
        let lower = CanonicalMessage::for_request("post", "/address/create", 1_700_000_000, BODY, "abc123");
        assert_eq!(lower, message());
    }

    #[test]
    fn test_sign_then_verify() {
        let tag = sign(&message(), &secret());
        assert_eq!(tag.len(), 43);
        assert!(!tag.contains('='));
        assert!(verify(&message(), &tag, &secret()).unwrap());
    }

    #[test]
    fn test_verify_accepts_padded_tag() {
        let tag = sign(&message(), &secret());
        assert!(verify(&message(), &format!("{tag}="), &secret()).unwrap());
    }

    #[test]
    fn test_single_field_changes_break_signature() {
        let tag = sign(&message(), &secret());
        let ts = 1_700_000_000;

        let tampered = [
            CanonicalMessage::for_request("PUT", "/address/create", ts, BODY, "abc123"),
            CanonicalMessage::for_request("POST", "/address/createx", ts, BODY, "abc123"),
            CanonicalMessage::for_request("POST", "/address/create", ts + 1, BODY, "abc123"),
            CanonicalMessage::for_request(
                "POST",
                "/address/create",
                ts,
                br#"{"address_street":"Rua B"}"#,
                "abc123",
            ),
            CanonicalMessage::for_request("POST", "/address/create", ts, BODY, "abc124"),
        ];

        for message in &tampered {
            assert!(!verify(message, &tag, &secret()).unwrap());
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let tag = sign(&message(), &secret());
        let other = SharedSecret::new(b"another".to_vec()).unwrap();
        assert!(!verify(&message(), &tag, &other).unwrap());
    }

    #[test]
    fn test_malformed_tag() {
        assert!(verify(&message(), "not base64 !!", &secret()).is_err());
        // 标准 base64 字母表中的 '+' '/' 不属于 URL-safe
        assert!(verify(&message(), "ab+/", &secret()).is_err());
    }

    #[test]
    fn test_truncated_tag_is_mismatch() {
        let tag = sign(&message(), &secret());
        assert!(!verify(&message(), &tag[..40], &secret()).unwrap_or(false));
    }

    #[test]
    fn test_shared_secret() {
        assert!(SharedSecret::new(Vec::new()).is_err());
        assert!(SharedSecret::from_base64("czNjcjN0").is_ok());
        assert!(SharedSecret::from_base64("!!!").is_err());

        let debug = format!("{:?}", secret());
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_login_message() {
        let message = CanonicalMessage::for_login(7, 1_700_000_000);
        assert_eq!(message.as_bytes(), b"5:login,1:7,10:1700000000,");
    }
}
