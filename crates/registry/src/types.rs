//! Registry 数据类型定义
//!
//! JSON 字段名沿用现有客户端使用的 `user_*` / `address_*` 命名

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: i64,
    #[serde(rename = "user_name")]
    pub name: String,
    #[serde(rename = "user_email")]
    pub email: String,
    #[serde(rename = "user_created_at")]
    pub created_at: DateTime<Utc>,
}

/// 用户凭据，仅在存储层与登录流程之间传递，从不序列化
#[derive(Clone)]
pub struct Credentials {
    /// Argon2id PHC 字符串
    pub password_hash: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials([REDACTED])")
    }
}

/// 已校验、待写入的用户
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub credentials: Credentials,
}

/// 地址
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "address_id")]
    pub id: i64,
    #[serde(rename = "address_street")]
    pub street: String,
    #[serde(rename = "address_number")]
    pub number: String,
    #[serde(rename = "address_neighborhood")]
    pub neighborhood: String,
    #[serde(rename = "address_city")]
    pub city: String,
    #[serde(rename = "address_state")]
    pub state: String,
    #[serde(rename = "address_cep")]
    pub cep: String,
    pub user_id: i64,
    #[serde(rename = "address_created_at")]
    pub created_at: DateTime<Utc>,
}

/// 已校验的地址字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFields {
    pub street: String,
    pub number: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub cep: String,
}

/// 创建用户请求
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub user_name: String,
    pub user_email: String,
    pub user_password: String,
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_email: String,
    pub user_password: String,
}

/// 登录响应
///
/// `signature` 是对 `["login", user_id, timestamp]` 的签名
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: i64,
    pub timestamp: i64,
    pub signature: String,
}

/// 创建/更新地址请求
///
/// `user_id` 字段被忽略，地址归属于通过准入的用户
#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub address_street: String,
    pub address_number: String,
    pub address_neighborhood: String,
    pub address_city: String,
    pub address_state: String,
    pub address_cep: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}
