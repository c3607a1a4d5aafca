//! Argon2id 密码哈希
//!
//! 哈希以 PHC 字符串保存（包含算法、参数和盐）。计算开销较大，
//! handler 中通过 `spawn_blocking` 调用。

use crate::error::{RegistryError, RegistryResult};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::password_hash::rand_core::OsRng;
use argon2::Argon2;

/// 生成密码哈希
pub fn hash_password(password: &str) -> RegistryResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RegistryError::PasswordHash(format!("Failed to hash password: {e}")))
}

/// 校验密码
///
/// 密码不匹配返回 `Ok(false)`；存储的哈希无法解析时返回错误
pub fn verify_password(password: &str, phc: &str) -> RegistryResult<bool> {
    let parsed = PasswordHash::new(phc)
        .map_err(|e| RegistryError::PasswordHash(format!("Stored hash is invalid: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(RegistryError::PasswordHash(format!(
            "Failed to verify password: {e}"
        ))),
    }
}
