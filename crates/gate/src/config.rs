//! 准入网关配置
//!
//! 对应配置文件中的 `[auth]` 段

use crate::codec::SharedSecret;
use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 默认时间窗口（秒）
pub const DEFAULT_WINDOW_SECS: u64 = 300;
/// 默认 nonce 保留时长（秒）
pub const DEFAULT_NONCE_RETENTION_SECS: u64 = 300;
/// 默认清理间隔（秒）
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 300;
/// 默认请求体上限（1 MiB）
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// 共享密钥来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// 从环境变量读取（变量名）
    Environment(String),
    /// 直接配置的 base64 字符串
    Direct(String),
}

/// 准入网关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// HMAC 共享密钥（标准 base64）
    ///
    /// 注意：直接在配置文件中存储密钥不够安全，生产环境建议使用 secret_env
    #[serde(default)]
    pub secret: Option<String>,

    /// 共享密钥环境变量名称
    ///
    /// 例如：secret_env = "HMAC_SECRET"
    #[serde(default)]
    pub secret_env: Option<String>,

    /// 时间戳接受窗口（秒），`now ± window_secs` 以内有效
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// nonce 保留时长（秒）
    #[serde(default = "default_nonce_retention_secs")]
    pub nonce_retention_secs: u64,

    /// 后台清理间隔（秒）
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    /// nonce 账本容量上限，未配置则不限制
    #[serde(default)]
    pub max_nonces: Option<usize>,

    /// 被保护接口的请求体上限（字节）
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_nonce_retention_secs() -> u64 {
    DEFAULT_NONCE_RETENTION_SECS
}

fn default_reaper_interval_secs() -> u64 {
    DEFAULT_REAPER_INTERVAL_SECS
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            secret: None,
            secret_env: None,
            window_secs: DEFAULT_WINDOW_SECS,
            nonce_retention_secs: DEFAULT_NONCE_RETENTION_SECS,
            reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
            max_nonces: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl GateConfig {
    /// 获取密钥来源
    ///
    /// 优先级: secret_env > secret
    pub fn secret_source(&self) -> Option<SecretSource> {
        if let Some(env_var) = &self.secret_env {
            return Some(SecretSource::Environment(env_var.clone()));
        }

        self.secret
            .as_ref()
            .map(|secret| SecretSource::Direct(secret.clone()))
    }

    /// 解析并加载共享密钥
    pub fn load_secret(&self) -> GateResult<SharedSecret> {
        let encoded = match self.secret_source() {
            Some(SecretSource::Environment(var)) => std::env::var(&var).map_err(|_| {
                GateError::Secret(format!("environment variable {var} is not set"))
            })?,
            Some(SecretSource::Direct(secret)) => secret,
            None => {
                return Err(GateError::Secret(
                    "neither auth.secret nor auth.secret_env is configured".to_string(),
                ));
            }
        };

        SharedSecret::from_base64(encoded.trim())
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn nonce_retention(&self) -> Duration {
        Duration::from_secs(self.nonce_retention_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    /// 校验配置，返回发现的全部问题
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.secret.is_none() && self.secret_env.is_none() {
            errors.push("auth: either secret or secret_env must be configured".to_string());
        }

        if self.secret.is_some() && self.secret_env.is_some() {
            errors.push("Warning: auth.secret is ignored because auth.secret_env is set".to_string());
        }

        if self.window_secs == 0 {
            errors.push("auth.window_secs must be greater than 0".to_string());
        }

        if self.reaper_interval_secs == 0 {
            errors.push("auth.reaper_interval_secs must be greater than 0".to_string());
        }

        // 时间戳最多在首次出现后 2W 内仍被接受，nonce 保留时长短于此即可被重放
        if self.nonce_retention_secs < self.window_secs.saturating_mul(2) {
            errors.push(format!(
                "Warning: auth.nonce_retention_secs ({}) is shorter than twice the window ({}s); \
                 a nonce may become replayable while its timestamp is still accepted",
                self.nonce_retention_secs, self.window_secs
            ));
        }

        if self.max_nonces == Some(0) {
            errors.push("auth.max_nonces must be greater than 0 when set".to_string());
        }

        if self.max_body_bytes == 0 {
            errors.push("auth.max_body_bytes must be greater than 0".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gate_config() {
        let config = GateConfig::default();
        assert_eq!(config.window_secs, 300);
        assert_eq!(config.nonce_retention_secs, 300);
        assert_eq!(config.reaper_interval_secs, 300);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert!(config.max_nonces.is_none());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: GateConfig = toml::from_str(
            r#"
            secret = "czNjcjN0"
            window_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.window_secs, 60);
        assert_eq!(config.nonce_retention_secs, DEFAULT_NONCE_RETENTION_SECS);
        assert_eq!(config.secret.as_deref(), Some("czNjcjN0"));
    }

    #[test]
    fn test_secret_source_priority() {
        let config = GateConfig::default();
        assert!(config.secret_source().is_none());

        let config = GateConfig {
            secret: Some("czNjcjN0".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.secret_source(),
            Some(SecretSource::Direct("czNjcjN0".to_string()))
        );

        let config = GateConfig {
            secret: Some("czNjcjN0".to_string()),
            secret_env: Some("ADDRBOOK_TEST_SECRET".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.secret_source(),
            Some(SecretSource::Environment("ADDRBOOK_TEST_SECRET".to_string()))
        );
    }

    #[test]
    fn test_load_direct_secret() {
        let config = GateConfig {
            secret: Some("czNjcjN0".to_string()),
            ..Default::default()
        };
        let secret = config.load_secret().unwrap();
        assert_eq!(secret.as_bytes(), b"s3cr3t");
    }

    #[test]
    fn test_load_secret_missing() {
        let config = GateConfig::default();
        assert!(matches!(config.load_secret(), Err(GateError::Secret(_))));
    }

    #[test]
    fn test_load_secret_from_unset_env() {
        let config = GateConfig {
            secret_env: Some("ADDRBOOK_SURELY_UNSET_SECRET_VAR".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.load_secret(), Err(GateError::Secret(_))));
    }

    #[test]
    fn test_validate() {
        let config = GateConfig {
            secret: Some("czNjcjN0".to_string()),
            nonce_retention_secs: 600,
            ..Default::default()
        };
        assert!(config.validate().is_empty());

        let config = GateConfig {
            window_secs: 0,
            max_nonces: Some(0),
            ..Default::default()
        };
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("secret")));
        assert!(errors.iter().any(|e| e.contains("window_secs")));
        assert!(errors.iter().any(|e| e.contains("max_nonces")));
    }

    #[test]
    fn test_validate_warns_on_short_retention() {
        let config = GateConfig {
            secret: Some("czNjcjN0".to_string()),
            ..Default::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Warning:"));
    }
}
