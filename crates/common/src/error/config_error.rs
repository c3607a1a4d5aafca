//! 配置相关错误类型
//!
//! 定义所有与配置解析、验证、加载相关的错误

use thiserror::Error;

/// 配置相关错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Path is not a valid file: {path}")]
    NotAFile { path: String },

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for field '{field}': {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },
}

impl ConfigError {
    /// 校验结果中只包含 `Warning:` 前缀条目时不算失败
    pub fn from_validation(errors: Vec<String>) -> Option<Self> {
        let fatal: Vec<String> = errors
            .into_iter()
            .filter(|e| !e.starts_with("Warning:"))
            .collect();
        if fatal.is_empty() {
            None
        } else {
            Some(ConfigError::Validation { errors: fatal })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_validation_ignores_warnings() {
        let errors = vec!["Warning: log rotation disabled".to_string()];
        assert!(ConfigError::from_validation(errors).is_none());

        let errors = vec![
            "Warning: log rotation disabled".to_string(),
            "Instance name cannot be empty".to_string(),
        ];
        let err = ConfigError::from_validation(errors).unwrap();
        match &err {
            ConfigError::Validation { errors } => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("Instance name cannot be empty"));
    }
}
