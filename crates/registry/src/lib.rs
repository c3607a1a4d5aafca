//! Registry - 用户与地址管理服务
//!
//! Registry 服务提供以下功能：
//! 1. 用户注册（Argon2id 密码哈希）和登录（返回签名的登录凭据）
//! 2. 每个用户一条地址的创建与更新
//! 3. 变更类接口经过 `gate` 签名准入，地址归属于准入确认的用户
//! 4. SQLite 存储与内嵌迁移

pub mod error;
pub mod handlers;
pub mod password;
pub mod storage;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use error::{RegistryError, RegistryResult};
pub use handlers::{
    RegistryState, create_registry_state, create_router, register_registry_metrics,
};
pub use storage::{RegistryStorage, RegistryStorageBackend, SqliteBackend};
pub use types::{Address, AddressFields, AddressRequest, AuthResponse, User};
