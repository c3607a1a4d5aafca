//! Registry 存储模块
//!
//! # 设计
//!
//! - `RegistryStorageBackend` trait 定义统一的异步接口
//! - `RegistryStorage` enum 封装具体后端，可直接 Clone 进 handler 状态
//! - `RegistryStorage` 同时实现准入网关所需的 [`IdentityResolver`]

use std::path::Path;

pub mod backend;
pub mod migrations;
pub mod sqlite;

use crate::error::RegistryResult;
use crate::types::{Address, AddressFields, Credentials, NewUser, User};
use async_trait::async_trait;
use gate::{IdentityResolver, ResolverError};

pub use backend::RegistryStorageBackend;
pub use migrations::{MIGRATIONS, Migration, run_migrations};
pub use sqlite::SqliteBackend;

/// 用户/地址存储统一接口
#[derive(Clone, Debug)]
pub enum RegistryStorage {
    /// SQLite 存储后端
    Sqlite(Box<SqliteBackend>),
}

impl RegistryStorage {
    /// 打开 SQLite 存储并执行迁移
    ///
    /// # Arguments
    /// * `db_path` - 数据库文件存储目录路径
    pub async fn open_sqlite<P: AsRef<Path>>(db_path: P) -> RegistryResult<Self> {
        let backend = SqliteBackend::new(db_path.as_ref()).await?;
        Ok(RegistryStorage::Sqlite(Box::new(backend)))
    }

    fn backend(&self) -> &dyn RegistryStorageBackend {
        match self {
            RegistryStorage::Sqlite(backend) => &**backend,
        }
    }

    pub async fn create_user(&self, user: &NewUser) -> RegistryResult<User> {
        self.backend().create_user(user).await
    }

    pub async fn find_user_by_email(
        &self,
        email: &str,
    ) -> RegistryResult<Option<(User, Credentials)>> {
        self.backend().find_user_by_email(email).await
    }

    pub async fn find_user_by_id(&self, user_id: i64) -> RegistryResult<Option<User>> {
        self.backend().find_user_by_id(user_id).await
    }

    pub async fn user_exists(&self, user_id: i64) -> RegistryResult<bool> {
        self.backend().user_exists(user_id).await
    }

    pub async fn create_address(
        &self,
        user_id: i64,
        fields: &AddressFields,
    ) -> RegistryResult<Address> {
        self.backend().create_address(user_id, fields).await
    }

    pub async fn update_address(
        &self,
        user_id: i64,
        fields: &AddressFields,
    ) -> RegistryResult<Option<Address>> {
        self.backend().update_address(user_id, fields).await
    }

    pub async fn find_address_by_user(&self, user_id: i64) -> RegistryResult<Option<Address>> {
        self.backend().find_address_by_user(user_id).await
    }

    pub async fn user_count(&self) -> RegistryResult<u32> {
        self.backend().user_count().await
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend().backend_name()
    }
}

#[async_trait]
impl IdentityResolver for RegistryStorage {
    async fn user_exists(&self, user_id: i64) -> Result<bool, ResolverError> {
        RegistryStorage::user_exists(self, user_id)
            .await
            .map_err(|e| ResolverError::new(e.to_string()))
    }
}
