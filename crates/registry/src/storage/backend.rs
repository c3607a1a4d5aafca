//! Registry 存储后端抽象接口

use crate::error::RegistryResult;
use crate::types::{Address, AddressFields, Credentials, NewUser, User};
use async_trait::async_trait;

/// Registry 存储后端抽象接口
///
/// 提供用户与地址的异步读写 API
#[async_trait]
pub trait RegistryStorageBackend: Send + Sync {
    /// 初始化存储后端（执行迁移）
    async fn init(&self) -> RegistryResult<()>;

    /// 写入新用户
    ///
    /// 邮箱已存在时返回 `Conflict`
    async fn create_user(&self, user: &NewUser) -> RegistryResult<User>;

    /// 按邮箱查询用户及其凭据（登录用）
    async fn find_user_by_email(&self, email: &str) -> RegistryResult<Option<(User, Credentials)>>;

    /// 按 ID 查询用户
    async fn find_user_by_id(&self, user_id: i64) -> RegistryResult<Option<User>>;

    /// 用户是否存在
    async fn user_exists(&self, user_id: i64) -> RegistryResult<bool>;

    /// 为用户创建地址
    ///
    /// 用户已有地址时返回 `Conflict`
    async fn create_address(&self, user_id: i64, fields: &AddressFields) -> RegistryResult<Address>;

    /// 更新用户的地址
    ///
    /// # Returns
    /// * `Ok(Some(address))` - 更新后的地址
    /// * `Ok(None)` - 用户尚无地址
    async fn update_address(
        &self,
        user_id: i64,
        fields: &AddressFields,
    ) -> RegistryResult<Option<Address>>;

    /// 查询用户的地址
    async fn find_address_by_user(&self, user_id: i64) -> RegistryResult<Option<Address>>;

    /// 用户总数
    async fn user_count(&self) -> RegistryResult<u32>;

    /// 后端名称
    fn backend_name(&self) -> &'static str;
}
