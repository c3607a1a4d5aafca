//! SQLite 存储后端实现
//!
//! 使用 sqlx 提供原生异步 SQLite 存储支持

use crate::error::{RegistryError, RegistryResult};
use crate::storage::backend::RegistryStorageBackend;
use crate::storage::migrations::run_migrations;
use crate::types::{Address, AddressFields, Credentials, NewUser, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// 数据库文件名
pub const DB_FILE_NAME: &str = "addrbook.db";

type UserRow = (i64, String, String, i64);
type AddressRow = (i64, String, String, String, String, String, String, i64, i64);

const USER_COLUMNS: &str = "user_id, user_name, user_email, user_created_at";
const ADDRESS_COLUMNS: &str = "address_id, address_street, address_number, address_neighborhood, \
     address_city, address_state, address_cep, user_id, address_created_at";

/// SQLite 存储后端
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl SqliteBackend {
    /// 创建新的 SQLite 后端实例并执行迁移
    ///
    /// # Arguments
    /// * `db_path` - 数据库文件存储目录路径（来自 AppConfig.sqlite_path）
    pub async fn new(db_path: &Path) -> RegistryResult<Self> {
        let file = db_path.join(DB_FILE_NAME);

        // 创建连接选项并启用 WAL 模式
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", file.display()))
            .map_err(|e| RegistryError::Internal(format!("Failed to parse SQLite URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(|e| RegistryError::Internal(format!("Failed to connect to SQLite: {e}")))?;

        let backend = Self { pool };
        backend.init().await?;

        info!(
            "SQLite storage initialized with sqlx: path={}, WAL mode enabled",
            file.display()
        );

        Ok(backend)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn user_from_row((id, name, email, created_at): UserRow) -> User {
    User {
        id,
        name,
        email,
        created_at: timestamp_to_datetime(created_at),
    }
}

fn address_from_row(row: AddressRow) -> Address {
    let (id, street, number, neighborhood, city, state, cep, user_id, created_at) = row;
    Address {
        id,
        street,
        number,
        neighborhood,
        city,
        state,
        cep,
        user_id,
        created_at: timestamp_to_datetime(created_at),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl RegistryStorageBackend for SqliteBackend {
    async fn init(&self) -> RegistryResult<()> {
        let applied = run_migrations(&self.pool).await?;
        debug!("SQLite migrations up to date ({} newly applied)", applied.len());
        Ok(())
    }

    async fn create_user(&self, user: &NewUser) -> RegistryResult<User> {
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            r#"INSERT INTO users (user_name, user_email, user_password, user_created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.credentials.password_hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistryError::Conflict("email already registered".to_string())
            } else {
                RegistryError::Internal(format!("Failed to insert user: {e}"))
            }
        })?;

        let id = result.last_insert_rowid();
        debug!("Created user with ID: {}", id);

        Ok(User {
            id,
            name: user.name.clone(),
            email: user.email.clone(),
            created_at: timestamp_to_datetime(now),
        })
    }

    async fn find_user_by_email(&self, email: &str) -> RegistryResult<Option<(User, Credentials)>> {
        let row = sqlx::query_as::<_, (i64, String, String, i64, String)>(
            "SELECT user_id, user_name, user_email, user_created_at, user_password \
             FROM users WHERE user_email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegistryError::Internal(format!("Failed to query user by email: {e}")))?;

        Ok(row.map(|(id, name, email, created_at, password_hash)| {
            (
                user_from_row((id, name, email, created_at)),
                Credentials { password_hash },
            )
        }))
    }

    async fn find_user_by_id(&self, user_id: i64) -> RegistryResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RegistryError::Internal(format!("Failed to query user {user_id}: {e}"))
        })?;

        Ok(row.map(user_from_row))
    }

    async fn user_exists(&self, user_id: i64) -> RegistryResult<bool> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn create_address(&self, user_id: i64, fields: &AddressFields) -> RegistryResult<Address> {
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            r#"INSERT INTO address (address_street, address_number, address_neighborhood,
                   address_city, address_state, address_cep, user_id, address_created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        )
        .bind(&fields.street)
        .bind(&fields.number)
        .bind(&fields.neighborhood)
        .bind(&fields.city)
        .bind(&fields.state)
        .bind(&fields.cep)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistryError::Conflict("user already has an address".to_string())
            } else {
                RegistryError::Internal(format!("Failed to insert address: {e}"))
            }
        })?;

        let id = result.last_insert_rowid();
        debug!("Created address {} for user {}", id, user_id);

        Ok(Address {
            id,
            street: fields.street.clone(),
            number: fields.number.clone(),
            neighborhood: fields.neighborhood.clone(),
            city: fields.city.clone(),
            state: fields.state.clone(),
            cep: fields.cep.clone(),
            user_id,
            created_at: timestamp_to_datetime(now),
        })
    }

    async fn update_address(
        &self,
        user_id: i64,
        fields: &AddressFields,
    ) -> RegistryResult<Option<Address>> {
        let result = sqlx::query(
            r#"UPDATE address
               SET address_street = ?1, address_number = ?2, address_neighborhood = ?3,
                   address_city = ?4, address_state = ?5, address_cep = ?6
               WHERE user_id = ?7"#,
        )
        .bind(&fields.street)
        .bind(&fields.number)
        .bind(&fields.neighborhood)
        .bind(&fields.city)
        .bind(&fields.state)
        .bind(&fields.cep)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::Internal(format!("Failed to update address: {e}")))?;

        if result.rows_affected() == 0 {
            debug!("No address to update for user {}", user_id);
            return Ok(None);
        }

        self.find_address_by_user(user_id).await
    }

    async fn find_address_by_user(&self, user_id: i64) -> RegistryResult<Option<Address>> {
        let row = sqlx::query_as::<_, AddressRow>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM address WHERE user_id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RegistryError::Internal(format!("Failed to query address for user {user_id}: {e}"))
        })?;

        Ok(row.map(address_from_row))
    }

    async fn user_count(&self) -> RegistryResult<u32> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RegistryError::Internal(format!("Failed to count users: {e}")))?;
        Ok(count as u32)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
