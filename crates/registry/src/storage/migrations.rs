//! 内嵌的数据库迁移
//!
//! 迁移按 `version` 顺序执行，已执行的版本记录在 `schema_migrations` 表中并被跳过。
//! 每个迁移在独立事务中执行，失败时整体回滚。

use crate::error::{RegistryError, RegistryResult};
use sqlx::{Executor, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info};

/// 一个命名迁移
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: &'static str,
    pub sql: &'static str,
}

/// 全部迁移，按版本号升序排列
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_create_users",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT NOT NULL,
                user_email TEXT NOT NULL UNIQUE,
                user_password TEXT NOT NULL,
                user_created_at INTEGER NOT NULL
            );
        "#,
    },
    Migration {
        version: "0002_create_address",
        sql: r#"
            CREATE TABLE IF NOT EXISTS address (
                address_id INTEGER PRIMARY KEY AUTOINCREMENT,
                address_street TEXT NOT NULL,
                address_number TEXT NOT NULL,
                address_neighborhood TEXT NOT NULL,
                address_city TEXT NOT NULL,
                address_state TEXT NOT NULL,
                address_cep TEXT NOT NULL,
                user_id INTEGER NOT NULL UNIQUE REFERENCES users(user_id) ON DELETE CASCADE,
                address_created_at INTEGER NOT NULL
            );
        "#,
    },
    Migration {
        version: "0003_index_users_email",
        sql: "CREATE INDEX IF NOT EXISTS idx_users_email ON users(user_email);",
    },
];

/// 执行所有未执行的迁移，返回本次执行的版本
pub async fn run_migrations(pool: &SqlitePool) -> RegistryResult<Vec<&'static str>> {
    run(pool, MIGRATIONS).await
}

async fn run(pool: &SqlitePool, migrations: &[Migration]) -> RegistryResult<Vec<&'static str>> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RegistryError::Internal(format!("Failed to create schema_migrations table: {e}")))?;

    let applied: HashSet<String> = sqlx::query_as::<_, (String,)>("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(version,)| version)
        .collect();

    let mut newly_applied = Vec::new();

    for migration in migrations {
        if applied.contains(migration.version) {
            debug!("Migration already applied: {}", migration.version);
            continue;
        }

        apply(pool, migration)
            .await
            .map_err(|source| RegistryError::Migration {
                version: migration.version.to_string(),
                source,
            })?;

        info!("Applied migration {}", migration.version);
        newly_applied.push(migration.version);
    }

    Ok(newly_applied)
}

async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    (&mut *tx).execute(sqlx::raw_sql(migration.sql)).await?;

    sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
        .bind(migration.version)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[test]
    fn test_versions_are_ordered_and_unique() {
        let versions: Vec<_> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await;

        let first = run_migrations(&pool).await.unwrap();
        assert_eq!(first.len(), MIGRATIONS.len());

        let second = run_migrations(&pool).await.unwrap();
        assert!(second.is_empty());

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_failed_migration_rolls_back() {
        let pool = memory_pool().await;
        let broken = [
            Migration {
                version: "0001_ok",
                sql: "CREATE TABLE ok_table (id INTEGER);",
            },
            Migration {
                version: "0002_broken",
                sql: "CREATE TABLE half_done (id INTEGER); THIS IS NOT SQL;",
            },
        ];

        let err = run(&pool, &broken).await.unwrap_err();
        assert!(matches!(err, RegistryError::Migration { ref version, .. } if version == "0002_broken"));

        let versions: Vec<(String,)> = sqlx::query_as("SELECT version FROM schema_migrations")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(versions, vec![("0001_ok".to_string(),)]);

        // 失败迁移中的建表语句随事务回滚
        let half: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'half_done'",
        )
        .fetch_optional(&pool)
        .await
        .unwrap();
        assert!(half.is_none());
    }
}
