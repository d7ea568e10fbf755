//! Settings table accessors
//!
//! Key-value rows; the database tier of secret resolution reads from here.

use prdesk_common::{Error, Result};
use sqlx::{Pool, Sqlite};

pub const WEBHOOK_SECRET_KEY: &str = "webhook_shared_secret";
pub const LLM_API_KEY: &str = "llm_api_key";
pub const MAX_LOCK_WAIT_KEY: &str = "ingest_max_lock_wait_ms";

pub async fn get_webhook_secret(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, WEBHOOK_SECRET_KEY).await
}

pub async fn set_webhook_secret(db: &Pool<Sqlite>, secret: &str) -> Result<()> {
    set_setting(db, WEBHOOK_SECRET_KEY, secret).await
}

pub async fn get_llm_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, LLM_API_KEY).await
}

/// Retry budget for job saves under lock contention
///
/// **Default:** 5000 ms
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, MAX_LOCK_WAIT_KEY)
        .await
        .map(|opt| opt.unwrap_or(crate::utils::DEFAULT_MAX_LOCK_WAIT_MS))
}

/// Read and parse one setting
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row.and_then(|(value,)| value) {
        Some(value) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Invalid value for setting '{}': {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Insert or replace one setting
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prdesk_common::db::init_memory_database;

    #[tokio::test]
    async fn test_missing_setting_is_none() {
        let pool = init_memory_database().await.unwrap();
        assert_eq!(get_webhook_secret(&pool).await.unwrap(), None);
        assert_eq!(get_max_lock_wait_ms(&pool).await.unwrap(), 5000);
    }

    #[tokio::test]
    async fn test_set_then_update() {
        let pool = init_memory_database().await.unwrap();

        set_webhook_secret(&pool, "first").await.unwrap();
        set_webhook_secret(&pool, "second").await.unwrap();
        assert_eq!(get_webhook_secret(&pool).await.unwrap(), Some("second".to_string()));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = ?")
            .bind(WEBHOOK_SECRET_KEY)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_unparseable_value_is_config_error() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, MAX_LOCK_WAIT_KEY, "soon").await.unwrap();

        let result = get_max_lock_wait_ms(&pool).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_null_value_is_none() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("INSERT INTO settings (key, value) VALUES (?, NULL)")
            .bind(LLM_API_KEY)
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(get_llm_api_key(&pool).await.unwrap(), None);
    }
}
