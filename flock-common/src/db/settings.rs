//! Settings table access

use crate::db::init::DEFAULT_SETTINGS;
use crate::db::models::Setting;
use crate::time::now;
use crate::{Error, Result};
use sqlx::SqlitePool;

/// Whether `key` is an operator-editable setting
pub fn is_known_setting(key: &str) -> bool {
    DEFAULT_SETTINGS.iter().any(|(k, _)| *k == key)
}

pub async fn get_all_settings(pool: &SqlitePool) -> Result<Vec<Setting>> {
    let rows = sqlx::query_as::<_, Setting>(
        "SELECT key, COALESCE(value, '') AS value FROM settings ORDER BY key",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Update a known setting
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    if !is_known_setting(key) {
        return Err(Error::InvalidInput(format!("unknown setting '{}'", key)));
    }

    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(now())
    .execute(pool)
    .await?;

    Ok(())
}
