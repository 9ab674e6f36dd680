//! Database connection pool management and schema introspection.

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::Config;

/// Create a SQLite connection pool, creating the database file if needed.
pub async fn create_pool(config: &Config) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .with_context(|| format!("invalid DATABASE_URL: {}", config.database_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.database_max_connections);

    // Every connection to `sqlite::memory:` opens its own database, so keep
    // exactly one alive for the lifetime of the pool.
    if config.database_url.contains(":memory:") {
        pool_options = pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .context("failed to connect to SQLite")?;

    Ok(pool)
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Check whether a table exists.
pub async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS cnt FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to look up table '{table}'"))?;

    let count: i64 = row.get("cnt");
    Ok(count > 0)
}

/// Check whether every listed table exists.
pub async fn tables_exist(pool: &SqlitePool, tables: &[&str]) -> Result<bool> {
    for table in tables {
        if !table_exists(pool, table).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Check whether a column exists on a table.
pub async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS cnt FROM pragma_table_info(?) WHERE name = ?")
        .bind(table)
        .bind(column)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to inspect columns of '{table}'"))?;

    let count: i64 = row.get("cnt");
    Ok(count > 0)
}

/// Current time in epoch milliseconds, the unit used by content tables.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current time in epoch seconds, the unit used by plugin tables.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
