//! Persisted log rows and per-category log configuration rows.

use serde::Serialize;
use sqlx::FromRow;

/// A row of the `system_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SystemLog {
    pub id: String,
    pub level: String,
    pub category: String,
    pub message: String,
    /// JSON payload.
    pub data: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub status_code: Option<i64>,
    pub duration: Option<i64>,
    pub stack_trace: Option<String>,
    /// JSON array of tags.
    pub tags: Option<String>,
    pub source: Option<String>,
    pub created_at: i64,
}

/// A row of the `log_config` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LogConfigRow {
    pub id: String,
    pub category: String,
    pub enabled: bool,
    pub level: String,
    /// Days to keep entries.
    pub retention: i64,
    /// Maximum number of entries kept for the category.
    pub max_size: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}
