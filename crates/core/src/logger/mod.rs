//! Persisted structured logger.
//!
//! Entries go to the `system_logs` table, filtered by the per-category
//! settings in `log_config`, and are mirrored to `tracing`. Logging never
//! fails the caller: database errors are reported through `tracing` and
//! dropped.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::now_millis;
use crate::models::system_log::{LogConfigRow, SystemLog};

/// How long a category's config is cached.
const CONFIG_TTL: Duration = Duration::from_secs(60);

/// Default page size for [`Logger::get_logs`].
pub const DEFAULT_LOG_LIMIT: i64 = 50;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            other => bail!("unknown log level '{other}'"),
        }
    }
}

/// Area of the system a log entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Auth,
    Api,
    Workflow,
    Plugin,
    Media,
    System,
    Security,
    Error,
}

impl LogCategory {
    pub const ALL: [LogCategory; 8] = [
        Self::Auth,
        Self::Api,
        Self::Workflow,
        Self::Plugin,
        Self::Media,
        Self::System,
        Self::Security,
        Self::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Api => "api",
            Self::Workflow => "workflow",
            Self::Plugin => "plugin",
            Self::Media => "media",
            Self::System => "system",
            Self::Security => "security",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .with_context(|| format!("unknown log category '{s}'"))
    }
}

/// Request and caller details attached to an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub status_code: Option<i64>,
    /// Milliseconds.
    pub duration: Option<i64>,
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: Option<String>,
}

impl LogContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }
}

/// Query parameters for [`Logger::get_logs`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    #[serde(default)]
    pub levels: Vec<LogLevel>,
    #[serde(default)]
    pub categories: Vec<LogCategory>,
    pub user_id: Option<String>,
    pub source: Option<String>,
    /// Substring matched against message, data and url.
    pub search: Option<String>,
    /// Inclusive lower bound, epoch milliseconds.
    pub start_date: Option<i64>,
    /// Inclusive upper bound, epoch milliseconds.
    pub end_date: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// One of `created_at`, `level`, `category`.
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default).
    pub sort_order: Option<String>,
}

/// One page of log entries and the total matching count.
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub logs: Vec<SystemLog>,
    pub total: i64,
}

/// Changes to a category's configuration. Unset fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfigUpdate {
    pub enabled: Option<bool>,
    pub level: Option<LogLevel>,
    pub retention: Option<i64>,
    pub max_size: Option<i64>,
}

struct LoggerInner {
    pool: SqlitePool,
    enabled: AtomicBool,
    configs: RwLock<HashMap<String, (Option<LogConfigRow>, Instant)>>,
}

/// Structured logger backed by `system_logs`.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("enabled", &self.is_enabled())
            .field("cached_configs", &self.inner.configs.read().len())
            .finish()
    }
}

impl Logger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                pool,
                enabled: AtomicBool::new(true),
                configs: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Record an entry if the category's config accepts it.
    pub async fn log(
        &self,
        level: LogLevel,
        category: LogCategory,
        message: &str,
        data: Option<&Value>,
        ctx: Option<&LogContext>,
    ) {
        if !self.is_enabled() {
            return;
        }

        let config = match self.get_config(category).await {
            Ok(Some(config)) => config,
            Ok(None) => return,
            Err(e) => {
                error!(category = %category, error = %format!("{e:#}"), "failed to load log config");
                return;
            }
        };

        if !config.enabled || level < threshold(&config) {
            return;
        }

        mirror(level, category, message);

        if let Err(e) = self.insert(level, category, message, data, ctx).await {
            error!(category = %category, error = %format!("{e:#}"), "failed to persist log entry");
            return;
        }

        if let Some(max_size) = config.max_size {
            if let Err(e) = self.trim(category, max_size).await {
                error!(category = %category, error = %format!("{e:#}"), "failed to trim log category");
            }
        }
    }

    async fn insert(
        &self,
        level: LogLevel,
        category: LogCategory,
        message: &str,
        data: Option<&Value>,
        ctx: Option<&LogContext>,
    ) -> Result<()> {
        let empty = LogContext::default();
        let ctx = ctx.unwrap_or(&empty);

        let data = data.map(serde_json::to_string).transpose()?;
        let tags = if ctx.tags.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&ctx.tags)?)
        };

        sqlx::query(
            "INSERT INTO system_logs \
             (id, level, category, message, data, user_id, session_id, request_id, ip_address, \
              user_agent, method, url, status_code, duration, stack_trace, tags, source, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(level.as_str())
        .bind(category.as_str())
        .bind(message)
        .bind(data)
        .bind(&ctx.user_id)
        .bind(&ctx.session_id)
        .bind(&ctx.request_id)
        .bind(&ctx.ip_address)
        .bind(&ctx.user_agent)
        .bind(&ctx.method)
        .bind(&ctx.url)
        .bind(ctx.status_code)
        .bind(ctx.duration)
        .bind(&ctx.stack_trace)
        .bind(tags)
        .bind(&ctx.source)
        .bind(now_millis())
        .execute(&self.inner.pool)
        .await
        .context("failed to insert log entry")?;

        Ok(())
    }

    /// Keep only the newest `max_size` entries of a category.
    async fn trim(&self, category: LogCategory, max_size: i64) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM system_logs WHERE category = ? AND id NOT IN \
             (SELECT id FROM system_logs WHERE category = ? ORDER BY created_at DESC, id DESC LIMIT ?)",
        )
        .bind(category.as_str())
        .bind(category.as_str())
        .bind(max_size.max(0))
        .execute(&self.inner.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(category = %category, removed = result.rows_affected(), "trimmed log category");
        }
        Ok(())
    }

    pub async fn debug(&self, category: LogCategory, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Debug, category, message, data, None).await;
    }

    pub async fn info(&self, category: LogCategory, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Info, category, message, data, None).await;
    }

    pub async fn warn(&self, category: LogCategory, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Warn, category, message, data, None).await;
    }

    pub async fn error(&self, category: LogCategory, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Error, category, message, data, None).await;
    }

    pub async fn fatal(&self, category: LogCategory, message: &str, data: Option<&Value>) {
        self.log(LogLevel::Fatal, category, message, data, None).await;
    }

    /// Record an API request. The level follows the response status.
    pub async fn log_request(
        &self,
        method: &str,
        url: &str,
        status_code: u16,
        duration_ms: i64,
        ctx: Option<LogContext>,
    ) {
        let level = request_level(status_code);
        let ctx = LogContext {
            method: Some(method.to_string()),
            url: Some(url.to_string()),
            status_code: Some(i64::from(status_code)),
            duration: Some(duration_ms),
            ..ctx.unwrap_or_default()
        };

        let message = format!("{method} {url} - {status_code}");
        self.log(level, LogCategory::Api, &message, None, Some(&ctx))
            .await;
    }

    /// Record an authentication event.
    pub async fn log_auth(
        &self,
        action: &str,
        user_id: Option<&str>,
        success: bool,
        ctx: Option<LogContext>,
    ) {
        let level = if success { LogLevel::Info } else { LogLevel::Warn };
        let mut ctx = ctx.unwrap_or_default();
        if let Some(user_id) = user_id {
            ctx.user_id = Some(user_id.to_string());
        }

        let outcome = if success { "success" } else { "failed" };
        let message = format!("Authentication {action}: {outcome}");
        let data = serde_json::json!({ "action": action, "success": success });

        self.log(level, LogCategory::Auth, &message, Some(&data), Some(&ctx))
            .await;
    }

    /// Record a security event. `critical` and `high` map to fatal and error.
    pub async fn log_security(&self, event: &str, severity: &str, ctx: Option<LogContext>) {
        let level = security_level(severity);
        let message = format!("Security event: {event}");
        let data = serde_json::json!({ "event": event, "severity": severity });

        self.log(level, LogCategory::Security, &message, Some(&data), ctx.as_ref())
            .await;
    }

    /// Query entries with filtering, sorting and paging.
    pub async fn get_logs(&self, filter: &LogFilter) -> Result<LogPage> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS cnt FROM system_logs");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build()
            .fetch_one(&self.inner.pool)
            .await
            .context("failed to count log entries")?
            .get("cnt");

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM system_logs");
        push_filters(&mut query, filter);

        let sort_by = match filter.sort_by.as_deref() {
            Some(column @ ("created_at" | "level" | "category")) => column,
            _ => "created_at",
        };
        let sort_order = match filter.sort_order.as_deref() {
            Some(order) if order.eq_ignore_ascii_case("asc") => "ASC",
            _ => "DESC",
        };
        query.push(format!(" ORDER BY {sort_by} {sort_order}, id {sort_order}"));
        query.push(" LIMIT ");
        query.push_bind(filter.limit.unwrap_or(DEFAULT_LOG_LIMIT));
        query.push(" OFFSET ");
        query.push_bind(filter.offset.unwrap_or(0));

        let logs = query
            .build_query_as::<SystemLog>()
            .fetch_all(&self.inner.pool)
            .await
            .context("failed to query log entries")?;

        Ok(LogPage { logs, total })
    }

    /// Configuration of a category, cached for a minute.
    pub async fn get_config(&self, category: LogCategory) -> Result<Option<LogConfigRow>> {
        let key = category.as_str();

        let cached = self.inner.configs.read().get(key).cloned();
        if let Some((config, loaded_at)) = cached {
            if loaded_at.elapsed() < CONFIG_TTL {
                return Ok(config);
            }
        }

        let config = sqlx::query_as::<_, LogConfigRow>("SELECT * FROM log_config WHERE category = ?")
            .bind(key)
            .fetch_optional(&self.inner.pool)
            .await
            .with_context(|| format!("failed to load log config for '{key}'"))?;

        self.inner
            .configs
            .write()
            .insert(key.to_string(), (config.clone(), Instant::now()));

        Ok(config)
    }

    /// Apply changes to a category's configuration.
    pub async fn update_config(&self, category: LogCategory, changes: &LogConfigUpdate) -> Result<()> {
        sqlx::query(
            "UPDATE log_config SET enabled = COALESCE(?, enabled), level = COALESCE(?, level), \
             retention = COALESCE(?, retention), max_size = COALESCE(?, max_size), updated_at = ? \
             WHERE category = ?",
        )
        .bind(changes.enabled)
        .bind(changes.level.map(LogLevel::as_str))
        .bind(changes.retention)
        .bind(changes.max_size)
        .bind(now_millis())
        .bind(category.as_str())
        .execute(&self.inner.pool)
        .await
        .with_context(|| format!("failed to update log config for '{category}'"))?;

        self.inner.configs.write().remove(category.as_str());
        info!(category = %category, "log config updated");
        Ok(())
    }

    /// All category configurations.
    pub async fn all_configs(&self) -> Result<Vec<LogConfigRow>> {
        sqlx::query_as::<_, LogConfigRow>("SELECT * FROM log_config ORDER BY category")
            .fetch_all(&self.inner.pool)
            .await
            .context("failed to list log configs")
    }

    /// Delete entries older than each category's retention. Returns the
    /// number of entries removed.
    pub async fn cleanup_by_retention(&self) -> Result<u64> {
        let now = now_millis();
        let mut removed = 0;

        for config in self.all_configs().await? {
            let retention_ms = config.retention.max(0).saturating_mul(MS_PER_DAY);
            let cutoff = now.saturating_sub(retention_ms);
            let result = sqlx::query("DELETE FROM system_logs WHERE category = ? AND created_at < ?")
                .bind(&config.category)
                .bind(cutoff)
                .execute(&self.inner.pool)
                .await
                .with_context(|| format!("failed to clean up '{}' logs", config.category))?;
            removed += result.rows_affected();
        }

        info!(removed, "log retention cleanup complete");
        Ok(removed)
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &LogFilter) {
    let mut prefix = " WHERE ";
    let mut next = |query: &mut QueryBuilder<'_, Sqlite>| {
        query.push(prefix);
        prefix = " AND ";
    };

    if !filter.levels.is_empty() {
        next(query);
        query.push("level IN (");
        {
            let mut list = query.separated(", ");
            for level in &filter.levels {
                list.push_bind(level.as_str());
            }
        }
        query.push(")");
    }

    if !filter.categories.is_empty() {
        next(query);
        query.push("category IN (");
        {
            let mut list = query.separated(", ");
            for category in &filter.categories {
                list.push_bind(category.as_str());
            }
        }
        query.push(")");
    }

    if let Some(user_id) = &filter.user_id {
        next(query);
        query.push("user_id = ").push_bind(user_id.clone());
    }

    if let Some(source) = &filter.source {
        next(query);
        query.push("source = ").push_bind(source.clone());
    }

    if let Some(search) = &filter.search {
        let pattern = format!("%{search}%");
        next(query);
        query
            .push("(message LIKE ")
            .push_bind(pattern.clone())
            .push(" OR data LIKE ")
            .push_bind(pattern.clone())
            .push(" OR url LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(start) = filter.start_date {
        next(query);
        query.push("created_at >= ").push_bind(start);
    }

    if let Some(end) = filter.end_date {
        next(query);
        query.push("created_at <= ").push_bind(end);
    }
}

/// Lowest level a config accepts. Unknown levels fall back to info.
fn threshold(config: &LogConfigRow) -> LogLevel {
    config.level.parse().unwrap_or_else(|_| {
        warn!(category = %config.category, level = %config.level, "unknown log level in config");
        LogLevel::Info
    })
}

fn request_level(status_code: u16) -> LogLevel {
    match status_code {
        500.. => LogLevel::Error,
        400..=499 => LogLevel::Warn,
        _ => LogLevel::Info,
    }
}

fn security_level(severity: &str) -> LogLevel {
    match severity {
        "critical" => LogLevel::Fatal,
        "high" => LogLevel::Error,
        _ => LogLevel::Warn,
    }
}

fn mirror(level: LogLevel, category: LogCategory, message: &str) {
    match level {
        LogLevel::Debug => debug!(category = %category, "{message}"),
        LogLevel::Info => info!(category = %category, "{message}"),
        LogLevel::Warn => warn!(category = %category, "{message}"),
        LogLevel::Error | LogLevel::Fatal => {
            error!(category = %category, level = %level, "{message}")
        }
    }
}
