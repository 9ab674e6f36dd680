//! SQL-string migration runner.
//!
//! Migrations are plain SQL scripts with a string id (`001`, `002`, ...).
//! Applied migrations are recorded in the `migrations` table. A database
//! created before that table existed is recognized through per-migration
//! detection rules (tables or columns the migration creates), so existing
//! installs are not re-migrated.

mod bundle;
pub mod sql;

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::{debug, error, info, warn};

use crate::db;
use crate::error::MigrationError;

pub use bundle::{bundled_migrations, migration_sql};
pub use sql::split_sql_statements;

/// Tables a fully migrated database must contain.
pub const REQUIRED_TABLES: &[&str] = &[
    "users",
    "content",
    "collections",
    "media",
    "plugins",
    "plugin_hooks",
    "system_logs",
    "log_config",
    "forms",
    "settings",
];

/// How to recognize a migration that was applied outside the runner.
#[derive(Debug, Clone, Copy)]
pub enum Detection {
    /// Never auto-detected.
    None,
    /// Applied when all of these tables exist.
    Tables(&'static [&'static str]),
    /// Applied when this column exists.
    Column {
        table: &'static str,
        column: &'static str,
    },
}

/// A single migration script.
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub description: String,
    /// None means the SQL could not be found, which fails the migration.
    pub sql: Option<String>,
    pub detection: Detection,
}

impl Migration {
    /// Create a migration with no detection rule.
    pub fn new(id: impl Into<String>, name: impl Into<String>, sql: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        let filename = format!("{id}_{}.sql", name.to_lowercase().replace(' ', "_"));
        Self {
            id,
            name,
            filename,
            description: String::new(),
            sql: Some(sql.into()),
            detection: Detection::None,
        }
    }

    /// Set the detection rule.
    pub fn detected_by(mut self, detection: Detection) -> Self {
        self.detection = detection;
        self
    }

    fn checksum(&self) -> Option<String> {
        self.sql
            .as_deref()
            .map(|sql| hex::encode(Sha256::digest(sql.as_bytes())))
    }
}

/// A migration together with its applied state.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationInfo {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub description: String,
    pub applied: bool,
    pub applied_at: Option<String>,
    pub size: Option<usize>,
}

/// Summary of applied and pending migrations.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub total: usize,
    pub applied: usize,
    pub pending: usize,
    pub last_applied: Option<String>,
    pub migrations: Vec<MigrationInfo>,
}

/// Outcome of [`MigrationService::run_pending`].
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRunResult {
    pub success: bool,
    pub message: String,
    pub applied: Vec<String>,
    pub errors: Vec<String>,
}

/// Outcome of [`MigrationService::validate_schema`].
#[derive(Debug, Clone, Serialize)]
pub struct SchemaValidation {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Runs migrations against a database.
#[derive(Clone)]
pub struct MigrationService {
    pool: SqlitePool,
    migrations: Vec<Migration>,
}

impl std::fmt::Debug for MigrationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationService")
            .field("migrations", &self.migrations.len())
            .finish()
    }
}

impl MigrationService {
    /// Create a runner for the bundled migrations.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_migrations(pool, bundled_migrations())
    }

    /// Create a runner for an explicit migration list.
    pub fn with_migrations(pool: SqlitePool, mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by(|a, b| a.id.cmp(&b.id));
        Self { pool, migrations }
    }

    /// The migrations this runner manages, in id order.
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Create the `migrations` bookkeeping table.
    pub async fn initialize_migrations_table(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS migrations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                filename TEXT NOT NULL,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                checksum TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .context("failed to create migrations table")?;

        Ok(())
    }

    /// List every migration with its applied state.
    ///
    /// Migrations whose detection rule matches but which are not recorded
    /// are recorded as applied.
    pub async fn available_migrations(&self) -> Result<Vec<MigrationInfo>> {
        self.initialize_migrations_table().await?;

        let rows = sqlx::query("SELECT id, CAST(applied_at AS TEXT) AS applied_at FROM migrations")
            .fetch_all(&self.pool)
            .await
            .context("failed to read applied migrations")?;

        let recorded: HashMap<String, Option<String>> = rows
            .iter()
            .map(|r| (r.get("id"), r.get("applied_at")))
            .collect();

        let mut infos = Vec::with_capacity(self.migrations.len());

        for migration in &self.migrations {
            let (applied, applied_at) = match recorded.get(&migration.id) {
                Some(at) => (true, at.clone()),
                None if self.is_detected(migration).await? => {
                    info!(
                        migration = %migration.id,
                        "schema already present, recording migration as applied"
                    );
                    self.mark_applied(&migration.id, &migration.name, &migration.filename)
                        .await?;
                    (true, Some(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()))
                }
                None => (false, None),
            };

            infos.push(MigrationInfo {
                id: migration.id.clone(),
                name: migration.name.clone(),
                filename: migration.filename.clone(),
                description: migration.description.clone(),
                applied,
                applied_at,
                size: migration.sql.as_ref().map(String::len),
            });
        }

        Ok(infos)
    }

    async fn is_detected(&self, migration: &Migration) -> Result<bool> {
        match migration.detection {
            Detection::None => Ok(false),
            Detection::Tables(tables) => db::tables_exist(&self.pool, tables).await,
            Detection::Column { table, column } => {
                db::column_exists(&self.pool, table, column).await
            }
        }
    }

    /// Summarize applied and pending migrations.
    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        let migrations = self.available_migrations().await?;
        let applied = migrations.iter().filter(|m| m.applied).count();
        let last_applied = self.last_applied().await?;

        Ok(MigrationStatus {
            total: migrations.len(),
            applied,
            pending: migrations.len() - applied,
            last_applied,
            migrations,
        })
    }

    /// Record a migration as applied.
    pub async fn mark_applied(&self, id: &str, name: &str, filename: &str) -> Result<()> {
        let checksum = self
            .migrations
            .iter()
            .find(|m| m.id == id)
            .and_then(Migration::checksum);

        sqlx::query(
            "INSERT OR REPLACE INTO migrations (id, name, filename, applied_at, checksum) \
             VALUES (?, ?, ?, CURRENT_TIMESTAMP, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(filename)
        .bind(checksum)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to record migration '{id}'"))?;

        debug!(migration = %id, "migration recorded");
        Ok(())
    }

    /// Whether a migration is recorded as applied.
    pub async fn is_applied(&self, id: &str) -> Result<bool> {
        self.initialize_migrations_table().await?;

        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM migrations WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("cnt");
        Ok(count > 0)
    }

    /// The most recently applied migration id.
    pub async fn last_applied(&self) -> Result<Option<String>> {
        self.initialize_migrations_table().await?;

        let row = sqlx::query("SELECT id FROM migrations ORDER BY applied_at DESC, id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("id")))
    }

    /// Apply every pending migration in id order.
    ///
    /// A failing migration does not stop the run; later migrations are
    /// still attempted.
    pub async fn run_pending(&self) -> Result<MigrationRunResult> {
        let infos = self.available_migrations().await?;
        let pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| infos.iter().any(|i| i.id == m.id && !i.applied))
            .collect();

        if pending.is_empty() {
            return Ok(MigrationRunResult {
                success: true,
                message: "All migrations are up to date".to_string(),
                applied: Vec::new(),
                errors: Vec::new(),
            });
        }

        info!(count = pending.len(), "running pending migrations");

        let mut applied = Vec::new();
        let mut errors = Vec::new();

        for migration in pending {
            match self.apply_migration(migration).await {
                Ok(()) => {
                    info!(migration = %migration.id, name = %migration.name, "migration applied");
                    applied.push(migration.id.clone());
                }
                Err(e) => {
                    error!(migration = %migration.id, error = %format!("{e:#}"), "migration failed");
                    errors.push(format!("{}: {e:#}", migration.id));
                }
            }
        }

        if applied.is_empty() {
            return Ok(MigrationRunResult {
                success: false,
                message: format!("Failed to apply migrations: {}", errors.join("; ")),
                applied,
                errors,
            });
        }

        let message = if errors.is_empty() {
            format!("Applied {} migration(s)", applied.len())
        } else {
            format!(
                "Applied {} migration(s) ({} failed)",
                applied.len(),
                errors.len()
            )
        };

        Ok(MigrationRunResult {
            success: true,
            message,
            applied,
            errors,
        })
    }

    /// Apply a single migration by id, whether or not it is pending.
    pub async fn apply(&self, id: &str) -> Result<()> {
        let migration = self
            .migrations
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| MigrationError::Unknown { id: id.to_string() })?;

        self.initialize_migrations_table().await?;
        self.apply_migration(migration).await
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<()> {
        let Some(sql) = migration.sql.as_deref() else {
            return Err(MigrationError::MissingSql {
                id: migration.id.clone(),
            }
            .into());
        };

        if sql.trim().is_empty() {
            debug!(migration = %migration.id, "migration has empty SQL, recording only");
            return self
                .mark_applied(&migration.id, &migration.name, &migration.filename)
                .await;
        }

        for (index, statement) in split_sql_statements(sql).iter().enumerate() {
            if let Err(e) = sqlx::raw_sql(statement).execute(&self.pool).await {
                let details = e.to_string();
                if sql::is_tolerated_error(&details) {
                    warn!(
                        migration = %migration.id,
                        statement = index + 1,
                        error = %details,
                        "statement already applied, continuing"
                    );
                    continue;
                }
                return Err(MigrationError::statement_failed(&migration.id, index + 1, details).into());
            }
        }

        self.mark_applied(&migration.id, &migration.name, &migration.filename)
            .await
    }

    /// Check that the schema contains every required table and column.
    pub async fn validate_schema(&self) -> Result<SchemaValidation> {
        let mut issues = Vec::new();

        for table in REQUIRED_TABLES {
            if !db::table_exists(&self.pool, table).await? {
                issues.push(format!("Missing table: {table}"));
            }
        }

        if db::table_exists(&self.pool, "collections").await?
            && !db::column_exists(&self.pool, "collections", "managed").await?
        {
            issues.push("Missing column: collections.managed".to_string());
        }

        Ok(SchemaValidation {
            valid: issues.is_empty(),
            issues,
        })
    }
}
