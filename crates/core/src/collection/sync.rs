//! Synchronization of collection configs into the `collections` table.

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::config::CollectionConfig;
use super::registry::CollectionRegistry;
use crate::db::now_millis;
use crate::models::collection::CollectionRow;

/// What happened to a collection during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Created,
    Updated,
    Unchanged,
    Error,
}

/// Per-collection sync outcome.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub name: String,
    pub status: SyncStatus,
    pub message: Option<String>,
}

impl SyncResult {
    fn new(name: &str, status: SyncStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: None,
        }
    }

    fn error(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: SyncStatus::Error,
            message: Some(message.into()),
        }
    }
}

/// Outcome of [`full_collection_sync`].
#[derive(Debug, Clone, Serialize)]
pub struct FullSyncReport {
    pub results: Vec<SyncResult>,
    /// Managed collections deactivated because their config is gone.
    pub removed: Vec<String>,
}

/// Sync every config and log a summary.
pub async fn sync_collections(pool: &SqlitePool, configs: &[CollectionConfig]) -> Vec<SyncResult> {
    let mut results = Vec::with_capacity(configs.len());

    for config in configs {
        results.push(sync_collection(pool, config).await);
    }

    let count = |status| results.iter().filter(|r| r.status == status).count();
    info!(
        created = count(SyncStatus::Created),
        updated = count(SyncStatus::Updated),
        unchanged = count(SyncStatus::Unchanged),
        errors = count(SyncStatus::Error),
        "collection sync complete"
    );

    results
}

/// Create or update the row for one config.
pub async fn sync_collection(pool: &SqlitePool, config: &CollectionConfig) -> SyncResult {
    let validation = config.validate();
    if !validation.valid {
        let errors = validation.errors.join(", ");
        error!(collection = %config.name, errors = %errors, "invalid collection config");
        return SyncResult::error(&config.name, format!("Validation failed: {errors}"));
    }

    match upsert_collection(pool, config).await {
        Ok(status) => {
            debug!(collection = %config.name, status = ?status, "collection synced");
            SyncResult::new(&config.name, status)
        }
        Err(e) => {
            error!(collection = %config.name, error = %format!("{e:#}"), "collection sync failed");
            SyncResult::error(&config.name, format!("{e:#}"))
        }
    }
}

async fn upsert_collection(pool: &SqlitePool, config: &CollectionConfig) -> Result<SyncStatus> {
    let schema = config.schema_json()?;
    let now = now_millis();

    let existing = CollectionRow::find_by_name(pool, &config.name).await?;

    let Some(existing) = existing else {
        let short_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let id = format!("col-{}-{short_id}", config.name);

        sqlx::query(
            "INSERT INTO collections \
             (id, name, display_name, description, schema, is_active, managed, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&config.name)
        .bind(&config.display_name)
        .bind(&config.description)
        .bind(&schema)
        .bind(config.is_active)
        .bind(config.managed)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .with_context(|| format!("failed to insert collection '{}'", config.name))?;

        info!(collection = %config.name, id = %id, "collection created");
        return Ok(SyncStatus::Created);
    };

    let stored_schema: Option<serde_json::Value> = serde_json::from_str(&existing.schema).ok();
    let wanted_schema = serde_json::to_value(&config.schema).ok();

    let changed = stored_schema != wanted_schema
        || existing.display_name != config.display_name
        || existing.description != config.description
        || existing.is_active != config.is_active
        || existing.managed != config.managed;

    if !changed {
        return Ok(SyncStatus::Unchanged);
    }

    sqlx::query(
        "UPDATE collections \
         SET display_name = ?, description = ?, schema = ?, is_active = ?, managed = ?, updated_at = ? \
         WHERE name = ?",
    )
    .bind(&config.display_name)
    .bind(&config.description)
    .bind(&schema)
    .bind(config.is_active)
    .bind(config.managed)
    .bind(now)
    .bind(&config.name)
    .execute(pool)
    .await
    .with_context(|| format!("failed to update collection '{}'", config.name))?;

    info!(collection = %config.name, "collection updated");
    Ok(SyncStatus::Updated)
}

/// Whether the named collection is owned by config.
pub async fn is_collection_managed(pool: &SqlitePool, name: &str) -> Result<bool> {
    Ok(CollectionRow::find_by_name(pool, name)
        .await?
        .is_some_and(|c| c.managed))
}

/// All collections owned by config.
pub async fn managed_collections(pool: &SqlitePool) -> Result<Vec<CollectionRow>> {
    CollectionRow::list_managed(pool).await
}

/// Deactivate managed collections that no longer have a config.
///
/// Returns the names of the deactivated collections. Rows are kept so
/// existing content stays attached.
pub async fn cleanup_removed_collections(
    pool: &SqlitePool,
    configs: &[CollectionConfig],
) -> Result<Vec<String>> {
    let wanted: HashSet<&str> = configs.iter().map(|c| c.name.as_str()).collect();
    let mut removed = Vec::new();

    for collection in CollectionRow::list_managed(pool).await? {
        if !collection.is_active || wanted.contains(collection.name.as_str()) {
            continue;
        }

        sqlx::query("UPDATE collections SET is_active = 0, updated_at = ? WHERE name = ?")
            .bind(now_millis())
            .bind(&collection.name)
            .execute(pool)
            .await
            .with_context(|| format!("failed to deactivate collection '{}'", collection.name))?;

        info!(collection = %collection.name, "deactivated managed collection with no config");
        removed.push(collection.name);
    }

    Ok(removed)
}

/// Load all configs, sync them, then deactivate removed managed collections.
pub async fn full_collection_sync(
    pool: &SqlitePool,
    registry: &CollectionRegistry,
) -> Result<FullSyncReport> {
    let configs = registry.load_configs()?;
    let results = sync_collections(pool, &configs).await;
    let removed = cleanup_removed_collections(pool, &configs).await?;

    Ok(FullSyncReport { results, removed })
}
