//! CLI command implementations for migrations, collections, settings and
//! logs. Plugin commands live in `plugin::cli`.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::bootstrap::SystemBootstrap;
use crate::collection::{CollectionRegistry, SyncStatus, full_collection_sync};
use crate::logger::Logger;
use crate::migration::MigrationService;
use crate::models::CollectionRow;
use crate::settings::SettingsService;

/// Print every migration and whether it is applied.
pub async fn cmd_migrate_status(pool: &SqlitePool) -> Result<()> {
    let status = MigrationService::new(pool.clone()).migration_status().await?;

    println!("{:<6} {:<40} {:<10} APPLIED AT", "ID", "NAME", "STATUS");
    println!("{}", "-".repeat(80));

    for m in &status.migrations {
        let state = if m.applied { "applied" } else { "pending" };
        println!(
            "{:<6} {:<40} {:<10} {}",
            m.id,
            m.name,
            state,
            m.applied_at.as_deref().unwrap_or("-")
        );
    }

    println!();
    println!(
        "{} total, {} applied, {} pending",
        status.total, status.applied, status.pending
    );
    Ok(())
}

/// Apply pending migrations.
pub async fn cmd_migrate_run(pool: &SqlitePool) -> Result<()> {
    let result = MigrationService::new(pool.clone()).run_pending().await?;

    for id in &result.applied {
        println!("  applied: {id}");
    }
    for error in &result.errors {
        println!("  failed: {error}");
    }
    println!("{}", result.message);

    if !result.success {
        anyhow::bail!("migrations failed");
    }
    Ok(())
}

/// Check that the schema has every required table and column.
pub async fn cmd_migrate_validate(pool: &SqlitePool) -> Result<()> {
    let validation = MigrationService::new(pool.clone()).validate_schema().await?;

    if validation.valid {
        println!("Schema is valid.");
        return Ok(());
    }

    for issue in &validation.issues {
        println!("  {issue}");
    }
    anyhow::bail!("schema has {} issue(s)", validation.issues.len())
}

/// Sync collection configs into the database.
pub async fn cmd_collections_sync(pool: &SqlitePool, registry: &CollectionRegistry) -> Result<()> {
    let report = full_collection_sync(pool, registry).await?;

    for result in &report.results {
        let status = match result.status {
            SyncStatus::Created => "created",
            SyncStatus::Updated => "updated",
            SyncStatus::Unchanged => "unchanged",
            SyncStatus::Error => "error",
        };
        match &result.message {
            Some(message) => println!("  {:<24} {status}: {message}", result.name),
            None => println!("  {:<24} {status}", result.name),
        }
    }
    for name in &report.removed {
        println!("  {name:<24} deactivated (config removed)");
    }

    let errors = report
        .results
        .iter()
        .filter(|r| r.status == SyncStatus::Error)
        .count();
    println!("Synced {} collection(s), {errors} error(s).", report.results.len());
    Ok(())
}

/// List collections stored in the database.
pub async fn cmd_collections_list(pool: &SqlitePool) -> Result<()> {
    let collections = CollectionRow::list(pool).await?;

    if collections.is_empty() {
        println!("No collections.");
        return Ok(());
    }

    println!("{:<24} {:<30} {:<8} MANAGED", "NAME", "DISPLAY NAME", "ACTIVE");
    println!("{}", "-".repeat(72));

    for c in &collections {
        println!(
            "{:<24} {:<30} {:<8} {}",
            c.name,
            c.display_name,
            if c.is_active { "yes" } else { "no" },
            if c.managed { "yes" } else { "no" }
        );
    }
    Ok(())
}

/// Print a single setting as JSON.
pub async fn cmd_settings_get(pool: &SqlitePool, category: &str, key: &str) -> Result<()> {
    let settings = SettingsService::new(pool.clone());

    match settings.get_setting(category, key).await? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("{category}.{key} is not set."),
    }
    Ok(())
}

/// Store a setting. `raw` must be valid JSON; bare words are stored as strings.
pub async fn cmd_settings_set(pool: &SqlitePool, category: &str, key: &str, raw: &str) -> Result<()> {
    let value: Value =
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    SettingsService::new(pool.clone())
        .set_setting(category, key, &value)
        .await?;
    println!("{category}.{key} saved.");
    Ok(())
}

/// Delete log entries past their category's retention.
pub async fn cmd_logs_cleanup(pool: &SqlitePool) -> Result<()> {
    let removed = Logger::new(pool.clone()).cleanup_by_retention().await?;
    println!("Removed {removed} log entr{}.", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

/// Run the full system bootstrap.
pub async fn cmd_init(pool: &SqlitePool, registry: &CollectionRegistry) -> Result<()> {
    SystemBootstrap::new(pool.clone(), registry.clone())
        .run()
        .await
        .context("system bootstrap failed")?;
    println!("Headwind is initialized.");
    Ok(())
}
