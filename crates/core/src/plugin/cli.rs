//! CLI command implementations for plugin management.
//!
//! These commands need only a database pool.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::bootstrap::PluginBootstrapService;
use super::service::PluginService;

/// List installed plugins and their status.
pub async fn cmd_plugin_list(pool: &SqlitePool) -> Result<()> {
    let service = PluginService::new(pool.clone());
    let plugins = service.all_plugins().await?;

    if plugins.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }

    println!(
        "{:<24} {:<14} {:<10} {:<6} {:<14}",
        "PLUGIN", "VERSION", "STATUS", "CORE", "CATEGORY"
    );
    println!("{}", "-".repeat(72));

    for plugin in &plugins {
        let core = if plugin.is_core { "yes" } else { "no" };
        println!(
            "{:<24} {:<14} {:<10} {:<6} {}",
            plugin.name, plugin.version, plugin.status, core, plugin.category
        );
    }

    let stats = service.plugin_stats().await?;
    println!();
    println!(
        "{} total, {} active, {} inactive, {} errored",
        stats.total, stats.active, stats.inactive, stats.errors
    );

    Ok(())
}

/// Install or upgrade the core plugins.
pub async fn cmd_plugin_bootstrap(pool: &SqlitePool, demo: bool) -> Result<()> {
    let bootstrap = PluginBootstrapService::new(pool.clone());
    let report = bootstrap.bootstrap_core_plugins().await?;

    for name in &report.installed {
        println!("  installed: {name}");
    }
    for name in &report.updated {
        println!("  updated: {name}");
    }
    for name in &report.activated {
        println!("  activated: {name}");
    }
    for name in &report.skipped {
        println!("  skipped (missing tables): {name}");
    }
    for (name, error) in &report.failed {
        println!("  failed: {name}: {error}");
    }

    if demo {
        for name in bootstrap.install_demo_plugins().await? {
            println!("  installed demo: {name}");
        }
    }

    println!("Core plugin bootstrap complete.");
    Ok(())
}

/// Activate a plugin by name.
pub async fn cmd_plugin_activate(pool: &SqlitePool, name: &str) -> Result<()> {
    let service = PluginService::new(pool.clone());
    let plugin = service
        .get_plugin_by_name(name)
        .await?
        .with_context(|| format!("plugin '{name}' is not installed"))?;

    service.activate_plugin(&plugin.id).await?;
    println!("Plugin '{}' v{} activated.", plugin.name, plugin.version);
    Ok(())
}

/// Deactivate a plugin by name.
pub async fn cmd_plugin_deactivate(pool: &SqlitePool, name: &str) -> Result<()> {
    let service = PluginService::new(pool.clone());
    let plugin = service
        .get_plugin_by_name(name)
        .await?
        .with_context(|| format!("plugin '{name}' is not installed"))?;

    service.deactivate_plugin(&plugin.id).await?;
    println!("Plugin '{}' deactivated.", plugin.name);
    Ok(())
}
