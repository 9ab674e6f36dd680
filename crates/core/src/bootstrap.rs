//! One-time system initialization: migrations, collection sync and the
//! core plugins.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::collection::{CollectionRegistry, full_collection_sync};
use crate::migration::MigrationService;
use crate::plugin::PluginBootstrapService;

/// Path prefixes that never trigger bootstrap.
const SKIP_PREFIXES: &[&str] = &["/images/", "/assets/"];

/// File extensions that never trigger bootstrap.
const SKIP_EXTENSIONS: &[&str] = &[".js", ".css", ".png", ".jpg", ".ico"];

/// Runs system initialization once per process.
///
/// Concurrent callers wait on the same lock; the first to finish marks the
/// bootstrap complete and later calls return immediately. A failed run is
/// not marked, so the next call retries.
#[derive(Clone)]
pub struct SystemBootstrap {
    pool: SqlitePool,
    registry: CollectionRegistry,
    done: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for SystemBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemBootstrap")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl SystemBootstrap {
    pub fn new(pool: SqlitePool, registry: CollectionRegistry) -> Self {
        Self {
            pool,
            registry,
            done: Arc::new(Mutex::new(false)),
        }
    }

    /// Whether a run has completed.
    pub async fn is_complete(&self) -> bool {
        *self.done.lock().await
    }

    /// Run the bootstrap unless it already completed.
    pub async fn run(&self) -> Result<()> {
        let mut done = self.done.lock().await;
        if *done {
            return Ok(());
        }

        info!("starting system bootstrap");

        let migrations = MigrationService::new(self.pool.clone());
        let result = migrations
            .run_pending()
            .await
            .context("failed to run migrations")?;
        if !result.success {
            anyhow::bail!("migrations failed: {}", result.message);
        }
        debug!(applied = result.applied.len(), "migrations complete");

        match full_collection_sync(&self.pool, &self.registry).await {
            Ok(report) => debug!(
                synced = report.results.len(),
                removed = report.removed.len(),
                "collections synced"
            ),
            Err(e) => error!(error = %format!("{e:#}"), "collection sync failed"),
        }

        let plugins = PluginBootstrapService::new(self.pool.clone());
        if plugins.is_bootstrap_needed().await {
            let report = plugins
                .bootstrap_core_plugins()
                .await
                .context("failed to bootstrap core plugins")?;
            debug!(
                installed = report.installed.len(),
                failed = report.failed.len(),
                "core plugins bootstrapped"
            );
        }

        *done = true;
        info!("system bootstrap complete");
        Ok(())
    }

    /// Run the bootstrap for a request path unless it is a static asset.
    pub async fn ensure_for_path(&self, path: &str) -> Result<()> {
        if should_skip_path(path) {
            return Ok(());
        }
        self.run().await
    }
}

/// Static assets and health checks do not need an initialized system.
pub fn should_skip_path(path: &str) -> bool {
    path == "/health"
        || SKIP_PREFIXES.iter().any(|p| path.starts_with(p))
        || SKIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_paths_are_skipped() {
        assert!(should_skip_path("/health"));
        assert!(should_skip_path("/images/logo.svg"));
        assert!(should_skip_path("/assets/app"));
        assert!(should_skip_path("/admin/app.js"));
        assert!(should_skip_path("/style.css"));
        assert!(should_skip_path("/favicon.ico"));
        assert!(should_skip_path("/img/photo.jpg"));
    }

    #[test]
    fn application_paths_are_not_skipped() {
        assert!(!should_skip_path("/"));
        assert!(!should_skip_path("/admin"));
        assert!(!should_skip_path("/api/content"));
        assert!(!should_skip_path("/healthz"));
        assert!(!should_skip_path("/images"));
    }
}
