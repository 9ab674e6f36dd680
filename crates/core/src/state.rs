//! Services shared by a consuming application.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use sqlx::SqlitePool;
use tracing::info;

use crate::bootstrap::SystemBootstrap;
use crate::cache::{CacheConfig, CacheService};
use crate::collection::CollectionRegistry;
use crate::config::Config;
use crate::db;
use crate::logger::Logger;
use crate::migration::MigrationService;
use crate::plugin::{HookSystem, PluginManager, PluginService};
use crate::settings::SettingsService;
use crate::telemetry::{TelemetryConfig, TelemetryService};

/// Default TTL of the shared cache, in seconds.
const CACHE_TTL_SECS: u64 = 300;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: SqlitePool,
    collections: CollectionRegistry,
    migrations: MigrationService,
    plugins: PluginService,
    hooks: HookSystem,
    plugin_manager: PluginManager,
    logger: Logger,
    cache: CacheService,
    settings: SettingsService,
    telemetry: TelemetryService,
    bootstrap: SystemBootstrap,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("collections", &self.inner.collections)
            .field("telemetry", &self.inner.telemetry)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Connect to the database and build every service.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config).await?;
        info!(url = %config.database_url, "database connected");

        Self::with_pool(pool, config, TelemetryConfig::from_env())
    }

    /// Build every service on an existing pool.
    pub fn with_pool(
        pool: SqlitePool,
        config: &Config,
        telemetry: TelemetryConfig,
    ) -> Result<Self> {
        let redis = config
            .redis_url
            .as_deref()
            .map(RedisClient::open)
            .transpose()
            .context("invalid REDIS_URL")?;
        if redis.is_some() {
            info!("cache backed by Redis");
        }

        let collections = CollectionRegistry::with_dir(config.collections_dir.clone());
        let hooks = HookSystem::new();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                migrations: MigrationService::new(pool.clone()),
                plugins: PluginService::new(pool.clone()),
                plugin_manager: PluginManager::new(hooks.clone()),
                hooks,
                logger: Logger::new(pool.clone()),
                cache: CacheService::new(CacheConfig::new(CACHE_TTL_SECS, "headwind"), redis),
                settings: SettingsService::new(pool.clone()),
                telemetry: TelemetryService::new(telemetry, config.version.clone()),
                bootstrap: SystemBootstrap::new(pool.clone(), collections.clone()),
                collections,
                db: pool,
            }),
        })
    }

    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    pub fn collections(&self) -> &CollectionRegistry {
        &self.inner.collections
    }

    pub fn migrations(&self) -> &MigrationService {
        &self.inner.migrations
    }

    pub fn plugins(&self) -> &PluginService {
        &self.inner.plugins
    }

    pub fn hooks(&self) -> &HookSystem {
        &self.inner.hooks
    }

    /// Runtime for plugins linked into the host. Shares [`hooks`](Self::hooks).
    pub fn plugin_manager(&self) -> &PluginManager {
        &self.inner.plugin_manager
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    pub fn cache(&self) -> &CacheService {
        &self.inner.cache
    }

    pub fn settings(&self) -> &SettingsService {
        &self.inner.settings
    }

    pub fn telemetry(&self) -> &TelemetryService {
        &self.inner.telemetry
    }

    pub fn bootstrap(&self) -> &SystemBootstrap {
        &self.inner.bootstrap
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }
}
