//! Plugin registry: install, activate, deactivate and uninstall plugins,
//! and record their hooks, routes, assets and activity.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bootstrap::PluginBootstrapService;
use super::error::PluginError;
use super::manifest::PluginManifest;
use super::status::{self, STATUS_ACTIVE, STATUS_ERROR, STATUS_INACTIVE};
use crate::db::now_secs;
use crate::models::plugin::{PluginActivity, PluginAsset, PluginHook, PluginRecord, PluginRoute};

/// Default handler priority for hooks registered without one.
pub const DEFAULT_HOOK_PRIORITY: i64 = 10;

/// Default number of activity entries returned by [`PluginService::plugin_activity`].
pub const DEFAULT_ACTIVITY_LIMIT: i64 = 10;

/// Data for installing a plugin. Unset fields take registry defaults.
#[derive(Debug, Clone, Default)]
pub struct NewPlugin {
    pub id: Option<String>,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub permissions: Vec<String>,
    pub dependencies: Vec<String>,
    pub settings: Option<serde_json::Value>,
    pub is_core: bool,
}

impl NewPlugin {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl From<&PluginManifest> for NewPlugin {
    fn from(manifest: &PluginManifest) -> Self {
        Self {
            id: Some(manifest.plugin_id().to_string()),
            name: manifest.name.clone(),
            display_name: manifest.display_name.clone(),
            description: Some(manifest.description.clone()),
            version: Some(manifest.version.clone()),
            author: Some(manifest.author.clone()),
            category: Some(manifest.category.clone()),
            icon: manifest.icon.clone(),
            permissions: manifest.permissions.keys().cloned().collect(),
            dependencies: manifest.dependencies.clone(),
            settings: Some(serde_json::Value::Object(manifest.settings.clone())),
            is_core: false,
        }
    }
}

/// Plugin counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct PluginStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub errors: i64,
}

/// Plugin registry backed by the `plugins` tables.
#[derive(Clone)]
pub struct PluginService {
    pool: SqlitePool,
}

impl std::fmt::Debug for PluginService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginService").finish_non_exhaustive()
    }
}

impl PluginService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All plugins, core first, then by display name.
    ///
    /// Installs missing core plugins before listing.
    pub async fn all_plugins(&self) -> Result<Vec<PluginRecord>> {
        let bootstrap = PluginBootstrapService::new(self.pool.clone());
        if bootstrap.is_bootstrap_needed().await {
            if let Err(e) = bootstrap.bootstrap_core_plugins().await {
                warn!(error = %format!("{e:#}"), "failed to ensure core plugins");
            }
        }

        sqlx::query_as::<_, PluginRecord>(
            "SELECT * FROM plugins ORDER BY is_core DESC, display_name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list plugins")
    }

    /// A plugin by id.
    pub async fn get_plugin(&self, id: &str) -> Result<Option<PluginRecord>> {
        sqlx::query_as::<_, PluginRecord>("SELECT * FROM plugins WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load plugin '{id}'"))
    }

    /// A plugin by machine name.
    pub async fn get_plugin_by_name(&self, name: &str) -> Result<Option<PluginRecord>> {
        sqlx::query_as::<_, PluginRecord>("SELECT * FROM plugins WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load plugin '{name}'"))
    }

    async fn require_plugin(&self, id: &str) -> Result<PluginRecord> {
        self.get_plugin(id)
            .await?
            .ok_or_else(|| PluginError::not_found(id).into())
    }

    /// Counts of plugins by status.
    pub async fn plugin_stats(&self) -> Result<PluginStats> {
        sqlx::query_as::<_, PluginStats>(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active, \
             COALESCE(SUM(CASE WHEN status = 'inactive' THEN 1 ELSE 0 END), 0) AS inactive, \
             COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0) AS errors \
             FROM plugins",
        )
        .fetch_one(&self.pool)
        .await
        .context("failed to count plugins")
    }

    /// Install a plugin in the inactive state.
    pub async fn install_plugin(&self, data: NewPlugin) -> Result<PluginRecord> {
        let id = data
            .id
            .clone()
            .unwrap_or_else(|| format!("plugin-{}", Uuid::new_v4()));
        let now = now_secs();

        let permissions = serde_json::to_string(&data.permissions)?;
        let dependencies = serde_json::to_string(&data.dependencies)?;
        let settings = serde_json::to_string(
            &data.settings.clone().unwrap_or_else(|| serde_json::json!({})),
        )?;

        sqlx::query(
            "INSERT INTO plugins \
             (id, name, display_name, description, version, author, category, icon, status, \
              is_core, settings, permissions, dependencies, installed_at, last_updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&data.name)
        .bind(data.display_name.as_deref().unwrap_or("Unnamed Plugin"))
        .bind(&data.description)
        .bind(data.version.as_deref().unwrap_or("1.0.0"))
        .bind(data.author.as_deref().unwrap_or("Unknown"))
        .bind(data.category.as_deref().unwrap_or("utilities"))
        .bind(data.icon.as_deref().unwrap_or("🔌"))
        .bind(STATUS_INACTIVE)
        .bind(data.is_core)
        .bind(&settings)
        .bind(&permissions)
        .bind(&dependencies)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to install plugin '{}'", data.name))?;

        self.log_activity(
            &id,
            "installed",
            None,
            Some(&serde_json::json!({ "name": data.name, "version": data.version })),
        )
        .await?;

        info!(plugin = %data.name, id = %id, "plugin installed");
        self.require_plugin(&id).await
    }

    /// Install a plugin from its manifest and register its hooks and routes.
    pub async fn install_from_manifest(&self, manifest: &PluginManifest) -> Result<PluginRecord> {
        manifest.validate()?;

        let plugin = self.install_plugin(NewPlugin::from(manifest)).await?;

        for (hook, handler) in &manifest.hooks {
            self.register_hook(&plugin.id, hook, handler, None).await?;
        }

        for route in &manifest.routes {
            self.register_route(
                &plugin.id,
                &route.path,
                &route.method.to_uppercase(),
                &route.handler,
                &[],
            )
            .await?;
        }

        debug!(
            plugin = %plugin.name,
            hooks = manifest.hooks.len(),
            routes = manifest.routes.len(),
            "manifest registered"
        );
        Ok(plugin)
    }

    /// Remove a plugin along with its hooks, routes and assets.
    pub async fn uninstall_plugin(&self, id: &str) -> Result<()> {
        let plugin = self.require_plugin(id).await?;

        if plugin.is_core {
            return Err(PluginError::CoreUninstall {
                plugin: plugin.name,
            }
            .into());
        }

        if plugin.is_active() {
            self.deactivate_plugin(id).await?;
        }

        self.log_activity(
            id,
            "uninstalled",
            None,
            Some(&serde_json::json!({ "name": plugin.name })),
        )
        .await?;

        sqlx::query("DELETE FROM plugins WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to uninstall plugin '{id}'"))?;

        info!(plugin = %plugin.name, "plugin uninstalled");
        Ok(())
    }

    /// Activate a plugin once all of its dependencies are active.
    pub async fn activate_plugin(&self, id: &str) -> Result<()> {
        let plugin = self.require_plugin(id).await?;

        for dependency in plugin.dependency_names() {
            if !status::is_plugin_active(&self.pool, &dependency).await? {
                return Err(PluginError::DependencyNotActive {
                    plugin: plugin.name,
                    dependency,
                }
                .into());
            }
        }

        let now = now_secs();
        sqlx::query(
            "UPDATE plugins SET status = ?, activated_at = ?, error_message = NULL, updated_at = ? \
             WHERE id = ?",
        )
        .bind(STATUS_ACTIVE)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to activate plugin '{id}'"))?;

        self.log_activity(id, "activated", None, None).await?;
        info!(plugin = %plugin.name, "plugin activated");
        Ok(())
    }

    /// Deactivate a plugin unless active plugins depend on it.
    pub async fn deactivate_plugin(&self, id: &str) -> Result<()> {
        let plugin = self.require_plugin(id).await?;

        let dependents = self.active_dependents(&plugin).await?;
        if !dependents.is_empty() {
            return Err(PluginError::has_dependents(plugin.name, &dependents).into());
        }

        sqlx::query(
            "UPDATE plugins SET status = ?, activated_at = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(STATUS_INACTIVE)
        .bind(now_secs())
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to deactivate plugin '{id}'"))?;

        self.log_activity(id, "deactivated", None, None).await?;
        info!(plugin = %plugin.name, "plugin deactivated");
        Ok(())
    }

    /// Names of active plugins that declare `plugin` as a dependency.
    async fn active_dependents(&self, plugin: &PluginRecord) -> Result<Vec<String>> {
        let pattern = format!("%\"{}\"%", plugin.name);

        let candidates = sqlx::query_as::<_, PluginRecord>(
            "SELECT * FROM plugins WHERE status = ? AND id != ? AND dependencies LIKE ? \
             ORDER BY name",
        )
        .bind(STATUS_ACTIVE)
        .bind(&plugin.id)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to find dependents of '{}'", plugin.name))?;

        // LIKE can over-match; confirm against the parsed list.
        Ok(candidates
            .into_iter()
            .filter(|c| c.dependency_names().contains(&plugin.name))
            .map(|c| c.name)
            .collect())
    }

    /// Replace a plugin's settings.
    pub async fn update_plugin_settings(&self, id: &str, settings: &serde_json::Value) -> Result<()> {
        self.require_plugin(id).await?;

        sqlx::query("UPDATE plugins SET settings = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(settings)?)
            .bind(now_secs())
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update settings of plugin '{id}'"))?;

        self.log_activity(id, "settings_updated", None, None).await
    }

    /// Put a plugin into the error state.
    pub async fn set_plugin_error(&self, id: &str, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE plugins SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(STATUS_ERROR)
        .bind(message)
        .bind(now_secs())
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to record error for plugin '{id}'"))?;

        warn!(plugin_id = %id, error = %message, "plugin marked as errored");
        self.log_activity(id, "error", None, Some(&serde_json::json!({ "error": message })))
            .await
    }

    /// Recent activity for a plugin, newest first.
    pub async fn plugin_activity(
        &self,
        id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<PluginActivity>> {
        sqlx::query_as::<_, PluginActivity>(
            "SELECT * FROM plugin_activity_log WHERE plugin_id = ? \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?",
        )
        .bind(id)
        .bind(limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load activity of plugin '{id}'"))
    }

    /// Record a plugin activity entry.
    pub async fn log_activity(
        &self,
        plugin_id: &str,
        action: &str,
        user_id: Option<&str>,
        details: Option<&serde_json::Value>,
    ) -> Result<()> {
        let details = details.map(serde_json::to_string).transpose()?;

        sqlx::query(
            "INSERT INTO plugin_activity_log (id, plugin_id, action, user_id, details, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(plugin_id)
        .bind(action)
        .bind(user_id)
        .bind(details)
        .bind(now_secs())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to log '{action}' for plugin '{plugin_id}'"))?;

        debug!(plugin_id = %plugin_id, action = %action, "plugin activity logged");
        Ok(())
    }

    /// Register a hook handler for a plugin, updating it if already present.
    pub async fn register_hook(
        &self,
        plugin_id: &str,
        hook_name: &str,
        handler_name: &str,
        priority: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO plugin_hooks (id, plugin_id, hook_name, handler_name, priority, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, 1, ?) \
             ON CONFLICT(plugin_id, hook_name, handler_name) \
             DO UPDATE SET priority = excluded.priority, is_active = 1",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(plugin_id)
        .bind(hook_name)
        .bind(handler_name)
        .bind(priority.unwrap_or(DEFAULT_HOOK_PRIORITY))
        .bind(now_secs())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to register hook '{hook_name}' for '{plugin_id}'"))?;

        Ok(())
    }

    /// Register a route for a plugin, updating it if already present.
    pub async fn register_route(
        &self,
        plugin_id: &str,
        path: &str,
        method: &str,
        handler_name: &str,
        middleware: &[String],
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO plugin_routes (id, plugin_id, path, method, handler_name, middleware, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, 1, ?) \
             ON CONFLICT(plugin_id, path, method) \
             DO UPDATE SET handler_name = excluded.handler_name, middleware = excluded.middleware, is_active = 1",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(plugin_id)
        .bind(path)
        .bind(method)
        .bind(handler_name)
        .bind(serde_json::to_string(middleware)?)
        .bind(now_secs())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to register route {method} {path} for '{plugin_id}'"))?;

        Ok(())
    }

    /// Active hooks of a plugin by ascending priority.
    pub async fn plugin_hooks(&self, plugin_id: &str) -> Result<Vec<PluginHook>> {
        sqlx::query_as::<_, PluginHook>(
            "SELECT * FROM plugin_hooks WHERE plugin_id = ? AND is_active = 1 \
             ORDER BY priority ASC, hook_name ASC",
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load hooks of plugin '{plugin_id}'"))
    }

    /// Active routes of a plugin.
    pub async fn plugin_routes(&self, plugin_id: &str) -> Result<Vec<PluginRoute>> {
        sqlx::query_as::<_, PluginRoute>(
            "SELECT * FROM plugin_routes WHERE plugin_id = ? AND is_active = 1 ORDER BY path, method",
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load routes of plugin '{plugin_id}'"))
    }

    /// Register a static asset for a plugin. Returns the asset id.
    pub async fn register_asset(
        &self,
        plugin_id: &str,
        asset_type: &str,
        asset_path: &str,
        load_order: Option<i64>,
        load_location: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO plugin_assets (id, plugin_id, asset_type, asset_path, load_order, load_location, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&id)
        .bind(plugin_id)
        .bind(asset_type)
        .bind(asset_path)
        .bind(load_order.unwrap_or(100))
        .bind(load_location.unwrap_or("footer"))
        .bind(now_secs())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to register {asset_type} asset for '{plugin_id}'"))?;

        Ok(id)
    }

    /// Active assets of a plugin in load order.
    pub async fn plugin_assets(&self, plugin_id: &str) -> Result<Vec<PluginAsset>> {
        sqlx::query_as::<_, PluginAsset>(
            "SELECT * FROM plugin_assets WHERE plugin_id = ? AND is_active = 1 \
             ORDER BY load_order ASC, asset_path ASC",
        )
        .bind(plugin_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load assets of plugin '{plugin_id}'"))
    }
}
