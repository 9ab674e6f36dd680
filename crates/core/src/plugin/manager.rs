//! In-process plugin runtime.
//!
//! Plugins compiled into the host implement [`Plugin`]. The manager keeps
//! them in memory, wires their hooks into the shared [`HookSystem`] through
//! a per-plugin scope and runs their lifecycle callbacks in dependency
//! order. Persisted plugin rows are handled by
//! [`PluginService`](super::service::PluginService).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use super::dependency::resolve_load_order;
use super::error::PluginError;
use super::hooks::{HookContext, HookSystem, ScopedHooks};
use super::manifest::identity_problems;

/// Priority given to middleware that does not set one.
pub const DEFAULT_MIDDLEWARE_PRIORITY: i32 = 10;

/// A route served by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSpec {
    pub path: String,
    pub method: String,
    pub handler: String,
}

impl RouteSpec {
    pub fn new(method: &str, path: &str, handler: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_uppercase(),
            handler: handler.to_string(),
        }
    }
}

/// Middleware a plugin adds to the host's request pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiddlewareSpec {
    pub name: String,
    pub priority: i32,
    /// Applies to every route, not only the plugin's own.
    pub global: bool,
}

impl MiddlewareSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: DEFAULT_MIDDLEWARE_PRIORITY,
            global: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }
}

/// Runtime configuration of one plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
}

impl PluginConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// A configuration tagged with its plugin name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedPluginConfig {
    pub name: String,
    #[serde(flatten)]
    pub config: PluginConfig,
}

/// Every stored plugin configuration, as exported and imported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfigExport {
    pub plugins: Vec<NamedPluginConfig>,
}

/// Runtime state of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub name: String,
    pub version: String,
    pub active: bool,
    pub installed: bool,
    pub has_errors: bool,
    pub errors: Vec<String>,
    pub last_error: Option<String>,
}

impl RuntimeStatus {
    fn registered(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            active: false,
            installed: true,
            has_errors: false,
            errors: Vec::new(),
            last_error: None,
        }
    }

    fn unknown(name: &str) -> Self {
        Self {
            installed: false,
            ..Self::registered(name, "unknown")
        }
    }

    fn record_error(&mut self, message: String) {
        self.has_errors = true;
        self.errors.push(message.clone());
        self.last_error = Some(message);
    }
}

/// Counts over the registered plugins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub with_errors: usize,
}

/// Runtime overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub registry: RegistryStats,
    /// Handler count per hook.
    pub hooks: BTreeMap<String, usize>,
    /// Plugins that serve routes.
    pub routes: usize,
    pub middleware: usize,
}

/// What a lifecycle callback gets to work with.
pub struct PluginContext<'a> {
    pub config: &'a PluginConfig,
    /// Hooks registered here are removed when the plugin is uninstalled.
    pub hooks: &'a ScopedHooks,
}

/// A plugin linked into the host.
///
/// Only `name` and `version` are required. Callbacks that fail leave the
/// plugin marked with the error.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Names of plugins that must be registered first and active before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn routes(&self) -> Vec<RouteSpec> {
        Vec::new()
    }

    fn middleware(&self) -> Vec<MiddlewareSpec> {
        Vec::new()
    }

    /// Register hook handlers. Called once, during install.
    fn register_hooks(&self, _hooks: &ScopedHooks) {}

    async fn install(&self, _ctx: &PluginContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn uninstall(&self, _ctx: &PluginContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn activate(&self, _ctx: &PluginContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn deactivate(&self, _ctx: &PluginContext<'_>) -> Result<()> {
        Ok(())
    }
}

struct Entry {
    plugin: Arc<dyn Plugin>,
    status: RuntimeStatus,
    scope: Arc<ScopedHooks>,
    routes: Vec<RouteSpec>,
}

#[derive(Default)]
struct ManagerState {
    plugins: BTreeMap<String, Entry>,
    configs: BTreeMap<String, PluginConfig>,
}

struct ManagerInner {
    hooks: HookSystem,
    initialized: AtomicBool,
    state: RwLock<ManagerState>,
}

/// Registry and lifecycle driver for in-process plugins.
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.inner.state.read().plugins.len())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl PluginManager {
    pub fn new(hooks: HookSystem) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                hooks,
                initialized: AtomicBool::new(false),
                state: RwLock::new(ManagerState::default()),
            }),
        }
    }

    pub fn hooks(&self) -> &HookSystem {
        &self.inner.hooks
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Mark the runtime ready and run the `app:init` hook.
    pub async fn initialize(&self) -> Result<()> {
        info!("initializing plugin system");
        self.inner.initialized.store(true, Ordering::Release);
        self.inner
            .hooks
            .execute("app:init", json!({}), &mut HookContext::new())
            .await?;
        Ok(())
    }

    /// Add a plugin to the registry without running any callback.
    ///
    /// Every dependency must already be registered. Registering a name again
    /// replaces the previous plugin and resets its status.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        let version = plugin.version().to_string();

        let problems = identity_problems(&name, &version);
        if !problems.is_empty() {
            return Err(PluginError::Invalid {
                plugin: name,
                details: problems.join("; "),
            }
            .into());
        }

        let mut state = self.inner.state.write();

        for dependency in plugin.dependencies() {
            if !state.plugins.contains_key(&dependency) {
                return Err(PluginError::MissingDependency {
                    plugin: name,
                    dependency,
                }
                .into());
            }
        }

        let scope = match state.plugins.remove(&name) {
            Some(existing) => {
                if existing.status.version != version {
                    warn!(
                        plugin = %name,
                        from = %existing.status.version,
                        to = %version,
                        "replacing registered plugin"
                    );
                }
                existing.scope
            }
            None => Arc::new(self.inner.hooks.scope(&name)),
        };

        state.plugins.insert(
            name.clone(),
            Entry {
                plugin,
                status: RuntimeStatus::registered(&name, &version),
                scope,
                routes: Vec::new(),
            },
        );

        debug!(plugin = %name, version = %version, "plugin registered");
        Ok(())
    }

    /// Remove a plugin from the registry.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut state = self.inner.state.write();

        if !state.plugins.contains_key(name) {
            return Err(PluginError::not_registered(name).into());
        }

        let dependents = direct_dependents(&state.plugins, name);
        if !dependents.is_empty() {
            return Err(PluginError::RequiredBy {
                plugin: name.to_string(),
                dependents: dependents.join(", "),
            }
            .into());
        }

        state.plugins.remove(name);
        state.configs.remove(name);
        debug!(plugin = %name, "plugin unregistered");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.inner
            .state
            .read()
            .plugins
            .get(name)
            .map(|e| Arc::clone(&e.plugin))
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.state.read().plugins.contains_key(name)
    }

    /// Registered plugin names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.inner.state.read().plugins.keys().cloned().collect()
    }

    /// Names of active plugins, sorted.
    pub fn active(&self) -> Vec<String> {
        self.inner
            .state
            .read()
            .plugins
            .values()
            .filter(|e| e.status.active)
            .map(|e| e.status.name.clone())
            .collect()
    }

    /// Register, configure and install a plugin, then run `plugin:install`.
    ///
    /// The configuration defaults to enabled; its install time is set when
    /// missing.
    pub async fn install(&self, plugin: Arc<dyn Plugin>, config: Option<PluginConfig>) -> Result<()> {
        if !self.is_initialized() {
            return Err(PluginError::NotInitialized.into());
        }

        let name = plugin.name().to_string();
        info!(plugin = %name, "installing plugin");

        self.register(Arc::clone(&plugin))?;

        let mut config = config.unwrap_or_else(PluginConfig::enabled);
        config.installed_at.get_or_insert_with(now_millis);
        self.set_config(&name, config);

        let (_, scope, config) = self.lifecycle_parts(&name)?;
        plugin.register_hooks(&scope);
        let routes = plugin.routes();
        for route in &routes {
            debug!(plugin = %name, method = %route.method, path = %route.path, "plugin route registered");
        }
        if let Some(entry) = self.inner.state.write().plugins.get_mut(&name) {
            entry.routes = routes;
        }

        let ctx = PluginContext {
            config: &config,
            hooks: &scope,
        };
        if let Err(e) = plugin.install(&ctx).await {
            let err = PluginError::lifecycle(&name, "install", &e);
            error!(plugin = %name, error = %err, "plugin install failed");
            self.record_error(&name, err.to_string());
            return Err(err.into());
        }

        self.inner
            .hooks
            .execute(
                "plugin:install",
                json!({ "plugin": name, "version": plugin.version() }),
                &mut HookContext::new(),
            )
            .await?;

        info!(plugin = %name, "plugin installed");
        Ok(())
    }

    /// Deactivate, run the uninstall callback, drop the plugin's hooks and
    /// routes, run `plugin:uninstall` and unregister.
    pub async fn uninstall(&self, name: &str) -> Result<()> {
        if !self.is_initialized() {
            return Err(PluginError::NotInitialized.into());
        }

        let (plugin, scope, config) = self.lifecycle_parts(name)?;
        {
            let state = self.inner.state.read();
            let dependents = direct_dependents(&state.plugins, name);
            if !dependents.is_empty() {
                return Err(PluginError::RequiredBy {
                    plugin: name.to_string(),
                    dependents: dependents.join(", "),
                }
                .into());
            }
        }

        info!(plugin = %name, "uninstalling plugin");

        if self.status(name).active {
            self.deactivate(name).await?;
        }

        let ctx = PluginContext {
            config: &config,
            hooks: &scope,
        };
        if let Err(e) = plugin.uninstall(&ctx).await {
            let err = PluginError::lifecycle(name, "uninstall", &e);
            self.record_error(name, err.to_string());
            return Err(err.into());
        }

        scope.unregister_all();

        self.inner
            .hooks
            .execute(
                "plugin:uninstall",
                json!({ "plugin": name }),
                &mut HookContext::new(),
            )
            .await?;

        self.unregister(name)?;
        info!(plugin = %name, "plugin uninstalled");
        Ok(())
    }

    /// Activate a plugin after its dependencies, in load order.
    ///
    /// Already-active plugins are left alone.
    pub async fn activate(&self, name: &str) -> Result<()> {
        let (graph, active) = {
            let state = self.inner.state.read();
            let entry = state
                .plugins
                .get(name)
                .ok_or_else(|| PluginError::not_registered(name))?;
            if entry.status.active {
                warn!(plugin = %name, "plugin is already active");
                return Ok(());
            }
            (dependency_graph(&state.plugins), active_names(&state.plugins))
        };

        let needed = closure(name, |n| graph.get(n).cloned().unwrap_or_default());
        let steps: Vec<String> = resolve_load_order(&graph)?
            .into_iter()
            .filter(|n| needed.contains(n) && !active.contains(n))
            .collect();

        for step in steps {
            if let Err(e) = self.activate_one(&step).await {
                if step != name {
                    self.record_error(name, format!("{e:#}"));
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Deactivate a plugin after every active plugin that depends on it.
    pub async fn deactivate(&self, name: &str) -> Result<()> {
        let (graph, active) = {
            let state = self.inner.state.read();
            let entry = state
                .plugins
                .get(name)
                .ok_or_else(|| PluginError::not_registered(name))?;
            if !entry.status.active {
                warn!(plugin = %name, "plugin is not active");
                return Ok(());
            }
            (dependency_graph(&state.plugins), active_names(&state.plugins))
        };

        let affected = closure(name, |n| {
            graph
                .iter()
                .filter(|(_, deps)| deps.iter().any(|d| d == n))
                .map(|(dependent, _)| dependent.clone())
                .collect()
        });
        let mut steps: Vec<String> = resolve_load_order(&graph)?
            .into_iter()
            .filter(|n| affected.contains(n) && active.contains(n))
            .collect();
        steps.reverse();

        for step in steps {
            self.deactivate_one(&step).await?;
        }
        Ok(())
    }

    async fn activate_one(&self, name: &str) -> Result<()> {
        let (plugin, scope, config) = self.lifecycle_parts(name)?;
        let ctx = PluginContext {
            config: &config,
            hooks: &scope,
        };

        if let Err(e) = plugin.activate(&ctx).await {
            let err = PluginError::lifecycle(name, "activate", &e);
            error!(plugin = %name, error = %err, "plugin activation failed");
            self.update_status(name, |s| {
                s.active = false;
                s.record_error(err.to_string());
            });
            return Err(err.into());
        }

        self.update_status(name, |s| {
            s.active = true;
            s.has_errors = false;
            s.errors.clear();
        });
        info!(plugin = %name, "plugin activated");
        Ok(())
    }

    async fn deactivate_one(&self, name: &str) -> Result<()> {
        let (plugin, scope, config) = self.lifecycle_parts(name)?;
        let ctx = PluginContext {
            config: &config,
            hooks: &scope,
        };

        if let Err(e) = plugin.deactivate(&ctx).await {
            let err = PluginError::lifecycle(name, "deactivate", &e);
            error!(plugin = %name, error = %err, "plugin deactivation failed");
            self.record_error(name, err.to_string());
            return Err(err.into());
        }

        self.update_status(name, |s| {
            s.active = false;
            s.has_errors = false;
            s.errors.clear();
        });
        info!(plugin = %name, "plugin deactivated");
        Ok(())
    }

    /// Store configurations and activate the enabled, registered plugins in
    /// load order. Returns the names activated; failures are logged.
    pub async fn load_plugins(&self, configs: Vec<NamedPluginConfig>) -> Vec<String> {
        let enabled: Vec<NamedPluginConfig> = configs.into_iter().filter(|c| c.config.enabled).collect();
        info!(count = enabled.len(), "loading plugins");

        for named in enabled {
            self.set_config(&named.name, named.config);
        }

        let order = match self.resolve_load_order() {
            Ok(order) => order,
            Err(e) => {
                error!(error = %format!("{e:#}"), "failed to resolve plugin load order");
                return Vec::new();
            }
        };
        debug!(order = %order.join(" -> "), "plugin load order");

        let mut activated = Vec::new();
        for name in order {
            if !self.config(&name).is_some_and(|c| c.enabled) || self.status(&name).active {
                continue;
            }
            match self.activate(&name).await {
                Ok(()) => activated.push(name),
                Err(e) => error!(plugin = %name, error = %format!("{e:#}"), "failed to load plugin"),
            }
        }
        activated
    }

    /// Registered plugins ordered so dependencies come first.
    pub fn resolve_load_order(&self) -> Result<Vec<String>> {
        let graph = dependency_graph(&self.inner.state.read().plugins);
        resolve_load_order(&graph)
    }

    /// Status of a plugin; unregistered names report `installed: false`.
    pub fn status(&self, name: &str) -> RuntimeStatus {
        self.inner
            .state
            .read()
            .plugins
            .get(name)
            .map(|e| e.status.clone())
            .unwrap_or_else(|| RuntimeStatus::unknown(name))
    }

    pub fn all_statuses(&self) -> Vec<RuntimeStatus> {
        self.inner
            .state
            .read()
            .plugins
            .values()
            .map(|e| e.status.clone())
            .collect()
    }

    pub fn config(&self, name: &str) -> Option<PluginConfig> {
        self.inner.state.read().configs.get(name).cloned()
    }

    /// Store a plugin's configuration, stamping `updated_at`.
    pub fn set_config(&self, name: &str, mut config: PluginConfig) {
        config.updated_at = Some(now_millis());
        self.inner
            .state
            .write()
            .configs
            .insert(name.to_string(), config);
    }

    pub fn export_config(&self) -> PluginConfigExport {
        let plugins = self
            .inner
            .state
            .read()
            .configs
            .iter()
            .map(|(name, config)| NamedPluginConfig {
                name: name.clone(),
                config: config.clone(),
            })
            .collect();
        PluginConfigExport { plugins }
    }

    pub fn import_config(&self, export: PluginConfigExport) {
        for named in export.plugins {
            self.set_config(&named.name, named.config);
        }
    }

    /// Routes of installed plugins, by plugin name.
    pub fn plugin_routes(&self) -> BTreeMap<String, Vec<RouteSpec>> {
        self.inner
            .state
            .read()
            .plugins
            .iter()
            .filter(|(_, e)| !e.routes.is_empty())
            .map(|(name, e)| (name.clone(), e.routes.clone()))
            .collect()
    }

    /// Middleware of active plugins by ascending priority, named
    /// `plugin:middleware`.
    pub fn plugin_middleware(&self) -> Vec<MiddlewareSpec> {
        let mut middleware: Vec<MiddlewareSpec> = self
            .inner
            .state
            .read()
            .plugins
            .values()
            .filter(|e| e.status.active)
            .flat_map(|e| {
                e.plugin.middleware().into_iter().map(move |mw| MiddlewareSpec {
                    name: format!("{}:{}", e.status.name, mw.name),
                    ..mw
                })
            })
            .collect();
        middleware.sort_by_key(|mw| mw.priority);
        middleware
    }

    /// Run `app:shutdown`, then deactivate every active plugin, dependents
    /// first. Failures are logged.
    pub async fn shutdown(&self) {
        info!("shutting down plugin system");

        if let Err(e) = self
            .inner
            .hooks
            .execute("app:shutdown", json!({}), &mut HookContext::new())
            .await
        {
            error!(error = %e, "app:shutdown hook failed");
        }

        let mut order = self.resolve_load_order().unwrap_or_else(|_| self.list());
        order.reverse();

        for name in order {
            if !self.status(&name).active {
                continue;
            }
            if let Err(e) = self.deactivate_one(&name).await {
                error!(plugin = %name, error = %format!("{e:#}"), "error deactivating plugin");
            }
        }

        info!("plugin system shutdown complete");
    }

    /// Drop every plugin and its hooks.
    pub fn clear(&self) {
        let mut state = self.inner.state.write();
        for entry in state.plugins.values() {
            entry.scope.unregister_all();
        }
        state.plugins.clear();
        state.configs.clear();
    }

    pub fn stats(&self) -> ManagerStats {
        let registry = {
            let state = self.inner.state.read();
            let total = state.plugins.len();
            let active = state.plugins.values().filter(|e| e.status.active).count();
            RegistryStats {
                total,
                active,
                inactive: total - active,
                with_errors: state.plugins.values().filter(|e| e.status.has_errors).count(),
            }
        };

        ManagerStats {
            registry,
            hooks: self.inner.hooks.stats(),
            routes: self.plugin_routes().len(),
            middleware: self.plugin_middleware().len(),
        }
    }

    fn lifecycle_parts(&self, name: &str) -> Result<(Arc<dyn Plugin>, Arc<ScopedHooks>, PluginConfig)> {
        let state = self.inner.state.read();
        let entry = state
            .plugins
            .get(name)
            .ok_or_else(|| PluginError::not_registered(name))?;
        let config = state.configs.get(name).cloned().unwrap_or_default();
        Ok((Arc::clone(&entry.plugin), Arc::clone(&entry.scope), config))
    }

    fn update_status(&self, name: &str, update: impl FnOnce(&mut RuntimeStatus)) {
        if let Some(entry) = self.inner.state.write().plugins.get_mut(name) {
            update(&mut entry.status);
        }
    }

    fn record_error(&self, name: &str, message: String) {
        self.update_status(name, |s| s.record_error(message));
    }
}

fn dependency_graph(plugins: &BTreeMap<String, Entry>) -> HashMap<String, Vec<String>> {
    plugins
        .iter()
        .map(|(name, e)| (name.clone(), e.plugin.dependencies()))
        .collect()
}

fn active_names(plugins: &BTreeMap<String, Entry>) -> BTreeSet<String> {
    plugins
        .iter()
        .filter(|(_, e)| e.status.active)
        .map(|(name, _)| name.clone())
        .collect()
}

fn direct_dependents(plugins: &BTreeMap<String, Entry>, name: &str) -> Vec<String> {
    plugins
        .iter()
        .filter(|(_, e)| e.plugin.dependencies().iter().any(|d| d == name))
        .map(|(dependent, _)| dependent.clone())
        .collect()
}

/// `root` plus everything reachable through `next`.
fn closure(root: &str, next: impl Fn(&str) -> Vec<String>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![root.to_string()];
    while let Some(name) = stack.pop() {
        if seen.insert(name.clone()) {
            stack.extend(next(&name));
        }
    }
    seen
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn closure_follows_edges_once() {
        let graph: HashMap<&str, Vec<String>> = [
            ("a", vec!["b".to_string(), "c".to_string()]),
            ("b", vec!["c".to_string()]),
            ("c", vec![]),
            ("d", vec![]),
        ]
        .into_iter()
        .collect();

        let reached = closure("a", |n| graph.get(n).cloned().unwrap_or_default());
        assert_eq!(reached.into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn config_serializes_camel_case_and_skips_empty_fields() {
        let config = PluginConfig {
            installed_at: Some(5),
            ..PluginConfig::enabled()
        };
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            json!({ "enabled": true, "installedAt": 5 })
        );

        let named: NamedPluginConfig =
            serde_json::from_value(json!({ "name": "seo", "enabled": false, "settings": { "a": 1 } }))
                .unwrap();
        assert_eq!(named.name, "seo");
        assert!(!named.config.enabled);
        assert_eq!(named.config.settings["a"], 1);
    }

    #[test]
    fn unknown_status_is_not_installed() {
        let status = RuntimeStatus::unknown("ghost");
        assert_eq!(status.version, "unknown");
        assert!(!status.installed && !status.active && !status.has_errors);
    }
}
