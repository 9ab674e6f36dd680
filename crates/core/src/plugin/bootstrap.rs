//! Installs the plugins that ship with the system.
//!
//! Core descriptors are installed on first run, upgraded when their version
//! changes, and `core-*` plugins are activated. Plugins whose tables are
//! missing are skipped until the migrations that create them have run.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use super::dependency::resolve_load_order;
use super::service::{NewPlugin, PluginService};
use crate::db::{now_secs, tables_exist};

const CORE_PREFIX: &str = "core-";
const AUTHOR: &str = "Headwind Team";

/// A plugin shipped with the system.
#[derive(Debug, Clone, Serialize)]
pub struct PluginDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub author: &'static str,
    pub category: &'static str,
    pub icon: &'static str,
    pub permissions: Vec<&'static str>,
    pub dependencies: Vec<&'static str>,
    pub settings: Value,
    /// Tables that must exist before the plugin can be installed.
    pub required_tables: Vec<&'static str>,
}

impl PluginDescriptor {
    pub fn is_core(&self) -> bool {
        self.name.starts_with(CORE_PREFIX)
    }

    fn to_new_plugin(&self) -> NewPlugin {
        NewPlugin {
            id: Some(self.id.to_string()),
            name: self.name.to_string(),
            display_name: Some(self.display_name.to_string()),
            description: Some(self.description.to_string()),
            version: Some(self.version.to_string()),
            author: Some(self.author.to_string()),
            category: Some(self.category.to_string()),
            icon: Some(self.icon.to_string()),
            permissions: self.permissions.iter().map(|p| p.to_string()).collect(),
            dependencies: self.dependencies.iter().map(|d| d.to_string()).collect(),
            settings: Some(self.settings.clone()),
            is_core: self.is_core(),
        }
    }
}

/// Plugins that are always available.
pub fn core_plugins() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor {
            id: "core-auth",
            name: "core-auth",
            display_name: "Authentication System",
            description: "Core authentication and user management system",
            version: "1.0.0",
            author: AUTHOR,
            category: "security",
            icon: "🔐",
            permissions: vec!["manage:users", "manage:roles", "manage:permissions"],
            dependencies: vec![],
            settings: json!({
                "requiredFields": {
                    "email": { "required": true, "minLength": 5, "label": "Email", "type": "email" },
                    "password": { "required": true, "minLength": 8, "label": "Password", "type": "password" },
                    "username": { "required": true, "minLength": 3, "label": "Username", "type": "text" },
                    "firstName": { "required": true, "minLength": 1, "label": "First Name", "type": "text" },
                    "lastName": { "required": true, "minLength": 1, "label": "Last Name", "type": "text" }
                },
                "validation": {
                    "emailFormat": true,
                    "allowDuplicateUsernames": false,
                    "passwordRequirements": {
                        "requireUppercase": false,
                        "requireLowercase": false,
                        "requireNumbers": false,
                        "requireSpecialChars": false
                    }
                },
                "registration": {
                    "enabled": true,
                    "requireEmailVerification": false,
                    "defaultRole": "viewer"
                }
            }),
            required_tables: vec!["users"],
        },
        PluginDescriptor {
            id: "core-media",
            name: "core-media",
            display_name: "Media Manager",
            description: "Core media upload and management system",
            version: "1.0.0",
            author: AUTHOR,
            category: "media",
            icon: "📸",
            permissions: vec!["manage:media", "upload:files"],
            dependencies: vec![],
            settings: json!({}),
            required_tables: vec!["media"],
        },
        PluginDescriptor {
            id: "database-tools",
            name: "database-tools",
            display_name: "Database Tools",
            description: "Database management tools including truncate, backup, and validation",
            version: "1.0.0",
            author: AUTHOR,
            category: "system",
            icon: "🗄️",
            permissions: vec!["manage:database", "admin"],
            dependencies: vec![],
            settings: json!({
                "enableTruncate": true,
                "enableBackup": true,
                "enableValidation": true,
                "requireConfirmation": true
            }),
            required_tables: vec![],
        },
        PluginDescriptor {
            id: "seed-data",
            name: "seed-data",
            display_name: "Seed Data",
            description: "Generate realistic example users and content for testing and development",
            version: "1.0.0",
            author: AUTHOR,
            category: "development",
            icon: "🌱",
            permissions: vec!["admin"],
            dependencies: vec![],
            settings: json!({ "userCount": 20, "contentCount": 200 }),
            required_tables: vec!["users", "content"],
        },
        PluginDescriptor {
            id: "core-cache",
            name: "core-cache",
            display_name: "Cache System",
            description: "Two-tier caching with an in-process cache and optional Redis",
            version: "1.0.0",
            author: AUTHOR,
            category: "performance",
            icon: "⚡",
            permissions: vec!["manage:cache", "view:stats"],
            dependencies: vec![],
            settings: json!({
                "enableMemoryCache": true,
                "enableRedisCache": true,
                "defaultTTL": 3600
            }),
            required_tables: vec![],
        },
        PluginDescriptor {
            id: "workflow-plugin",
            name: "workflow-plugin",
            display_name: "Workflow Management",
            description: "Content workflow management with approval chains, scheduling, and automation",
            version: "1.0.0-beta.1",
            author: AUTHOR,
            category: "content",
            icon: "🔄",
            permissions: vec!["manage:workflows", "view:workflows", "transition:content"],
            dependencies: vec!["content-plugin"],
            settings: json!({
                "enableApprovalChains": true,
                "enableScheduling": true,
                "enableAutomation": true,
                "enableNotifications": true
            }),
            required_tables: vec!["workflow_history"],
        },
    ]
}

/// Optional example plugins, installed inactive.
pub fn demo_plugins() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor {
            id: "third-party-faq",
            name: "faq-plugin",
            display_name: "FAQ System",
            description: "Frequently Asked Questions management system with categories and search",
            version: "2.0.0",
            author: "Community Developer",
            category: "content",
            icon: "❓",
            permissions: vec!["manage:faqs"],
            dependencies: vec![],
            settings: json!({
                "enableSearch": true,
                "enableCategories": true,
                "questionsPerPage": 10
            }),
            required_tables: vec![],
        },
        PluginDescriptor {
            id: "demo-login-prefill",
            name: "demo-login-plugin",
            display_name: "Demo Login Prefill",
            description: "Prefills the login form with demo credentials",
            version: "1.0.0",
            author: AUTHOR,
            category: "demo",
            icon: "🎯",
            permissions: vec![],
            dependencies: vec![],
            settings: json!({ "enableNotice": true }),
            required_tables: vec![],
        },
    ]
}

/// What [`PluginBootstrapService::bootstrap_core_plugins`] did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
    pub installed: Vec<String>,
    pub updated: Vec<String>,
    pub activated: Vec<String>,
    /// Plugins whose required tables are missing.
    pub skipped: Vec<String>,
    /// Plugins that failed, with the error message.
    pub failed: Vec<(String, String)>,
}

/// Changes made by [`PluginBootstrapService::ensure_plugin_installed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnsureOutcome {
    pub installed: bool,
    pub updated: bool,
    pub activated: bool,
}

/// Installs and upgrades the built-in plugins.
#[derive(Clone)]
pub struct PluginBootstrapService {
    pool: SqlitePool,
    plugins: PluginService,
}

impl std::fmt::Debug for PluginBootstrapService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginBootstrapService").finish_non_exhaustive()
    }
}

impl PluginBootstrapService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            plugins: PluginService::new(pool.clone()),
            pool,
        }
    }

    /// Install or upgrade every core plugin in dependency order.
    ///
    /// A failure on one plugin is recorded in the report and does not stop
    /// the others.
    pub async fn bootstrap_core_plugins(&self) -> Result<BootstrapReport> {
        info!("starting core plugin bootstrap");

        let descriptors = core_plugins();
        let mut report = BootstrapReport::default();

        for descriptor in order_descriptors(&descriptors)? {
            if !tables_exist(&self.pool, &descriptor.required_tables).await? {
                debug!(
                    plugin = descriptor.name,
                    tables = ?descriptor.required_tables,
                    "skipping plugin until its tables exist"
                );
                report.skipped.push(descriptor.name.to_string());
                continue;
            }

            match self.ensure_plugin_installed(descriptor).await {
                Ok(outcome) => {
                    let name = descriptor.name.to_string();
                    if outcome.installed {
                        report.installed.push(name.clone());
                    }
                    if outcome.updated {
                        report.updated.push(name.clone());
                    }
                    if outcome.activated {
                        report.activated.push(name);
                    }
                }
                Err(e) => {
                    error!(plugin = descriptor.name, error = %format!("{e:#}"), "failed to ensure plugin");
                    report.failed.push((descriptor.name.to_string(), format!("{e:#}")));
                }
            }
        }

        info!(
            installed = report.installed.len(),
            updated = report.updated.len(),
            activated = report.activated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "core plugin bootstrap complete"
        );

        Ok(report)
    }

    /// Install, upgrade or activate one plugin as needed.
    pub async fn ensure_plugin_installed(
        &self,
        descriptor: &PluginDescriptor,
    ) -> Result<EnsureOutcome> {
        let mut outcome = EnsureOutcome::default();

        match self.plugins.get_plugin(descriptor.id).await? {
            Some(existing) => {
                if existing.version != descriptor.version {
                    info!(
                        plugin = descriptor.name,
                        from = %existing.version,
                        to = descriptor.version,
                        "updating plugin version"
                    );
                    self.update_plugin(descriptor).await?;
                    outcome.updated = true;
                }

                if descriptor.id == "core-auth" && !existing.is_active() {
                    info!(plugin = descriptor.name, "activating inactive auth plugin");
                    self.plugins.activate_plugin(descriptor.id).await?;
                    outcome.activated = true;
                }
            }
            None => {
                self.plugins.install_plugin(descriptor.to_new_plugin()).await?;
                outcome.installed = true;

                if descriptor.is_core() {
                    self.plugins.activate_plugin(descriptor.id).await?;
                    outcome.activated = true;
                }
            }
        }

        Ok(outcome)
    }

    async fn update_plugin(&self, descriptor: &PluginDescriptor) -> Result<()> {
        sqlx::query(
            "UPDATE plugins SET version = ?, description = ?, permissions = ?, settings = ?, \
             last_updated = ? WHERE id = ?",
        )
        .bind(descriptor.version)
        .bind(descriptor.description)
        .bind(serde_json::to_string(&descriptor.permissions)?)
        .bind(serde_json::to_string(&descriptor.settings)?)
        .bind(now_secs())
        .bind(descriptor.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Whether any `core-*` plugin is missing. Errors count as missing.
    pub async fn is_bootstrap_needed(&self) -> bool {
        for descriptor in core_plugins().iter().filter(|d| d.is_core()) {
            match self.plugins.get_plugin(descriptor.id).await {
                Ok(Some(_)) => {}
                Ok(None) => return true,
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "failed to check bootstrap status");
                    return true;
                }
            }
        }
        false
    }

    /// Install the demo plugins that are not installed yet. Returns their names.
    pub async fn install_demo_plugins(&self) -> Result<Vec<String>> {
        let mut installed = Vec::new();

        for descriptor in demo_plugins() {
            if self.plugins.get_plugin(descriptor.id).await?.is_some() {
                continue;
            }

            let mut plugin = descriptor.to_new_plugin();
            plugin.is_core = false;

            match self.plugins.install_plugin(plugin).await {
                Ok(_) => installed.push(descriptor.name.to_string()),
                Err(e) => {
                    error!(plugin = descriptor.name, error = %format!("{e:#}"), "failed to install demo plugin");
                }
            }
        }

        Ok(installed)
    }
}

/// Order descriptors so in-set dependencies come first.
fn order_descriptors(descriptors: &[PluginDescriptor]) -> Result<Vec<&PluginDescriptor>> {
    let by_name: HashMap<&str, &PluginDescriptor> =
        descriptors.iter().map(|d| (d.name, d)).collect();

    let graph: HashMap<String, Vec<String>> = descriptors
        .iter()
        .map(|d| {
            let deps = d
                .dependencies
                .iter()
                .filter(|dep| by_name.contains_key(*dep))
                .map(|dep| dep.to_string())
                .collect();
            (d.name.to_string(), deps)
        })
        .collect();

    Ok(resolve_load_order(&graph)?
        .iter()
        .filter_map(|name| by_name.get(name.as_str()).copied())
        .collect())
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn core_descriptors_are_consistent() {
        let plugins = core_plugins();
        assert_eq!(plugins.len(), 6);

        let core: Vec<_> = plugins.iter().filter(|p| p.is_core()).map(|p| p.name).collect();
        assert_eq!(core, vec!["core-auth", "core-media", "core-cache"]);

        let workflow = plugins.iter().find(|p| p.name == "workflow-plugin").unwrap();
        assert_eq!(workflow.version, "1.0.0-beta.1");
        assert_eq!(workflow.dependencies, vec!["content-plugin"]);
    }

    #[test]
    fn out_of_set_dependencies_do_not_block_ordering() {
        let plugins = core_plugins();
        let order: Vec<_> = order_descriptors(&plugins)
            .unwrap()
            .iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(order.len(), plugins.len());
        assert!(order.contains(&"workflow-plugin"));
    }

    #[test]
    fn in_set_dependencies_come_first() {
        let mut plugins = core_plugins();
        plugins[0].dependencies = vec!["seed-data"];
        let order: Vec<_> = order_descriptors(&plugins)
            .unwrap()
            .iter()
            .map(|d| d.name)
            .collect();
        let seed = order.iter().position(|n| *n == "seed-data").unwrap();
        let auth = order.iter().position(|n| *n == "core-auth").unwrap();
        assert!(seed < auth);
    }
}
