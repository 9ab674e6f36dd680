//! Parser for plugin `manifest.json` files.
//!
//! A manifest declares plugin metadata, the hooks it handles, the routes it
//! serves and its settings. External plugin loaders hand manifests to
//! [`PluginService::install_from_manifest`](super::service::PluginService::install_from_manifest).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::PluginError;

static NAME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new("^[a-z0-9-]+$").ok());

static VERSION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$").ok());

/// HTTP methods a plugin route may use.
pub const ROUTE_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Known hook names for validation.
pub const KNOWN_HOOKS: &[&str] = &[
    // Application lifecycle
    "app:init",
    "app:ready",
    "app:shutdown",
    // Request lifecycle
    "request:start",
    "request:end",
    "request:error",
    // Authentication
    "auth:login",
    "auth:logout",
    "auth:register",
    "user:login",
    "user:logout",
    // Content
    "content:create",
    "content:update",
    "content:delete",
    "content:publish",
    "content:save",
    // Media
    "media:upload",
    "media:delete",
    "media:transform",
    // Plugin lifecycle
    "plugin:install",
    "plugin:uninstall",
    "plugin:activate",
    "plugin:deactivate",
    // Admin interface
    "admin:menu:render",
    "admin:page:render",
    // Database
    "db:migrate",
    "db:seed",
];

/// Plugin metadata parsed from `manifest.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Stable id; defaults to the name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Machine name: lowercase letters, digits and dashes.
    pub name: String,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Semantic version (e.g., "1.0.0").
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Other plugins that must be active first.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Default settings object.
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,

    /// Permission name to description.
    #[serde(default)]
    pub permissions: BTreeMap<String, String>,

    /// Hook name to handler name.
    #[serde(default)]
    pub hooks: BTreeMap<String, String>,

    #[serde(default)]
    pub routes: Vec<ManifestRoute>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_menu: Option<AdminMenu>,
}

fn default_category() -> String {
    "utilities".to_string()
}

/// A route served by the plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRoute {
    pub path: String,
    pub method: String,
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Admin menu entry contributed by the plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminMenu {
    pub label: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub path: String,
    #[serde(default)]
    pub order: i64,
}

impl PluginManifest {
    /// Parse a manifest file from the given path.
    pub fn parse(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plugin manifest: {}", path.display()))?;

        Self::parse_str(&content)
    }

    /// Parse and validate a manifest from a JSON string.
    pub fn parse_str(content: &str) -> Result<Self> {
        let manifest: PluginManifest = serde_json::from_str(content).map_err(|e| {
            PluginError::InvalidManifest {
                plugin: "unknown".to_string(),
                details: e.to_string(),
            }
        })?;

        manifest.validate()?;
        Ok(manifest)
    }

    /// Plugin id, falling back to the name.
    pub fn plugin_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    /// Validate the parsed manifest, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PluginError::invalid_manifest(&self.name, &problems).into())
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = identity_problems(&self.name, &self.version);

        if self.author.trim().is_empty() {
            problems.push("author is required".to_string());
        }

        for hook in self.hooks.keys() {
            if !is_valid_hook_name(hook) {
                problems.push(format!(
                    "unknown hook '{hook}'; use a core hook or a namespaced 'plugin:event' name"
                ));
            }
        }

        for route in &self.routes {
            if !ROUTE_METHODS.contains(&route.method.to_uppercase().as_str()) {
                problems.push(format!(
                    "route '{}' uses unsupported method '{}'. Valid methods: {}",
                    route.path,
                    route.method,
                    ROUTE_METHODS.join(", ")
                ));
            }
            if !route.path.starts_with('/') {
                problems.push(format!("route path '{}' must start with '/'", route.path));
            }
        }

        problems
    }
}

/// Problems with a plugin's name and version.
pub(crate) fn identity_problems(name: &str, version: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if !matches_pattern(&NAME_PATTERN, name) {
        problems.push(format!(
            "name '{name}' must contain only lowercase letters, numbers, and dashes"
        ));
    }

    if !matches_pattern(&VERSION_PATTERN, version) {
        problems.push(format!(
            "version '{version}' is not a semantic version (MAJOR.MINOR.PATCH)"
        ));
    }

    problems
}

fn matches_pattern(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

/// Whether a hook name is a known core hook or a namespaced custom hook.
pub fn is_valid_hook_name(name: &str) -> bool {
    if KNOWN_HOOKS.contains(&name) {
        return true;
    }
    matches!(name.split_once(':'), Some((ns, event)) if !ns.is_empty() && !event.is_empty())
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "name": "faq-plugin",
        "displayName": "FAQ",
        "version": "1.2.0-beta.1",
        "description": "Frequently asked questions",
        "author": "Headwind Team",
        "category": "content",
        "dependencies": ["core-auth"],
        "settings": {"perPage": 10},
        "permissions": {"faq:manage": "Manage FAQs"},
        "hooks": {"content:save": "onSave", "faq:render": "onRender"},
        "routes": [{"path": "/faq", "method": "get", "handler": "list"}],
        "adminMenu": {"label": "FAQ", "path": "/admin/faq", "order": 50}
    }"#;

    #[test]
    fn parses_valid_manifest() {
        let manifest = PluginManifest::parse_str(VALID).unwrap();
        assert_eq!(manifest.name, "faq-plugin");
        assert_eq!(manifest.plugin_id(), "faq-plugin");
        assert_eq!(manifest.display_name.as_deref(), Some("FAQ"));
        assert_eq!(manifest.hooks.len(), 2);
        assert_eq!(manifest.routes[0].handler, "list");
        assert_eq!(manifest.admin_menu.as_ref().unwrap().order, 50);
        assert_eq!(manifest.settings["perPage"], 10);
    }

    #[test]
    fn reports_every_problem() {
        let json = r#"{
            "name": "Bad Name",
            "version": "1.0",
            "author": "",
            "hooks": {"nonsense": "h"},
            "routes": [{"path": "faq", "method": "TRACE", "handler": "x"}]
        }"#;
        let err = PluginManifest::parse_str(json).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("lowercase letters"));
        assert!(msg.contains("semantic version"));
        assert!(msg.contains("author is required"));
        assert!(msg.contains("unknown hook 'nonsense'"));
        assert!(msg.contains("unsupported method 'TRACE'"));
        assert!(msg.contains("must start with '/'"));
    }

    #[test]
    fn malformed_json_is_invalid_manifest() {
        let err = PluginManifest::parse_str("{not json").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PluginError>(),
            Some(PluginError::InvalidManifest { .. })
        ));
    }

    #[test]
    fn hook_names() {
        assert!(is_valid_hook_name("app:init"));
        assert!(is_valid_hook_name("admin:menu:render"));
        assert!(is_valid_hook_name("seo:sitemap"));
        assert!(!is_valid_hook_name("sitemap"));
        assert!(!is_valid_hook_name(":x"));
        assert!(!is_valid_hook_name("x:"));
    }
}
