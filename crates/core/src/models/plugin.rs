//! Plugin registry rows.

use serde::Serialize;
use sqlx::FromRow;

/// A row of the `plugins` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PluginRecord {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub version: String,
    pub author: String,
    pub category: String,
    pub icon: Option<String>,
    pub status: String,
    pub is_core: bool,
    /// JSON object.
    pub settings: Option<String>,
    /// JSON array of permission names.
    pub permissions: Option<String>,
    /// JSON array of plugin names.
    pub dependencies: Option<String>,
    pub download_count: i64,
    pub rating: f64,
    pub installed_at: i64,
    pub activated_at: Option<i64>,
    pub last_updated: i64,
    pub error_message: Option<String>,
}

impl PluginRecord {
    /// Names of the plugins this one depends on.
    pub fn dependency_names(&self) -> Vec<String> {
        parse_json_or_default(self.dependencies.as_deref())
    }

    /// Permission names declared by the plugin.
    pub fn permission_names(&self) -> Vec<String> {
        parse_json_or_default(self.permissions.as_deref())
    }

    /// Settings object, empty when unset or unparseable.
    pub fn settings_value(&self) -> serde_json::Value {
        self.settings
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(|| serde_json::json!({}))
    }

    pub fn is_active(&self) -> bool {
        self.status == crate::plugin::status::STATUS_ACTIVE
    }
}

fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(raw: Option<&str>) -> T {
    raw.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// A row of the `plugin_hooks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PluginHook {
    pub id: String,
    pub plugin_id: String,
    pub hook_name: String,
    pub handler_name: String,
    pub priority: i64,
    pub is_active: bool,
    pub created_at: i64,
}

/// A row of the `plugin_routes` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PluginRoute {
    pub id: String,
    pub plugin_id: String,
    pub path: String,
    pub method: String,
    pub handler_name: String,
    /// JSON array of middleware names.
    pub middleware: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
}

/// A row of the `plugin_assets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PluginAsset {
    pub id: String,
    pub plugin_id: String,
    pub asset_type: String,
    pub asset_path: String,
    pub load_order: i64,
    pub load_location: String,
    pub is_active: bool,
    pub created_at: i64,
}

/// A row of the `plugin_activity_log` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PluginActivity {
    pub id: String,
    pub plugin_id: String,
    pub action: String,
    pub user_id: Option<String>,
    /// JSON details.
    pub details: Option<String>,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dependencies: Option<&str>) -> PluginRecord {
        PluginRecord {
            id: "p".to_string(),
            name: "p".to_string(),
            display_name: "P".to_string(),
            description: None,
            version: "1.0.0".to_string(),
            author: "a".to_string(),
            category: "utilities".to_string(),
            icon: None,
            status: "inactive".to_string(),
            is_core: false,
            settings: None,
            permissions: None,
            dependencies: dependencies.map(String::from),
            download_count: 0,
            rating: 0.0,
            installed_at: 0,
            activated_at: None,
            last_updated: 0,
            error_message: None,
        }
    }

    #[test]
    fn dependency_names_tolerate_bad_json() {
        assert_eq!(record(Some(r#"["a","b"]"#)).dependency_names(), vec!["a", "b"]);
        assert!(record(Some("not json")).dependency_names().is_empty());
        assert!(record(None).dependency_names().is_empty());
        assert_eq!(record(None).settings_value(), serde_json::json!({}));
    }
}
