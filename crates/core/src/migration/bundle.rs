//! Migrations shipped with the crate, embedded at compile time.

use super::{Detection, Migration};

struct Bundled {
    id: &'static str,
    name: &'static str,
    filename: &'static str,
    description: &'static str,
    sql: &'static str,
    detection: Detection,
}

const BUNDLED: &[Bundled] = &[
    Bundled {
        id: "001",
        name: "Initial Schema",
        filename: "001_initial_schema.sql",
        description: "Users, collections, content, versions, media, API tokens and workflow history",
        sql: include_str!("../../migrations/001_initial_schema.sql"),
        detection: Detection::Tables(&["users", "content", "collections", "media"]),
    },
    Bundled {
        id: "002",
        name: "Plugin System",
        filename: "002_plugin_system.sql",
        description: "Plugin registry with hooks, routes, assets and activity log",
        sql: include_str!("../../migrations/002_plugin_system.sql"),
        detection: Detection::Tables(&["plugins", "plugin_hooks"]),
    },
    Bundled {
        id: "003",
        name: "System Logging",
        filename: "003_system_logging.sql",
        description: "Persisted system logs and per-category log configuration",
        sql: include_str!("../../migrations/003_system_logging.sql"),
        detection: Detection::Tables(&["system_logs", "log_config"]),
    },
    Bundled {
        id: "004",
        name: "Config Managed Collections",
        filename: "004_config_managed_collections.sql",
        description: "Flag collections that are owned by config files",
        sql: include_str!("../../migrations/004_config_managed_collections.sql"),
        detection: Detection::Column {
            table: "collections",
            column: "managed",
        },
    },
    Bundled {
        id: "005",
        name: "Forms",
        filename: "005_forms.sql",
        description: "Forms, submissions and submission files",
        sql: include_str!("../../migrations/005_forms.sql"),
        detection: Detection::Tables(&["forms", "form_submissions"]),
    },
    Bundled {
        id: "006",
        name: "Settings",
        filename: "006_settings.sql",
        description: "Category/key settings store",
        sql: include_str!("../../migrations/006_settings.sql"),
        detection: Detection::Tables(&["settings"]),
    },
];

/// All bundled migrations, in id order.
pub fn bundled_migrations() -> Vec<Migration> {
    BUNDLED
        .iter()
        .map(|b| Migration {
            id: b.id.to_string(),
            name: b.name.to_string(),
            filename: b.filename.to_string(),
            description: b.description.to_string(),
            sql: Some(b.sql.to_string()),
            detection: b.detection,
        })
        .collect()
}

/// SQL text of a bundled migration.
pub fn migration_sql(id: &str) -> Option<&'static str> {
    BUNDLED.iter().find(|b| b.id == id).map(|b| b.sql)
}
