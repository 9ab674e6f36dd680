//! Plugin status values and active-plugin checks.
//!
//! Status lives in the `status` column of the `plugins` table.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use super::error::PluginError;

/// Status values for plugins.
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";
pub const STATUS_ERROR: &str = "error";

/// Lifecycle state of an installed plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Active,
    Inactive,
    Error,
}

impl PluginStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => STATUS_ACTIVE,
            Self::Inactive => STATUS_INACTIVE,
            Self::Error => STATUS_ERROR,
        }
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            STATUS_ACTIVE => Ok(Self::Active),
            STATUS_INACTIVE => Ok(Self::Inactive),
            STATUS_ERROR => Ok(Self::Error),
            other => bail!("unknown plugin status '{other}'"),
        }
    }
}

/// Whether the named plugin is installed and active.
pub async fn is_plugin_active(pool: &SqlitePool, name: &str) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS cnt FROM plugins WHERE name = ? AND status = ?")
        .bind(name)
        .bind(STATUS_ACTIVE)
        .fetch_one(pool)
        .await?;

    let count: i64 = row.get("cnt");
    Ok(count > 0)
}

/// Names of all active plugins.
pub async fn active_plugins(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT name FROM plugins WHERE status = ? ORDER BY name")
        .bind(STATUS_ACTIVE)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(|r| r.get("name")).collect())
}

/// Fail unless the named plugin is active.
///
/// Used to gate features that belong to a plugin.
pub async fn require_active_plugin(pool: &SqlitePool, name: &str) -> Result<()> {
    if !is_plugin_active(pool, name).await? {
        return Err(PluginError::NotActive {
            plugin: name.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Fail unless every named plugin is active.
pub async fn require_active_plugins(pool: &SqlitePool, names: &[&str]) -> Result<()> {
    for name in names {
        require_active_plugin(pool, name).await?;
    }
    Ok(())
}
