//! Key/value settings grouped by category, stored as JSON.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::now_millis;

/// Category holding the site-wide settings.
pub const GENERAL_CATEGORY: &str = "general";

const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

/// Site-wide settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    pub site_name: String,
    pub site_description: String,
    pub admin_email: String,
    pub timezone: String,
    pub language: String,
    pub maintenance_mode: bool,
}

/// Partial update of [`GeneralSettings`]. Only set fields are saved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<bool>,
}

/// Settings storage backed by the `settings` table.
#[derive(Clone)]
pub struct SettingsService {
    pool: SqlitePool,
}

impl std::fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsService").finish_non_exhaustive()
    }
}

impl SettingsService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A single setting. Unparseable values are logged and treated as unset.
    pub async fn get_setting(&self, category: &str, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM settings WHERE category = ? AND key = ?")
            .bind(category)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load setting {category}.{key}"))?;

        Ok(row.and_then(|r| parse_value(category, key, r.get("value"))))
    }

    /// All settings of a category, keyed by setting name.
    pub async fn get_category_settings(&self, category: &str) -> Result<BTreeMap<String, Value>> {
        let rows = sqlx::query("SELECT key, value FROM settings WHERE category = ?")
            .bind(category)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to load settings of '{category}'"))?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let key: String = r.get("key");
                let value = parse_value(category, &key, r.get("value"))?;
                Some((key, value))
            })
            .collect())
    }

    /// Insert or replace a setting.
    pub async fn set_setting(&self, category: &str, key: &str, value: &Value) -> Result<()> {
        let now = now_millis();

        sqlx::query(UPSERT)
            .bind(Uuid::new_v4().to_string())
            .bind(category)
            .bind(key)
            .bind(serde_json::to_string(value)?)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to save setting {category}.{key}"))?;

        debug!(category = %category, key = %key, "setting saved");
        Ok(())
    }

    /// Insert or replace several settings in one transaction.
    pub async fn set_multiple_settings(
        &self,
        category: &str,
        settings: &BTreeMap<String, Value>,
    ) -> Result<()> {
        let now = now_millis();
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        for (key, value) in settings {
            sqlx::query(UPSERT)
                .bind(Uuid::new_v4().to_string())
                .bind(category)
                .bind(key)
                .bind(serde_json::to_string(value)?)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to save setting {category}.{key}"))?;
        }

        tx.commit().await.context("failed to commit settings")?;
        debug!(category = %category, count = settings.len(), "settings saved");
        Ok(())
    }

    /// General settings with defaults for anything unset.
    ///
    /// The admin email falls back to `user_email`, then to a placeholder.
    pub async fn get_general_settings(&self, user_email: Option<&str>) -> Result<GeneralSettings> {
        let stored = self.get_category_settings(GENERAL_CATEGORY).await?;

        let text = |key: &str| stored.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(GeneralSettings {
            site_name: text("siteName").unwrap_or_else(|| "Headwind CMS".to_string()),
            site_description: text("siteDescription")
                .unwrap_or_else(|| "A modern headless CMS".to_string()),
            admin_email: text("adminEmail")
                .or_else(|| user_email.map(str::to_string))
                .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string()),
            timezone: text("timezone").unwrap_or_else(|| "UTC".to_string()),
            language: text("language").unwrap_or_else(|| "en".to_string()),
            maintenance_mode: stored
                .get("maintenanceMode")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Save the fields present in `update`.
    pub async fn save_general_settings(&self, update: &GeneralSettingsUpdate) -> Result<()> {
        let Value::Object(fields) = serde_json::to_value(update)? else {
            return Ok(());
        };

        if fields.is_empty() {
            return Ok(());
        }

        let settings: BTreeMap<String, Value> = fields.into_iter().collect();
        self.set_multiple_settings(GENERAL_CATEGORY, &settings).await
    }
}

const UPSERT: &str = "INSERT INTO settings (id, category, key, value, created_at, updated_at) \
                      VALUES (?, ?, ?, ?, ?, ?) \
                      ON CONFLICT(category, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

fn parse_value(category: &str, key: &str, raw: String) -> Option<Value> {
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(category = %category, key = %key, error = %e, "ignoring setting with invalid JSON");
            None
        }
    }
}
