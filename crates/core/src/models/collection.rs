//! Collection rows as stored in the `collections` table.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

/// A row of the `collections` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CollectionRow {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    /// Schema as JSON text.
    pub schema: String,
    pub is_active: bool,
    pub managed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CollectionRow {
    /// Find a collection by machine name.
    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, CollectionRow>("SELECT * FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("failed to load collection '{name}'"))
    }

    /// All collections ordered by name.
    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, CollectionRow>("SELECT * FROM collections ORDER BY name")
            .fetch_all(pool)
            .await
            .context("failed to list collections")
    }

    /// Collections owned by config files.
    pub async fn list_managed(pool: &SqlitePool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, CollectionRow>(
            "SELECT * FROM collections WHERE managed = 1 ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .context("failed to list managed collections")
    }

    /// Parse the stored schema.
    pub fn schema_value(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.schema)
            .with_context(|| format!("collection '{}' has an invalid schema", self.name))
    }
}
