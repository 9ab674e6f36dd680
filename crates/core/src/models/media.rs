//! Media library records.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::db::now_millis;

/// A row of the `media` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Media {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub folder: String,
    /// Key of the object in the storage backend.
    pub storage_key: String,
    pub public_url: String,
    pub thumbnail_url: Option<String>,
    pub alt: Option<String>,
    pub caption: Option<String>,
    pub tags: Option<String>,
    pub uploaded_by: String,
    pub uploaded_at: i64,
    pub updated_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

/// Input for [`Media::create`].
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub folder: String,
    pub storage_key: String,
    pub public_url: String,
    pub uploaded_by: String,
}

impl Media {
    /// Insert a media record.
    pub async fn create(pool: &SqlitePool, input: &NewMedia) -> Result<Self> {
        sqlx::query_as::<_, Media>(
            "INSERT INTO media \
             (id, filename, original_name, mime_type, size, folder, storage_key, public_url, uploaded_by, uploaded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(&input.filename)
        .bind(&input.original_name)
        .bind(&input.mime_type)
        .bind(input.size)
        .bind(&input.folder)
        .bind(&input.storage_key)
        .bind(&input.public_url)
        .bind(&input.uploaded_by)
        .bind(now_millis())
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to create media '{}'", input.filename))
    }

    /// Find a media record that has not been deleted.
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, Media>("SELECT * FROM media WHERE id = ? AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch media")
    }

    /// Non-deleted media in a folder, newest first.
    pub async fn list_by_folder(pool: &SqlitePool, folder: &str) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Media>(
            "SELECT * FROM media WHERE folder = ? AND deleted_at IS NULL ORDER BY uploaded_at DESC, id DESC",
        )
        .bind(folder)
        .fetch_all(pool)
        .await
        .context("failed to list media")
    }

    /// Mark a media record as deleted. Returns false if it was not found.
    pub async fn soft_delete(pool: &SqlitePool, id: &str) -> Result<bool> {
        let now = now_millis();
        let result = sqlx::query(
            "UPDATE media SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete media")?;

        Ok(result.rows_affected() > 0)
    }
}
