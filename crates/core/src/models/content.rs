//! Content items, their version snapshots and workflow history.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use sqlx::{FromRow, Row, SqlitePool};
use uuid::Uuid;

use crate::db::now_millis;

/// Content status values.
pub const STATUS_DRAFT: &str = "draft";
pub const STATUS_PUBLISHED: &str = "published";
pub const STATUS_ARCHIVED: &str = "archived";

/// A row of the `content` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Content {
    pub id: String,
    pub collection_id: String,
    pub slug: String,
    pub title: String,
    /// Field values as JSON text.
    pub data: String,
    pub status: String,
    pub published_at: Option<i64>,
    pub author_id: String,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A row of the `content_versions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ContentVersion {
    pub id: String,
    pub content_id: String,
    pub version: i64,
    pub data: String,
    pub author_id: String,
    pub created_at: i64,
}

/// A row of the `workflow_history` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowEntry {
    pub id: String,
    pub content_id: String,
    pub action: String,
    pub from_status: String,
    pub to_status: String,
    pub user_id: String,
    pub comment: Option<String>,
    pub created_at: i64,
}

/// Input for [`Content::create`].
#[derive(Debug, Clone)]
pub struct NewContent {
    pub collection_id: String,
    pub slug: String,
    pub title: String,
    pub data: serde_json::Value,
    pub author_id: String,
}

impl Content {
    /// Insert a draft and its first version snapshot.
    pub async fn create(pool: &SqlitePool, input: &NewContent) -> Result<Self> {
        let now = now_millis();
        let id = Uuid::now_v7().to_string();
        let data = input.data.to_string();

        let mut tx = pool.begin().await?;

        let content = sqlx::query_as::<_, Content>(
            "INSERT INTO content \
             (id, collection_id, slug, title, data, status, author_id, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(&id)
        .bind(&input.collection_id)
        .bind(&input.slug)
        .bind(&input.title)
        .bind(&data)
        .bind(STATUS_DRAFT)
        .bind(&input.author_id)
        .bind(&input.author_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to create content '{}'", input.slug))?;

        insert_version(&mut tx, &id, 1, &data, &input.author_id, now).await?;

        tx.commit().await?;
        Ok(content)
    }

    /// Find content by ID.
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, Content>("SELECT * FROM content WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch content")
    }

    /// Find content by slug within a collection.
    pub async fn find_by_slug(
        pool: &SqlitePool,
        collection_id: &str,
        slug: &str,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Content>("SELECT * FROM content WHERE collection_id = ? AND slug = ?")
            .bind(collection_id)
            .bind(slug)
            .fetch_optional(pool)
            .await
            .context("failed to fetch content by slug")
    }

    /// All content in a collection, newest first.
    pub async fn list_by_collection(pool: &SqlitePool, collection_id: &str) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Content>(
            "SELECT * FROM content WHERE collection_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(collection_id)
        .fetch_all(pool)
        .await
        .context("failed to list content")
    }

    /// Parse the field values.
    pub fn data_json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.data).context("content data is not valid JSON")
    }

    /// Move content to a new status.
    ///
    /// Records the transition in `workflow_history` and snapshots the data
    /// as a new version. Publishing sets `published_at` the first time.
    pub async fn transition(
        pool: &SqlitePool,
        id: &str,
        to_status: &str,
        user_id: &str,
        comment: Option<&str>,
    ) -> Result<Self> {
        if ![STATUS_DRAFT, STATUS_PUBLISHED, STATUS_ARCHIVED].contains(&to_status) {
            bail!("unknown content status '{to_status}'");
        }

        let now = now_millis();
        let mut tx = pool.begin().await?;

        let Some(current) = sqlx::query_as::<_, Content>("SELECT * FROM content WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            bail!("content '{id}' not found");
        };

        let updated = sqlx::query_as::<_, Content>(
            "UPDATE content SET status = ?, updated_at = ?, \
             published_at = CASE WHEN ? = 'published' AND published_at IS NULL THEN ? ELSE published_at END \
             WHERE id = ? RETURNING *",
        )
        .bind(to_status)
        .bind(now)
        .bind(to_status)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .context("failed to update content status")?;

        sqlx::query(
            "INSERT INTO workflow_history (id, content_id, action, from_status, to_status, user_id, comment, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(id)
        .bind(format!("transition:{to_status}"))
        .bind(&current.status)
        .bind(to_status)
        .bind(user_id)
        .bind(comment)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("failed to record workflow history")?;

        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) AS v FROM content_versions WHERE content_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        let next: i64 = row.get::<i64, _>("v") + 1;
        insert_version(&mut tx, id, next, &updated.data, user_id, now).await?;

        tx.commit().await?;
        Ok(updated)
    }
}

async fn insert_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    content_id: &str,
    version: i64,
    data: &str,
    author_id: &str,
    now: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO content_versions (id, content_id, version, data, author_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(content_id)
    .bind(version)
    .bind(data)
    .bind(author_id)
    .bind(now)
    .execute(&mut **tx)
    .await
    .context("failed to snapshot content version")?;
    Ok(())
}

impl ContentVersion {
    /// Versions of a content item, oldest first.
    pub async fn list_for_content(pool: &SqlitePool, content_id: &str) -> Result<Vec<Self>> {
        sqlx::query_as::<_, ContentVersion>(
            "SELECT * FROM content_versions WHERE content_id = ? ORDER BY version",
        )
        .bind(content_id)
        .fetch_all(pool)
        .await
        .context("failed to list content versions")
    }
}

impl WorkflowEntry {
    /// Workflow history of a content item, oldest first.
    pub async fn list_for_content(pool: &SqlitePool, content_id: &str) -> Result<Vec<Self>> {
        sqlx::query_as::<_, WorkflowEntry>(
            "SELECT * FROM workflow_history WHERE content_id = ? ORDER BY created_at, id",
        )
        .bind(content_id)
        .fetch_all(pool)
        .await
        .context("failed to list workflow history")
    }
}
