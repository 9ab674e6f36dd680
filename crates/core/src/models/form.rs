//! Forms and their submissions.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{FromRow, Row, SqlitePool};
use uuid::Uuid;

use crate::db::now_millis;

/// A row of the `forms` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Form {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub category: String,
    /// Form definition as JSON text.
    pub schema: String,
    pub settings: Option<String>,
    pub is_active: bool,
    pub is_public: bool,
    pub managed: bool,
    pub submission_count: i64,
    pub view_count: i64,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A row of the `form_submissions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FormSubmission {
    pub id: String,
    pub form_id: String,
    pub submission_data: String,
    pub status: String,
    pub submission_number: Option<i64>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_spam: bool,
    pub is_archived: bool,
    pub submitted_at: i64,
    pub updated_at: i64,
}

/// Input for [`Form::create`].
#[derive(Debug, Clone)]
pub struct NewForm {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub schema: serde_json::Value,
    pub created_by: Option<String>,
}

/// Input for [`FormSubmission::submit`].
#[derive(Debug, Clone, Default)]
pub struct NewSubmission {
    pub data: serde_json::Value,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Form {
    /// Insert a form.
    pub async fn create(pool: &SqlitePool, input: &NewForm) -> Result<Self> {
        let now = now_millis();
        sqlx::query_as::<_, Form>(
            "INSERT INTO forms (id, name, display_name, description, schema, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(&input.name)
        .bind(&input.display_name)
        .bind(&input.description)
        .bind(input.schema.to_string())
        .bind(&input.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to create form '{}'", input.name))
    }

    /// Find a form by machine name.
    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, Form>("SELECT * FROM forms WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .context("failed to fetch form")
    }
}

impl FormSubmission {
    /// Store a submission. The form's submission counter is maintained by
    /// a database trigger.
    pub async fn submit(pool: &SqlitePool, form_id: &str, input: &NewSubmission) -> Result<Self> {
        let now = now_millis();
        let mut tx = pool.begin().await?;

        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM form_submissions WHERE form_id = ?")
            .bind(form_id)
            .fetch_one(&mut *tx)
            .await?;
        let number: i64 = row.get::<i64, _>("cnt") + 1;

        let submission = sqlx::query_as::<_, FormSubmission>(
            "INSERT INTO form_submissions \
             (id, form_id, submission_data, submission_number, user_id, user_email, ip_address, user_agent, submitted_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(form_id)
        .bind(input.data.to_string())
        .bind(number)
        .bind(&input.user_id)
        .bind(&input.user_email)
        .bind(&input.ip_address)
        .bind(&input.user_agent)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .context("failed to store form submission")?;

        tx.commit().await?;
        Ok(submission)
    }

    /// Submissions of a form, newest first.
    pub async fn list_for_form(pool: &SqlitePool, form_id: &str) -> Result<Vec<Self>> {
        sqlx::query_as::<_, FormSubmission>(
            "SELECT * FROM form_submissions WHERE form_id = ? ORDER BY submission_number DESC",
        )
        .bind(form_id)
        .fetch_all(pool)
        .await
        .context("failed to list form submissions")
    }
}
