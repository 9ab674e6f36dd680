//! User model.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::db::now_millis;

/// A row of the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub role: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for [`User::create`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl NewUser {
    /// A viewer with the given email and username.
    pub fn new(email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            role: "viewer".to_string(),
        }
    }
}

impl User {
    /// Insert a new user.
    pub async fn create(pool: &SqlitePool, input: &NewUser) -> Result<Self> {
        let now = now_millis();

        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, username, first_name, last_name, role, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?) RETURNING *",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(input.email.to_lowercase())
        .bind(&input.username)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.role)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to create user '{}'", input.username))
    }

    /// Find a user by ID.
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by id")
    }

    /// Find a user by email, case-insensitively.
    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email.to_lowercase())
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by email")
    }

    /// Record a successful login.
    pub async fn touch_last_login(pool: &SqlitePool, id: &str) -> Result<()> {
        let now = now_millis();
        sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .context("failed to update last login")?;
        Ok(())
    }
}
