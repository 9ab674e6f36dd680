//! Headwind test utilities.
//!
//! Helpers for integration testing: an in-memory database, fixture
//! builders for users and collection files, and plugin manifests.

use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

/// A fresh in-memory database with foreign keys enabled.
///
/// The pool holds exactly one connection, since every connection to
/// `sqlite::memory:` opens its own database.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Create a test user with default values.
pub fn test_user(email: &str) -> TestUser {
    let username = email.split('@').next().unwrap_or(email).to_string();
    TestUser {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        username,
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        role: "viewer".to_string(),
        is_active: true,
    }
}

/// A user row builder. Requires the initial schema.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub is_active: bool,
}

impl TestUser {
    /// Set a custom ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    /// Set as admin.
    pub fn admin(self) -> Self {
        self.with_role("admin")
    }

    /// Set as inactive.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Insert the user and return its id.
    pub async fn insert(self, pool: &SqlitePool) -> Result<String, sqlx::Error> {
        let now = now_millis();
        sqlx::query(
            "INSERT INTO users (id, email, username, first_name, last_name, role, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.id)
        .bind(&self.email)
        .bind(&self.username)
        .bind(&self.first_name)
        .bind(&self.last_name)
        .bind(&self.role)
        .bind(self.is_active)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(self.id)
    }
}

/// A minimal valid collection config as JSON.
pub fn collection_json(name: &str, display_name: &str) -> JsonValue {
    serde_json::json!({
        "name": name,
        "displayName": display_name,
        "schema": {
            "type": "object",
            "properties": {
                "title": { "type": "string", "title": "Title", "required": true }
            },
            "required": ["title"]
        }
    })
}

/// Write `<name>.collection.json` into `dir` and return its path.
pub fn write_collection_file(dir: &Path, name: &str, config: &JsonValue) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("{name}.collection.json"));
    let body = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(&path, body)?;
    Ok(path)
}

/// A plugin manifest with the required fields filled in.
pub fn test_manifest(name: &str) -> JsonValue {
    serde_json::json!({
        "name": name,
        "displayName": format!("{name} plugin"),
        "version": "1.0.0",
        "description": format!("Test plugin {name}"),
        "author": "Test Author"
    })
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_builder() {
        let user = test_user("alice@example.com").admin().inactive();
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, "admin");
        assert!(!user.is_active);
    }

    #[test]
    fn manifest_has_required_fields() {
        let manifest = test_manifest("faq");
        assert_eq!(manifest["name"], "faq");
        assert_eq!(manifest["version"], "1.0.0");
        assert!(manifest["author"].is_string());
    }
}
