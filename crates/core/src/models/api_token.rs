//! API tokens for programmatic access.
//!
//! Only the SHA-256 hash of a token is stored; the raw value is returned
//! once from [`ApiToken::create`].

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::db::now_millis;

/// Prefix of raw token values.
const TOKEN_PREFIX: &str = "hw_";

/// A row of the `api_tokens` table (never contains the raw token).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApiToken {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub token: String,
    pub user_id: String,
    /// Permission names as a JSON array.
    pub permissions: String,
    pub expires_at: Option<i64>,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
}

impl ApiToken {
    /// Create a token for a user. Returns the record and the raw token.
    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        name: &str,
        permissions: &[&str],
        expires_at: Option<i64>,
    ) -> Result<(Self, String)> {
        let raw_token = format!("{TOKEN_PREFIX}{}", Uuid::new_v4().simple());
        let permissions =
            serde_json::to_string(permissions).context("failed to encode token permissions")?;

        let record = sqlx::query_as::<_, ApiToken>(
            "INSERT INTO api_tokens (id, name, token, user_id, permissions, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(name)
        .bind(hash_token(&raw_token))
        .bind(user_id)
        .bind(&permissions)
        .bind(expires_at)
        .bind(now_millis())
        .fetch_one(pool)
        .await
        .context("failed to create API token")?;

        Ok((record, raw_token))
    }

    /// Look up an unexpired token by its raw value.
    pub async fn find_by_token(pool: &SqlitePool, raw_token: &str) -> Result<Option<Self>> {
        sqlx::query_as::<_, ApiToken>(
            "SELECT * FROM api_tokens WHERE token = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(hash_token(raw_token))
        .bind(now_millis())
        .fetch_optional(pool)
        .await
        .context("failed to find API token")
    }

    /// Update the last_used_at timestamp.
    pub async fn touch_last_used(pool: &SqlitePool, id: &str) -> Result<()> {
        sqlx::query("UPDATE api_tokens SET last_used_at = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(pool)
            .await
            .context("failed to update last_used_at")?;
        Ok(())
    }

    /// Delete a token. Returns false if it did not exist.
    pub async fn revoke(pool: &SqlitePool, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_tokens WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to revoke API token")?;
        Ok(result.rows_affected() > 0)
    }

    /// Permission names granted to this token.
    pub fn permission_list(&self) -> Vec<String> {
        serde_json::from_str(&self.permissions).unwrap_or_default()
    }
}

fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_hides_token() {
        let a = hash_token("hw_abc");
        assert_eq!(a, hash_token("hw_abc"));
        assert_ne!(a, hash_token("hw_abd"));
        assert!(!a.contains("abc"));
        assert_eq!(a.len(), 64);
    }
}
