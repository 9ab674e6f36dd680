#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Every test gets its own in-memory database with the bundled migrations
//! applied, so tests never share state.

#![allow(dead_code)]

use sqlx::SqlitePool;

use headwind_core::migration::MigrationService;

/// A fresh in-memory database with no schema.
pub async fn empty_pool() -> SqlitePool {
    headwind_test_utils::memory_pool()
        .await
        .expect("failed to open in-memory database")
}

/// A fresh in-memory database with every bundled migration applied.
pub async fn migrated_pool() -> SqlitePool {
    let pool = empty_pool().await;
    let result = MigrationService::new(pool.clone())
        .run_pending()
        .await
        .expect("failed to run migrations");
    assert!(result.success, "migrations failed: {:?}", result.errors);
    pool
}
