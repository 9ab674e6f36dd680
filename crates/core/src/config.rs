//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL (default: sqlite://headwind.db).
    pub database_url: String,

    /// Maximum database connections in pool (default: 5).
    pub database_max_connections: u32,

    /// Directory holding `*.collection.{json,yaml,yml,toml}` files (default: ./collections).
    pub collections_dir: PathBuf,

    /// Redis connection URL. When None, the cache runs in-process only.
    pub redis_url: Option<String>,

    /// Version string reported by telemetry.
    pub version: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://headwind.db".to_string());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let collections_dir = env::var("COLLECTIONS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./collections"));

        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty());

        let version = env::var("HEADWIND_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            collections_dir,
            redis_url,
            version,
        })
    }

    /// Configuration for an in-memory database, used by tooling and tests.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 1,
            collections_dir: PathBuf::from("./collections"),
            redis_url: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
