//! Two-tier cache with Moka (L1) and an optional Redis tier (L2).
//!
//! Values are stored as JSON. L1 entries carry their own expiry so each
//! key can have its own TTL. Redis failures are logged and treated as
//! misses.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use moka::future::Cache;
use redis::AsyncCommands;
use redis::Client as RedisClient;
use redis::aio::MultiplexedConnection;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maximum L1 cache capacity.
const L1_MAX_CAPACITY: u64 = 10_000;

/// Longest TTL honored, in seconds (about 100 years). Longer TTLs are clamped.
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// TTL and key prefix for one kind of cached data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub key_prefix: String,
}

impl CacheConfig {
    pub fn new(ttl_secs: u64, key_prefix: impl Into<String>) -> Self {
        Self {
            ttl_secs,
            key_prefix: key_prefix.into(),
        }
    }
}

/// Preset configuration by name: `api`, `user`, `content` or `collection`.
pub fn cache_config(name: &str) -> Option<CacheConfig> {
    let ttl_secs = match name {
        "api" => 300,
        "user" => 600,
        "content" => 300,
        "collection" => 600,
        _ => return None,
    };
    Some(CacheConfig::new(ttl_secs, name))
}

/// Where a lookup was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    None,
    Expired,
    Memory,
    Kv,
}

/// A lookup result with its source and remaining TTL.
#[derive(Debug, Clone, Serialize)]
pub struct CacheLookup<T> {
    pub hit: bool,
    pub data: Option<T>,
    pub source: CacheSource,
    /// Remaining seconds, on a hit.
    pub ttl: Option<u64>,
}

impl<T> CacheLookup<T> {
    fn miss(source: CacheSource) -> Self {
        Self {
            hit: false,
            data: None,
            source,
            ttl: None,
        }
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries in L1.
    pub entries: u64,
    /// Hits as a percentage of lookups.
    pub hit_rate: f64,
}

#[derive(Clone)]
struct CacheEntry {
    json: String,
    expires_at: Instant,
}

struct CacheInner {
    local: Cache<String, CacheEntry>,
    redis: Option<RedisClient>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Two-tier JSON cache.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("config", &self.inner.config)
            .field("redis", &self.inner.redis.is_some())
            .finish()
    }
}

impl CacheService {
    /// Create a cache. With `redis`, misses fall through to Redis.
    pub fn new(config: CacheConfig, redis: Option<RedisClient>) -> Self {
        let local = Cache::builder().max_capacity(L1_MAX_CAPACITY).build();

        Self {
            inner: Arc::new(CacheInner {
                local,
                redis,
                config,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// In-process cache only.
    pub fn memory(config: CacheConfig) -> Self {
        Self::new(config, None)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Build a key as `{prefix}:{type}:{id}`.
    pub fn generate_key(&self, kind: &str, id: &str) -> String {
        format!("{}:{kind}:{id}", self.inner.config.key_prefix)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_with_source(key).await.data
    }

    /// Look up a key, reporting which tier answered.
    pub async fn get_with_source<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        if let Some(entry) = self.inner.local.get(key).await {
            let now = Instant::now();
            if entry.expires_at <= now {
                self.inner.local.invalidate(key).await;
                self.record_miss();
                debug!(key = %key, "cache entry expired");
                return CacheLookup::miss(CacheSource::Expired);
            }

            match serde_json::from_str(&entry.json) {
                Ok(data) => {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    return CacheLookup {
                        hit: true,
                        data: Some(data),
                        source: CacheSource::Memory,
                        ttl: Some(entry.expires_at.duration_since(now).as_secs()),
                    };
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "dropping undecodable cache entry");
                    self.inner.local.invalidate(key).await;
                }
            }
        }

        if let Some((json, ttl)) = self.redis_get(key).await {
            if let Ok(data) = serde_json::from_str(&json) {
                debug!(key = %key, "cache L2 hit, populating L1");
                self.insert_local(key, json, ttl).await;
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return CacheLookup {
                    hit: true,
                    data: Some(data),
                    source: CacheSource::Kv,
                    ttl: Some(ttl),
                };
            }
            warn!(key = %key, "ignoring undecodable value in Redis");
        }

        self.record_miss();
        CacheLookup::miss(CacheSource::None)
    }

    /// Store a value. `ttl_secs` defaults to the config's TTL.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: Option<u64>,
    ) -> Result<()> {
        let json = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize cache value for '{key}'"))?;
        let ttl = ttl_secs
            .unwrap_or(self.inner.config.ttl_secs)
            .min(MAX_TTL_SECS);

        self.insert_local(key, json.clone(), ttl).await;

        if let Some(mut conn) = self.redis_conn().await {
            if let Err(e) = conn.set_ex::<_, _, ()>(key, &json, ttl.max(1)).await {
                warn!(error = %e, key = %key, "failed to set cache value in Redis");
            }
        }

        debug!(key = %key, ttl, "cache set");
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        self.inner.local.invalidate(key).await;

        if let Some(mut conn) = self.redis_conn().await {
            if let Err(e) = conn.del::<_, ()>(key).await {
                warn!(error = %e, key = %key, "failed to delete cache key from Redis");
            }
        }
    }

    /// Remove every key matching a glob (`*` and `?`). Returns the number
    /// of L1 entries removed.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        let Some(matcher) = glob_to_regex(pattern) else {
            warn!(pattern = %pattern, "invalid cache invalidation pattern");
            return 0;
        };

        let keys: Vec<String> = self
            .inner
            .local
            .iter()
            .filter(|(key, _)| matcher.is_match(key))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &keys {
            self.inner.local.invalidate(key).await;
        }

        self.redis_delete_matching(pattern).await;

        debug!(pattern = %pattern, removed = keys.len(), "cache pattern invalidated");
        keys.len() as u64
    }

    /// Drop every entry under this cache's prefix, and all of L1.
    pub async fn clear(&self) {
        self.inner.local.invalidate_all();
        self.inner.local.run_pending_tasks().await;

        let pattern = format!("{}:*", self.inner.config.key_prefix);
        self.redis_delete_matching(&pattern).await;
    }

    /// Return the cached value, or compute, store and return it.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, fetch: F, ttl_secs: Option<u64>) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = fetch().await?;
        self.set(key, &value, ttl_secs).await?;
        Ok(value)
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.local.run_pending_tasks().await;

        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64 * 100.0
        };

        CacheStats {
            hits,
            misses,
            entries: self.inner.local.entry_count(),
            hit_rate,
        }
    }

    fn record_miss(&self) {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
    }

    async fn insert_local(&self, key: &str, json: String, ttl_secs: u64) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(ttl_secs.min(MAX_TTL_SECS)))
            .or_else(|| now.checked_add(Duration::from_secs(MAX_TTL_SECS / 100)))
            .unwrap_or(now);
        let entry = CacheEntry { json, expires_at };
        self.inner.local.insert(key.to_string(), entry).await;
    }

    async fn redis_conn(&self) -> Option<MultiplexedConnection> {
        let client = self.inner.redis.as_ref()?;
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!(error = %e, "failed to get Redis connection for cache");
                None
            }
        }
    }

    /// Value and remaining TTL from Redis.
    async fn redis_get(&self, key: &str) -> Option<(String, u64)> {
        let mut conn = self.redis_conn().await?;

        let value: Option<String> = match conn.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, key = %key, "failed to read cache value from Redis");
                return None;
            }
        };
        let value = value?;

        let ttl: i64 = conn.ttl(key).await.unwrap_or(-1);
        let ttl = u64::try_from(ttl)
            .ok()
            .filter(|t| *t > 0)
            .unwrap_or(self.inner.config.ttl_secs);

        Some((value, ttl))
    }

    async fn redis_delete_matching(&self, pattern: &str) {
        let Some(mut conn) = self.redis_conn().await else {
            return;
        };

        let mut cursor = 0u64;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = match redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "SCAN failed during cache invalidation");
                    break;
                }
            };

            if !keys.is_empty() {
                if let Err(e) = conn.del::<_, ()>(&keys).await {
                    warn!(error = %e, "failed to delete cache keys from Redis");
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
    }
}

/// Anchored regex for a glob where `*` matches any run and `?` one character.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr).ok()
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        assert_eq!(cache_config("api").unwrap().ttl_secs, 300);
        assert_eq!(cache_config("user").unwrap().ttl_secs, 600);
        assert_eq!(cache_config("collection").unwrap().key_prefix, "collection");
        assert!(cache_config("sessions").is_none());
    }

    #[test]
    fn glob_matching() {
        let re = glob_to_regex("content:post:*").unwrap();
        assert!(re.is_match("content:post:1"));
        assert!(re.is_match("content:post:"));
        assert!(!re.is_match("xcontent:post:1"));

        let re = glob_to_regex("a.?").unwrap();
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("axb"));
        assert!(!re.is_match("a.bc"));
    }

    #[tokio::test]
    async fn huge_ttl_is_clamped() {
        let cache = CacheService::memory(cache_config("content").unwrap());
        cache.set("k", &1, Some(u64::MAX)).await.unwrap();

        let lookup = cache.get_with_source::<i32>("k").await;
        assert_eq!(lookup.data, Some(1));
        assert_eq!(lookup.source, CacheSource::Memory);
        assert!(lookup.ttl.unwrap() <= MAX_TTL_SECS);

        let value: i32 = cache
            .get_or_set("other", || async { Ok::<_, anyhow::Error>(7) }, Some(u64::MAX))
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn keys_use_prefix() {
        let cache = CacheService::memory(cache_config("content").unwrap());
        assert_eq!(cache.generate_key("post", "42"), "content:post:42");
    }
}
