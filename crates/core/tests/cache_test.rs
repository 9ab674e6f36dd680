#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the cache service running without Redis.

use serde::{Deserialize, Serialize};

use headwind_core::cache::{CacheConfig, CacheService, CacheSource, cache_config};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Article {
    id: u32,
    title: String,
}

fn content_cache() -> CacheService {
    CacheService::memory(cache_config("content").unwrap())
}

#[tokio::test]
async fn set_get_and_delete() {
    let cache = content_cache();
    let key = cache.generate_key("article", "1");
    assert_eq!(key, "content:article:1");

    let article = Article {
        id: 1,
        title: "Hello".to_string(),
    };
    cache.set(&key, &article, None).await.unwrap();

    let lookup = cache.get_with_source::<Article>(&key).await;
    assert!(lookup.hit);
    assert_eq!(lookup.source, CacheSource::Memory);
    assert_eq!(lookup.data, Some(article));
    assert!(lookup.ttl.unwrap() <= 300);

    cache.delete(&key).await;
    let lookup = cache.get_with_source::<Article>(&key).await;
    assert!(!lookup.hit);
    assert_eq!(lookup.source, CacheSource::None);
}

#[tokio::test]
async fn expired_entries_report_expired() {
    let cache = CacheService::memory(CacheConfig::new(60, "test"));
    cache.set("test:short", "value", Some(0)).await.unwrap();

    let lookup = cache.get_with_source::<String>("test:short").await;
    assert!(!lookup.hit);
    assert_eq!(lookup.source, CacheSource::Expired);

    // The expired entry was dropped on read.
    let lookup = cache.get_with_source::<String>("test:short").await;
    assert_eq!(lookup.source, CacheSource::None);
}

#[tokio::test]
async fn invalidate_by_pattern() {
    let cache = content_cache();
    for id in ["1", "2", "3"] {
        cache
            .set(&cache.generate_key("article", id), &id, None)
            .await
            .unwrap();
    }
    cache
        .set(&cache.generate_key("page", "1"), &"page", None)
        .await
        .unwrap();

    let removed = cache.invalidate("content:article:*").await;
    assert_eq!(removed, 3);
    assert!(cache.get::<String>("content:article:1").await.is_none());
    assert_eq!(
        cache.get::<String>("content:page:1").await.as_deref(),
        Some("page")
    );

    cache.clear().await;
    assert!(cache.get::<String>("content:page:1").await.is_none());
}

#[tokio::test]
async fn get_or_set_fetches_once() {
    let cache = content_cache();
    let calls = std::sync::atomic::AtomicUsize::new(0);

    for _ in 0..3 {
        let value: Vec<u32> = cache
            .get_or_set(
                "content:list",
                || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(value, vec![1, 2, 3]);
    }

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_errors_are_not_cached() {
    let cache = content_cache();

    let result: anyhow::Result<u32> = cache
        .get_or_set("content:broken", || async { Err(anyhow::anyhow!("upstream down")) }, None)
        .await;
    assert!(result.is_err());
    assert!(cache.get::<u32>("content:broken").await.is_none());
}

#[tokio::test]
async fn stats_track_hit_rate() {
    let cache = content_cache();
    cache.set("content:a", &1, None).await.unwrap();

    let _: Option<u32> = cache.get("content:a").await;
    let _: Option<u32> = cache.get("content:a").await;
    let _: Option<u32> = cache.get("content:a").await;
    let _: Option<u32> = cache.get("content:missing").await;

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.entries, 1);
    assert!((stats.hit_rate - 75.0).abs() < f64::EPSILON);
}

#[test]
fn presets() {
    assert_eq!(cache_config("user").unwrap().ttl_secs, 600);
    assert_eq!(cache_config("collection").unwrap().key_prefix, "collection");
    assert!(cache_config("nope").is_none());
}
