#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the one-time system bootstrap and the shared
//! application state.

mod common;

use headwind_core::bootstrap::SystemBootstrap;
use headwind_core::collection::CollectionRegistry;
use headwind_core::config::Config;
use headwind_core::db::tables_exist;
use headwind_core::migration::REQUIRED_TABLES;
use headwind_core::models::CollectionRow;
use headwind_core::plugin::PluginService;
use headwind_core::state::AppState;
use headwind_core::telemetry::TelemetryConfig;
use headwind_test_utils::{collection_json, write_collection_file};

#[tokio::test]
async fn bootstrap_initializes_an_empty_database() {
    let pool = common::empty_pool().await;
    let dir = tempfile::tempdir().unwrap();
    write_collection_file(dir.path(), "articles", &collection_json("articles", "Articles")).unwrap();

    let bootstrap = SystemBootstrap::new(pool.clone(), CollectionRegistry::with_dir(dir.path()));
    assert!(!bootstrap.is_complete().await);

    bootstrap.run().await.unwrap();
    assert!(bootstrap.is_complete().await);

    assert!(tables_exist(&pool, REQUIRED_TABLES).await.unwrap());

    let articles = CollectionRow::find_by_name(&pool, "articles").await.unwrap().unwrap();
    assert_eq!(articles.display_name, "Articles");

    let plugins = PluginService::new(pool.clone());
    for id in ["core-auth", "core-media", "core-cache"] {
        let plugin = plugins.get_plugin(id).await.unwrap().unwrap();
        assert!(plugin.is_active(), "{id} should be active");
    }
}

#[tokio::test]
async fn bootstrap_runs_once() {
    let pool = common::empty_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let bootstrap = SystemBootstrap::new(pool.clone(), CollectionRegistry::with_dir(dir.path()));

    bootstrap.run().await.unwrap();

    // Files added after the first run are not picked up by a second one.
    write_collection_file(dir.path(), "faq", &collection_json("faq", "FAQ")).unwrap();
    bootstrap.clone().run().await.unwrap();

    assert!(CollectionRow::find_by_name(&pool, "faq").await.unwrap().is_none());
}

#[tokio::test]
async fn static_paths_do_not_bootstrap() {
    let pool = common::empty_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let bootstrap = SystemBootstrap::new(pool.clone(), CollectionRegistry::with_dir(dir.path()));

    bootstrap.ensure_for_path("/assets/app.js").await.unwrap();
    bootstrap.ensure_for_path("/health").await.unwrap();
    assert!(!bootstrap.is_complete().await);

    bootstrap.ensure_for_path("/admin").await.unwrap();
    assert!(bootstrap.is_complete().await);
}

#[tokio::test]
async fn app_state_shares_services() {
    let pool = common::empty_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        collections_dir: dir.path().to_path_buf(),
        ..Config::in_memory()
    };

    let state = AppState::with_pool(pool, &config, TelemetryConfig::disabled()).unwrap();
    assert!(state.is_healthy().await);
    assert!(!state.telemetry().is_enabled());

    let clone = state.clone();
    clone.bootstrap().run().await.unwrap();
    assert!(state.bootstrap().is_complete().await);

    let status = state.migrations().migration_status().await.unwrap();
    assert_eq!(status.pending, 0);

    state.cache().set("headwind:shared", &1, None).await.unwrap();
    assert_eq!(clone.cache().get::<i32>("headwind:shared").await, Some(1));

    let general = state.settings().get_general_settings(None).await.unwrap();
    assert_eq!(general.site_name, "Headwind CMS");

    // The plugin runtime dispatches through the shared hook system.
    state.hooks().register("app:init", headwind_core::plugin::hook_fn(|d, _| Ok(d)), 10);
    assert!(!state.plugin_manager().is_initialized());
    clone.plugin_manager().initialize().await.unwrap();
    assert!(state.plugin_manager().is_initialized());
    assert_eq!(clone.plugin_manager().stats().hooks["app:init"], 1);
}

#[tokio::test]
async fn invalid_redis_url_is_rejected() {
    let config = Config {
        redis_url: Some("not a url".to_string()),
        ..Config::in_memory()
    };
    let pool = common::empty_pool().await;

    let result = AppState::with_pool(pool, &config, TelemetryConfig::disabled());
    assert!(result.is_err());
}
