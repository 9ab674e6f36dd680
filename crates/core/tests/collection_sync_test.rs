#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for collection config loading and synchronization.

mod common;

use headwind_core::collection::{
    CollectionConfig, CollectionRegistry, FieldConfig, SyncStatus, full_collection_sync,
    is_collection_managed, managed_collections, sync_collection,
};
use headwind_core::models::CollectionRow;
use headwind_test_utils::{collection_json, write_collection_file};

fn articles() -> CollectionConfig {
    CollectionConfig::new("articles", "Articles")
        .with_field("title", FieldConfig::of_type("string").titled("Title"))
        .with_description("Articles")
}

#[tokio::test]
async fn sync_creates_then_reports_unchanged() {
    let pool = common::migrated_pool().await;
    let config = articles();

    let first = sync_collection(&pool, &config).await;
    assert_eq!(first.status, SyncStatus::Created);

    let row = CollectionRow::find_by_name(&pool, "articles").await.unwrap().unwrap();
    assert!(row.id.starts_with("col-articles-"));
    assert!(row.managed);
    assert!(row.is_active);
    assert_eq!(row.description.as_deref(), Some("Articles"));

    let second = sync_collection(&pool, &config).await;
    assert_eq!(second.status, SyncStatus::Unchanged);
}

#[tokio::test]
async fn schema_change_updates_row() {
    let pool = common::migrated_pool().await;
    sync_collection(&pool, &articles()).await;

    let changed = articles().with_field("body", FieldConfig::of_type("string"));
    let result = sync_collection(&pool, &changed).await;
    assert_eq!(result.status, SyncStatus::Updated);

    let row = CollectionRow::find_by_name(&pool, "articles").await.unwrap().unwrap();
    let schema = row.schema_value().unwrap();
    assert!(schema["properties"]["body"].is_object());
}

#[tokio::test]
async fn invalid_config_is_an_error_result() {
    let pool = common::migrated_pool().await;
    let config = CollectionConfig::new("Bad-Name", "Bad");

    let result = sync_collection(&pool, &config).await;
    assert_eq!(result.status, SyncStatus::Error);
    let message = result.message.unwrap();
    assert!(message.starts_with("Validation failed: "));
    assert!(message.contains("lowercase letters"));
    assert!(message.contains("Schema must have properties"));
    assert!(CollectionRow::find_by_name(&pool, "Bad-Name").await.unwrap().is_none());
}

#[tokio::test]
async fn full_sync_reads_files_and_deactivates_removed() {
    let pool = common::migrated_pool().await;
    let dir = tempfile::tempdir().unwrap();

    write_collection_file(dir.path(), "landing", &collection_json("landing", "Landing")).unwrap();
    write_collection_file(dir.path(), "events", &collection_json("events", "Events")).unwrap();
    std::fs::write(
        dir.path().join("docs.collection.yaml"),
        "name: docs\ndisplayName: Docs\nschema:\n  type: object\n  properties:\n    title:\n      type: string\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let registry = CollectionRegistry::with_dir(dir.path());
    let report = full_collection_sync(&pool, &registry).await.unwrap();
    assert_eq!(report.results.len(), 3);
    assert!(report.results.iter().all(|r| r.status == SyncStatus::Created));
    assert!(report.removed.is_empty());

    std::fs::remove_file(dir.path().join("events.collection.json")).unwrap();
    let report = full_collection_sync(&pool, &registry).await.unwrap();
    assert_eq!(report.removed, vec!["events".to_string()]);

    let events = CollectionRow::find_by_name(&pool, "events").await.unwrap().unwrap();
    assert!(!events.is_active);
    assert!(is_collection_managed(&pool, "events").await.unwrap());

    // Collections seeded by the initial migration are not managed.
    assert!(!is_collection_managed(&pool, "news").await.unwrap());
    let news = CollectionRow::find_by_name(&pool, "news").await.unwrap().unwrap();
    assert!(news.is_active);

    let managed: Vec<String> = managed_collections(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(managed, vec!["docs", "events", "landing"]);
}

#[tokio::test]
async fn registered_config_wins_over_file() {
    let dir = tempfile::tempdir().unwrap();
    write_collection_file(dir.path(), "pages", &collection_json("pages", "From File")).unwrap();

    let registry = CollectionRegistry::with_dir(dir.path());
    registry.register([CollectionConfig::new("pages", "From Code")
        .with_field("title", FieldConfig::of_type("string"))]);

    let configs = registry.load_configs().unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].display_name, "From Code");
    assert_eq!(registry.available_collection_names().unwrap(), vec!["pages"]);
}

#[tokio::test]
async fn unmanaged_collections_survive_cleanup() {
    let pool = common::migrated_pool().await;
    let mut manual = articles();
    manual.managed = false;
    sync_collection(&pool, &manual).await;

    let registry = CollectionRegistry::new();
    let report = full_collection_sync(&pool, &registry).await.unwrap();
    assert!(report.removed.is_empty());

    let row = CollectionRow::find_by_name(&pool, "articles").await.unwrap().unwrap();
    assert!(row.is_active);
}
