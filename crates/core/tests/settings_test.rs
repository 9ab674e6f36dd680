#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the settings service.

mod common;

use std::collections::BTreeMap;

use serde_json::json;

use headwind_core::settings::{GeneralSettingsUpdate, SettingsService};

#[tokio::test]
async fn set_then_get_round_trips_json() {
    let pool = common::migrated_pool().await;
    let settings = SettingsService::new(pool);

    assert!(settings.get_setting("email", "smtp").await.unwrap().is_none());

    let smtp = json!({ "host": "mail.example.com", "port": 587 });
    settings.set_setting("email", "smtp", &smtp).await.unwrap();
    assert_eq!(settings.get_setting("email", "smtp").await.unwrap(), Some(smtp));

    settings.set_setting("email", "smtp", &json!(null)).await.unwrap();
    assert_eq!(
        settings.get_setting("email", "smtp").await.unwrap(),
        Some(json!(null))
    );
}

#[tokio::test]
async fn category_settings_skip_invalid_values() {
    let pool = common::migrated_pool().await;
    let settings = SettingsService::new(pool.clone());

    let mut batch = BTreeMap::new();
    batch.insert("a".to_string(), json!(1));
    batch.insert("b".to_string(), json!("two"));
    settings.set_multiple_settings("misc", &batch).await.unwrap();

    sqlx::query(
        "INSERT INTO settings (id, category, key, value, created_at, updated_at) \
         VALUES ('broken', 'misc', 'c', '{not json', 0, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let stored = settings.get_category_settings("misc").await.unwrap();
    assert_eq!(stored, batch);
    assert!(settings.get_setting("misc", "c").await.unwrap().is_none());
}

#[tokio::test]
async fn general_settings_fall_back_to_defaults() {
    let pool = common::migrated_pool().await;
    let settings = SettingsService::new(pool);

    let general = settings.get_general_settings(None).await.unwrap();
    assert_eq!(general.site_name, "Headwind CMS");
    assert_eq!(general.site_description, "A modern headless CMS");
    assert_eq!(general.admin_email, "admin@example.com");
    assert_eq!(general.timezone, "UTC");
    assert_eq!(general.language, "en");
    assert!(!general.maintenance_mode);

    let general = settings
        .get_general_settings(Some("owner@example.com"))
        .await
        .unwrap();
    assert_eq!(general.admin_email, "owner@example.com");
}

#[tokio::test]
async fn saving_general_settings_updates_only_given_fields() {
    let pool = common::migrated_pool().await;
    let settings = SettingsService::new(pool);

    settings
        .save_general_settings(&GeneralSettingsUpdate {
            site_name: Some("Docs".to_string()),
            maintenance_mode: Some(true),
            ..GeneralSettingsUpdate::default()
        })
        .await
        .unwrap();
    settings
        .save_general_settings(&GeneralSettingsUpdate {
            admin_email: Some("docs@example.com".to_string()),
            ..GeneralSettingsUpdate::default()
        })
        .await
        .unwrap();

    let general = settings.get_general_settings(Some("ignored@example.com")).await.unwrap();
    assert_eq!(general.site_name, "Docs");
    assert!(general.maintenance_mode);
    assert_eq!(general.admin_email, "docs@example.com");
    assert_eq!(general.language, "en");

    let raw = settings.get_category_settings("general").await.unwrap();
    assert_eq!(raw.len(), 3);
    assert_eq!(raw["siteName"], "Docs");
}
