#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the row models: users, content workflow, forms,
//! media and API tokens.

mod common;

use serde_json::json;
use sqlx::SqlitePool;

use headwind_core::collection::{CollectionConfig, FieldConfig, sync_collection};
use headwind_core::models::content::{STATUS_DRAFT, STATUS_PUBLISHED};
use headwind_core::models::{
    ApiToken, CollectionRow, Content, ContentVersion, Form, FormSubmission, Media, NewContent,
    NewForm, NewMedia, NewSubmission, NewUser, User, WorkflowEntry,
};
use headwind_test_utils::test_user;

async fn articles(pool: &SqlitePool) -> String {
    let config = CollectionConfig::new("articles", "Articles")
        .with_field("title", FieldConfig::of_type("string").titled("Title"));
    sync_collection(pool, &config).await;
    CollectionRow::find_by_name(pool, "articles")
        .await
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn users_are_found_case_insensitively() {
    let pool = common::migrated_pool().await;

    let mut input = NewUser::new("Editor@Example.com", "editor");
    input.role = "editor".to_string();
    let user = User::create(&pool, &input).await.unwrap();
    assert_eq!(user.email, "editor@example.com");
    assert!(user.is_active);
    assert!(user.last_login_at.is_none());

    let found = User::find_by_email(&pool, "EDITOR@example.com").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);

    User::touch_last_login(&pool, &user.id).await.unwrap();
    let found = User::find_by_id(&pool, &user.id).await.unwrap().unwrap();
    assert!(found.last_login_at.is_some());

    assert!(User::create(&pool, &NewUser::new("editor@example.com", "other")).await.is_err());
}

#[tokio::test]
async fn content_transitions_record_history_and_versions() {
    let pool = common::migrated_pool().await;
    let author = test_user("author@example.com").insert(&pool).await.unwrap();
    let collection_id = articles(&pool).await;

    let content = Content::create(
        &pool,
        &NewContent {
            collection_id: collection_id.clone(),
            slug: "hello".to_string(),
            title: "Hello".to_string(),
            data: json!({ "title": "Hello" }),
            author_id: author.clone(),
        },
    )
    .await
    .unwrap();
    assert_eq!(content.status, STATUS_DRAFT);
    assert!(content.published_at.is_none());
    assert_eq!(content.data_json().unwrap()["title"], "Hello");

    let published = Content::transition(&pool, &content.id, STATUS_PUBLISHED, &author, Some("ship it"))
        .await
        .unwrap();
    assert_eq!(published.status, STATUS_PUBLISHED);
    assert!(published.published_at.is_some());

    let history = WorkflowEntry::list_for_content(&pool, &content.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, STATUS_DRAFT);
    assert_eq!(history[0].to_status, STATUS_PUBLISHED);
    assert_eq!(history[0].comment.as_deref(), Some("ship it"));

    let versions = ContentVersion::list_for_content(&pool, &content.id).await.unwrap();
    assert_eq!(versions.iter().map(|v| v.version).collect::<Vec<_>>(), vec![1, 2]);

    let by_slug = Content::find_by_slug(&pool, &collection_id, "hello").await.unwrap().unwrap();
    assert_eq!(by_slug.id, content.id);
    assert_eq!(Content::list_by_collection(&pool, &collection_id).await.unwrap().len(), 1);

    assert!(Content::transition(&pool, &content.id, "deleted", &author, None).await.is_err());
    assert!(Content::transition(&pool, "missing", STATUS_DRAFT, &author, None).await.is_err());
}

#[tokio::test]
async fn form_submissions_are_numbered_and_counted() {
    let pool = common::migrated_pool().await;

    let form = Form::create(
        &pool,
        &NewForm {
            name: "contact".to_string(),
            display_name: "Contact".to_string(),
            description: None,
            schema: json!({ "components": [] }),
            created_by: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(form.submission_count, 0);

    for email in ["a@example.com", "b@example.com"] {
        FormSubmission::submit(
            &pool,
            &form.id,
            &NewSubmission {
                data: json!({ "message": "hi" }),
                user_email: Some(email.to_string()),
                ..NewSubmission::default()
            },
        )
        .await
        .unwrap();
    }

    let submissions = FormSubmission::list_for_form(&pool, &form.id).await.unwrap();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].submission_number, Some(2));
    assert_eq!(submissions[0].user_email.as_deref(), Some("b@example.com"));

    let form = Form::find_by_name(&pool, "contact").await.unwrap().unwrap();
    assert_eq!(form.submission_count, 2);
}

#[tokio::test]
async fn media_soft_delete_hides_records() {
    let pool = common::migrated_pool().await;
    let uploader = test_user("uploader@example.com").insert(&pool).await.unwrap();

    let media = Media::create(
        &pool,
        &NewMedia {
            filename: "logo-1.png".to_string(),
            original_name: "logo.png".to_string(),
            mime_type: "image/png".to_string(),
            size: 2048,
            folder: "brand".to_string(),
            storage_key: "brand/logo-1.png".to_string(),
            public_url: "/media/brand/logo-1.png".to_string(),
            uploaded_by: uploader,
        },
    )
    .await
    .unwrap();

    assert_eq!(Media::list_by_folder(&pool, "brand").await.unwrap().len(), 1);

    assert!(Media::soft_delete(&pool, &media.id).await.unwrap());
    assert!(!Media::soft_delete(&pool, &media.id).await.unwrap());
    assert!(Media::find_by_id(&pool, &media.id).await.unwrap().is_none());
    assert!(Media::list_by_folder(&pool, "brand").await.unwrap().is_empty());
}

#[tokio::test]
async fn api_tokens_are_looked_up_by_raw_value() {
    let pool = common::migrated_pool().await;
    let user = test_user("api@example.com").insert(&pool).await.unwrap();

    let (token, raw) = ApiToken::create(&pool, &user, "ci", &["content:read"], None)
        .await
        .unwrap();
    assert_ne!(token.token, raw);
    assert_eq!(token.permission_list(), vec!["content:read".to_string()]);

    let found = ApiToken::find_by_token(&pool, &raw).await.unwrap().unwrap();
    assert_eq!(found.id, token.id);
    assert!(ApiToken::find_by_token(&pool, "hw_wrong").await.unwrap().is_none());

    ApiToken::touch_last_used(&pool, &token.id).await.unwrap();

    let (expired, expired_raw) = ApiToken::create(&pool, &user, "old", &[], Some(1))
        .await
        .unwrap();
    assert!(ApiToken::find_by_token(&pool, &expired_raw).await.unwrap().is_none());

    assert!(ApiToken::revoke(&pool, &token.id).await.unwrap());
    assert!(!ApiToken::revoke(&pool, &token.id).await.unwrap());
    assert!(ApiToken::revoke(&pool, &expired.id).await.unwrap());
}
