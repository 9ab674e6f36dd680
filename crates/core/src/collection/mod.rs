//! Collections: named content types described by a schema.
//!
//! Configs come from code ([`CollectionRegistry::register`]) or from
//! `*.collection.{json,yaml,yml,toml}` files and are synchronized into the
//! `collections` table.

pub mod config;
pub mod registry;
pub mod sync;

pub use config::{CollectionConfig, CollectionSchema, FieldConfig, ValidationResult};
pub use registry::CollectionRegistry;
pub use sync::{
    FullSyncReport, SyncResult, SyncStatus, cleanup_removed_collections, full_collection_sync,
    is_collection_managed, managed_collections, sync_collection, sync_collections,
};
