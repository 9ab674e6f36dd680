//! Headwind CMS core library.
//!
//! Schema migrations, collection sync, the plugin registry, the persisted
//! logger, the tiered cache, settings and telemetry. The `headwind` binary
//! drives these for operators; applications embed them through
//! [`state::AppState`].

pub mod bootstrap;
pub mod cache;
pub mod cli;
pub mod collection;
pub mod config;
pub mod db;
pub mod error;
pub mod logger;
pub mod migration;
pub mod models;
pub mod plugin;
pub mod settings;
pub mod state;
pub mod telemetry;
