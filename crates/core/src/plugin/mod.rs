//! Plugin system.
//!
//! This module handles:
//! - The plugin registry stored in the `plugins` tables
//! - Parsing and validating plugin manifests
//! - Installing the plugins that ship with the system
//! - Ordering plugins by their dependencies
//! - Running in-process hooks
//! - Driving the lifecycle of plugins linked into the host

pub mod bootstrap;
pub mod cli;
pub mod dependency;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod manifest;
pub mod service;
pub mod status;

pub use bootstrap::{BootstrapReport, PluginBootstrapService, PluginDescriptor, core_plugins};
pub use dependency::{check_dependencies, resolve_load_order};
pub use error::PluginError;
pub use hooks::{HookContext, HookError, HookHandler, HookId, HookSystem, ScopedHooks, hook_fn};
pub use manager::{
    ManagerStats, MiddlewareSpec, NamedPluginConfig, Plugin, PluginConfig, PluginConfigExport,
    PluginContext, PluginManager, RegistryStats, RouteSpec, RuntimeStatus,
};
pub use manifest::{KNOWN_HOOKS, PluginManifest};
pub use service::{NewPlugin, PluginService, PluginStats};
pub use status::PluginStatus;
