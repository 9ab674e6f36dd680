//! Plugin system error types with clear, actionable messages.
//!
//! Every error names the plugin involved so callers can report it
//! without extra context.

use thiserror::Error;

/// Errors from plugin lifecycle operations, manifests and dependency checks.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin with this id is installed.
    #[error("Plugin not found: '{id}'")]
    NotFound { id: String },

    /// Core plugins ship with the system and cannot be removed.
    #[error("Cannot uninstall core plugins ('{plugin}' is a core plugin)")]
    CoreUninstall { plugin: String },

    /// Activation needs every declared dependency to be active.
    #[error("Required dependency '{dependency}' is not active (needed by '{plugin}')")]
    DependencyNotActive { plugin: String, dependency: String },

    /// Deactivation is refused while active plugins depend on this one.
    #[error("Cannot deactivate. The following plugins depend on this one: {dependents}")]
    HasDependents { plugin: String, dependents: String },

    /// A feature gated on this plugin was used while it is inactive.
    #[error("plugin '{plugin}' is not active")]
    NotActive { plugin: String },

    /// The manifest could not be parsed or failed validation.
    #[error("plugin '{plugin}': invalid manifest: {details}")]
    InvalidManifest { plugin: String, details: String },

    /// A dependency is not part of the plugin set being ordered.
    #[error("plugin '{plugin}': depends on '{dependency}' which is not installed")]
    MissingDependency { plugin: String, dependency: String },

    /// Circular dependency detected.
    #[error("circular dependency detected involving plugins: {cycle}")]
    CircularDependency { cycle: String },

    /// No plugin with this name is registered with the runtime.
    #[error("Plugin not registered: '{name}'")]
    NotRegistered { name: String },

    /// Install and uninstall need an initialized plugin runtime.
    #[error("plugin manager not initialized")]
    NotInitialized,

    /// Unregistering is refused while other plugins depend on this one.
    #[error("Cannot unregister '{plugin}': plugins {dependents} depend on it")]
    RequiredBy { plugin: String, dependents: String },

    /// The plugin's name or version is malformed.
    #[error("plugin '{plugin}': validation failed: {details}")]
    Invalid { plugin: String, details: String },

    /// A plugin's own lifecycle callback failed.
    #[error("Failed to {action} plugin '{plugin}': {reason}")]
    LifecycleFailed {
        plugin: String,
        action: &'static str,
        reason: String,
    },
}

impl PluginError {
    /// Create a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a has-dependents error listing the dependents.
    pub fn has_dependents(plugin: impl Into<String>, dependents: &[String]) -> Self {
        Self::HasDependents {
            plugin: plugin.into(),
            dependents: dependents.join(", "),
        }
    }

    /// Create a not-registered error.
    pub fn not_registered(name: impl Into<String>) -> Self {
        Self::NotRegistered { name: name.into() }
    }

    /// Create a lifecycle failure from the callback's error.
    pub fn lifecycle(plugin: impl Into<String>, action: &'static str, error: &anyhow::Error) -> Self {
        Self::LifecycleFailed {
            plugin: plugin.into(),
            action,
            reason: format!("{error:#}"),
        }
    }

    /// Create an invalid-manifest error from a list of problems.
    pub fn invalid_manifest(plugin: impl Into<String>, problems: &[String]) -> Self {
        Self::InvalidManifest {
            plugin: plugin.into(),
            details: problems.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependents_are_listed() {
        let err = PluginError::has_dependents("core-auth", &["blog".to_string(), "faq".to_string()]);
        assert_eq!(
            err.to_string(),
            "Cannot deactivate. The following plugins depend on this one: blog, faq"
        );
    }

    #[test]
    fn dependency_message_names_dependency() {
        let err = PluginError::DependencyNotActive {
            plugin: "workflow".to_string(),
            dependency: "content".to_string(),
        };
        assert!(err.to_string().starts_with("Required dependency 'content' is not active"));
    }

    #[test]
    fn manifest_problems_are_joined() {
        let err = PluginError::invalid_manifest("x", &["a".to_string(), "b".to_string()]);
        assert!(err.to_string().contains("a; b"));
    }
}
