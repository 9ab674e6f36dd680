//! Registry of collection configs from code and from a config directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::config::CollectionConfig;

/// File name marker for collection config files: `<name>.collection.<ext>`.
const FILE_MARKER: &str = ".collection.";

/// Supported config file extensions.
const EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml"];

/// Collection configs registered in code, plus an optional config directory.
#[derive(Clone, Default)]
pub struct CollectionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    registered: RwLock<Vec<CollectionConfig>>,
    dir: Option<PathBuf>,
}

impl std::fmt::Debug for CollectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionRegistry")
            .field("registered", &self.inner.registered.read().len())
            .field("dir", &self.inner.dir)
            .finish()
    }
}

impl CollectionRegistry {
    /// Registry with no config directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that also reads `*.collection.*` files from `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                registered: RwLock::new(Vec::new()),
                dir: Some(dir.into()),
            }),
        }
    }

    /// Register configs from code.
    ///
    /// Entries missing a name, display name or schema are skipped. A config
    /// with an already registered name replaces the earlier one.
    pub fn register(&self, configs: impl IntoIterator<Item = CollectionConfig>) {
        let mut registered = self.inner.registered.write();

        for config in configs {
            if config.name.is_empty() || config.display_name.is_empty() || config.schema.is_none()
            {
                warn!(
                    name = %config.name,
                    "skipping collection config missing name, display name or schema"
                );
                continue;
            }

            debug!(collection = %config.name, "registering collection config");
            registered.retain(|c| c.name != config.name);
            registered.push(config);
        }
    }

    /// Configs registered from code.
    pub fn registered(&self) -> Vec<CollectionConfig> {
        self.inner.registered.read().clone()
    }

    /// All configs: registered ones first, then files from the config
    /// directory whose names are not registered.
    pub fn load_configs(&self) -> Result<Vec<CollectionConfig>> {
        let mut configs = self.registered();

        for path in self.config_files()? {
            match CollectionConfig::from_file(&path) {
                Ok(config) => {
                    if configs.iter().any(|c| c.name == config.name) {
                        debug!(
                            collection = %config.name,
                            path = %path.display(),
                            "registered config overrides file"
                        );
                        continue;
                    }
                    configs.push(config);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %format!("{e:#}"), "skipping unreadable collection file");
                }
            }
        }

        Ok(configs)
    }

    /// A single config by name.
    pub fn load_collection_config(&self, name: &str) -> Result<Option<CollectionConfig>> {
        Ok(self.load_configs()?.into_iter().find(|c| c.name == name))
    }

    /// Names of all known collections, from registrations and file names.
    pub fn available_collection_names(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> =
            self.inner.registered.read().iter().map(|c| c.name.clone()).collect();

        for path in self.config_files()? {
            if let Some(name) = collection_name_from_path(&path) {
                names.insert(name);
            }
        }

        Ok(names.into_iter().collect())
    }

    fn config_files(&self) -> Result<Vec<PathBuf>> {
        let Some(dir) = self.inner.dir.as_deref() else {
            return Ok(Vec::new());
        };

        if !dir.exists() {
            debug!(dir = %dir.display(), "collections directory does not exist");
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read collections directory {}", dir.display()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && collection_name_from_path(p).is_some())
            .collect();
        files.sort();

        Ok(files)
    }
}

/// Collection name encoded in a `<name>.collection.<ext>` file name.
pub fn collection_name_from_path(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let (name, extension) = file_name.split_once(FILE_MARKER)?;

    if name.is_empty() || !EXTENSIONS.contains(&extension) {
        return None;
    }

    Some(name.to_string())
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collection::config::FieldConfig;

    #[test]
    fn name_from_path() {
        assert_eq!(
            collection_name_from_path(Path::new("/x/blog_posts.collection.yaml")),
            Some("blog_posts".to_string())
        );
        assert_eq!(
            collection_name_from_path(Path::new("pages.collection.toml")),
            Some("pages".to_string())
        );
        assert_eq!(collection_name_from_path(Path::new("pages.json")), None);
        assert_eq!(collection_name_from_path(Path::new("pages.collection.txt")), None);
        assert_eq!(collection_name_from_path(Path::new(".collection.json")), None);
    }

    #[test]
    fn register_skips_incomplete_and_replaces_duplicates() {
        let registry = CollectionRegistry::new();
        let mut missing_schema = CollectionConfig::new("broken", "Broken");
        missing_schema.schema = None;

        registry.register([
            CollectionConfig::new("a", "First"),
            missing_schema,
            CollectionConfig::new("", "No name"),
            CollectionConfig::new("a", "Second")
                .with_field("title", FieldConfig::of_type("string")),
        ]);

        let registered = registry.registered();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].display_name, "Second");
    }

    #[test]
    fn registry_without_dir_uses_registrations_only() {
        let registry = CollectionRegistry::new();
        registry.register([CollectionConfig::new("pages", "Pages")]);

        assert_eq!(registry.load_configs().unwrap().len(), 1);
        assert_eq!(registry.available_collection_names().unwrap(), vec!["pages"]);
        assert!(registry.load_collection_config("missing").unwrap().is_none());
    }
}
