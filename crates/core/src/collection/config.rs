//! Collection configuration: the file format and its validation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

static NAME_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new("^[a-z0-9_]+$").ok());

/// Field types that need a list of options.
const CHOICE_TYPES: &[&str] = &["select", "multiselect", "radio"];

fn default_true() -> bool {
    true
}

/// A collection defined in code or in a `*.collection.*` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    /// Machine name; lowercase letters, digits and underscores.
    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "display_name")]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default)]
    pub schema: Option<CollectionSchema>,

    /// Managed collections are owned by config and deactivated when removed.
    #[serde(default = "default_true")]
    pub managed: bool,

    #[serde(default = "default_true", alias = "is_active")]
    pub is_active: bool,
}

/// JSON-schema-like description of a collection's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    #[serde(rename = "type", default)]
    pub schema_type: String,

    #[serde(default)]
    pub properties: BTreeMap<String, FieldConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// One field of a collection schema.
///
/// Attributes not modelled here (format, default, items, ...) are kept in
/// `extra` so they survive a round trip to the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    /// Target collection of a reference field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Result of validating a collection config.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl CollectionConfig {
    /// Create a config with an object schema and no fields.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: None,
            icon: None,
            color: None,
            schema: Some(CollectionSchema {
                schema_type: "object".to_string(),
                properties: BTreeMap::new(),
                required: Vec::new(),
            }),
            managed: true,
            is_active: true,
        }
    }

    /// Add a field to the schema.
    pub fn with_field(mut self, name: impl Into<String>, field: FieldConfig) -> Self {
        if let Some(schema) = self.schema.as_mut() {
            schema.properties.insert(name.into(), field);
        }
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the config for problems that would make it unusable.
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("Collection name is required".to_string());
        } else if !NAME_PATTERN
            .as_ref()
            .is_some_and(|re| re.is_match(&self.name))
        {
            errors.push(
                "Collection name must contain only lowercase letters, numbers, and underscores"
                    .to_string(),
            );
        }

        if self.display_name.is_empty() {
            errors.push("Display name is required".to_string());
        }

        match &self.schema {
            None => errors.push("Schema is required".to_string()),
            Some(schema) => {
                if schema.schema_type != "object" {
                    errors.push("Schema type must be \"object\"".to_string());
                }

                if schema.properties.is_empty() {
                    errors.push("Schema must have properties".to_string());
                }

                for (name, field) in &schema.properties {
                    errors.extend(field.validate(name));
                }
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// The schema serialized as stored in the `collections` table.
    pub fn schema_json(&self) -> Result<String> {
        serde_json::to_string(&self.schema).context("failed to serialize collection schema")
    }

    /// Parse a config file, choosing the format by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read collection file: {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let config: Self = match extension.as_str() {
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON in {}", path.display()))?,
            "yaml" | "yml" => serde_yml::from_str(&content)
                .with_context(|| format!("invalid YAML in {}", path.display()))?,
            "toml" => toml::from_str(&content)
                .with_context(|| format!("invalid TOML in {}", path.display()))?,
            other => bail!(
                "unsupported collection file extension '{other}': {}",
                path.display()
            ),
        };

        Ok(config)
    }
}

impl FieldConfig {
    /// Create a field of the given type.
    pub fn of_type(field_type: impl Into<String>) -> Self {
        Self {
            field_type: Some(field_type.into()),
            ..Self::default()
        }
    }

    /// Set the title.
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    fn validate(&self, name: &str) -> Vec<String> {
        let mut errors = Vec::new();

        let Some(field_type) = self.field_type.as_deref() else {
            errors.push(format!("Field \"{name}\" is missing type"));
            return errors;
        };

        if field_type == "reference" && self.collection.is_none() {
            errors.push(format!(
                "Reference field \"{name}\" is missing collection property"
            ));
        }

        if CHOICE_TYPES.contains(&field_type)
            && self.enum_values.as_ref().is_none_or(|v| v.is_empty())
        {
            errors.push(format!("Select field \"{name}\" is missing enum options"));
        }

        errors
    }
}
