//! Scrubbing of telemetry data and anonymous identifiers.
//!
//! Nothing that could identify a person or a path on disk leaves the
//! process: routes lose their ids, errors are reduced to their type or a
//! short redacted summary, and ids are random or hashed.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

static ERROR_TYPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Za-z0-9]*(?:Error|Exception))\b").ok());

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").ok());

static PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:[A-Za-z]:)?(?:[/\\][\w.\-]+)+[/\\]?").ok());

static NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d+").ok());

/// Longest error summary sent.
const MAX_ERROR_LEN: usize = 50;

/// Anonymous identity of an installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryIdentity {
    pub installation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Replace id-like path segments with `:id` and drop query and fragment.
pub fn sanitize_route(route: &str) -> String {
    let path = route.split(['?', '#']).next().unwrap_or_default();

    path.split('/')
        .map(|segment| if is_id_segment(segment) { ":id" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_id_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    segment.bytes().all(|b| b.is_ascii_digit()) || Uuid::try_parse(segment).is_ok()
}

/// Reduce an error message to its type name, or to a short summary with
/// emails, paths and numbers redacted.
pub fn sanitize_error_message(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or_default().trim();

    if let Some(caps) = ERROR_TYPE.as_ref().and_then(|re| re.captures(first_line)) {
        if let Some(kind) = caps.get(1) {
            return kind.as_str().to_string();
        }
    }

    let mut summary = first_line.to_string();
    for (pattern, replacement) in [(&EMAIL, "[email]"), (&PATH, "[path]"), (&NUMBER, "[n]")] {
        if let Some(re) = pattern.as_ref() {
            summary = re.replace_all(&summary, replacement).into_owned();
        }
    }

    summary.chars().take(MAX_ERROR_LEN).collect()
}

/// Keep only scalar properties, scrubbing routes and error values.
pub fn sanitize_properties(properties: &Map<String, Value>) -> Map<String, Value> {
    let mut sanitized = Map::new();

    for (key, value) in properties {
        let clean = match value {
            Value::String(s) if key == "route" => Value::String(sanitize_route(s)),
            Value::String(s) if key.to_lowercase().contains("error") => {
                Value::String(sanitize_error_message(s))
            }
            Value::String(_) | Value::Number(_) | Value::Bool(_) => value.clone(),
            _ => continue,
        };
        sanitized.insert(key.clone(), clean);
    }

    sanitized
}

/// Deterministic sampling: the same event name always gets the same answer.
///
/// A rate of 1 or more never skips; 0 or less always skips.
pub fn should_skip_event(event: &str, sample_rate: f64) -> bool {
    if sample_rate >= 1.0 {
        return false;
    }
    if sample_rate <= 0.0 {
        return true;
    }

    let digest = Sha256::digest(event.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(bytes) as f64 / u64::MAX as f64;

    bucket >= sample_rate
}

/// A new random installation id.
pub fn generate_installation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Stable anonymous id for a project name.
pub fn generate_project_id(project_name: &str) -> String {
    let digest = hex::encode(Sha256::digest(project_name.as_bytes()));
    format!("proj_{}", &digest[..16])
}

/// Identity for a new installation, optionally tied to a project.
pub fn create_installation_identity(project_name: Option<&str>) -> TelemetryIdentity {
    TelemetryIdentity {
        installation_id: generate_installation_id(),
        project_id: project_name.map(generate_project_id),
    }
}
