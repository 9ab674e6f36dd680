//! Telemetry configuration from the environment.

use std::env;

/// Default collection endpoint.
pub const DEFAULT_TELEMETRY_HOST: &str = "https://stats.headwind.dev";

/// Telemetry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub enabled: bool,
    /// Collection endpoint base URL.
    pub host: String,
    /// Project key. Without one, events are only logged.
    pub api_key: Option<String>,
    pub debug: bool,
    /// Fraction of events sent, from 0.0 to 1.0.
    pub sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_TELEMETRY_HOST.to_string(),
            api_key: None,
            debug: false,
            sample_rate: 1.0,
        }
    }
}

impl TelemetryConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = is_telemetry_enabled(&lookup);

        let host = lookup("HEADWIND_TELEMETRY_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TELEMETRY_HOST.to_string());

        let api_key = lookup("HEADWIND_TELEMETRY_KEY").filter(|v| !v.trim().is_empty());

        let debug = lookup("HEADWIND_ENV").is_some_and(|v| v == "development");

        Self {
            enabled,
            host,
            api_key,
            debug,
            sample_rate: 1.0,
        }
    }

    /// Configuration that never sends anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Telemetry is on unless `HEADWIND_TELEMETRY` or `DO_NOT_TRACK` opt out.
pub fn is_telemetry_enabled(lookup: impl Fn(&str) -> Option<String>) -> bool {
    if let Some(value) = lookup("HEADWIND_TELEMETRY") {
        if matches!(value.to_lowercase().as_str(), "false" | "0" | "disabled") {
            return false;
        }
    }

    if let Some(value) = lookup("DO_NOT_TRACK") {
        if matches!(value.to_lowercase().as_str(), "1" | "true") {
            return false;
        }
    }

    true
}
