#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for telemetry tracking with a recording transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use headwind_core::telemetry::{
    EVENT_ERROR_OCCURRED, FLUSH_INTERVAL, EVENT_INSTALLATION_STARTED, EVENT_PAGE_VIEWED, TelemetryConfig,
    TelemetryEvent, TelemetryIdentity, TelemetryService, TelemetryTransport,
    create_installation_identity,
};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<TelemetryEvent>>,
    flushes: AtomicUsize,
}

#[async_trait]
impl TelemetryTransport for Recorder {
    async fn send(&self, event: TelemetryEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl TelemetryTransport for Failing {
    async fn send(&self, _event: TelemetryEvent) -> Result<()> {
        anyhow::bail!("network unreachable")
    }
}

fn service(config: TelemetryConfig) -> (TelemetryService, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let service = TelemetryService::with_transport(config, "1.2.3", recorder.clone());
    (service, recorder)
}

fn identity() -> TelemetryIdentity {
    TelemetryIdentity {
        installation_id: "install-1".to_string(),
        project_id: None,
    }
}

fn props(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[tokio::test]
async fn events_before_initialize_are_queued() {
    let (telemetry, recorder) = service(TelemetryConfig::default());

    telemetry.track_installation_started(None).await;
    telemetry.track_dev_server_started(None).await;
    assert_eq!(telemetry.queued_events(), 2);
    assert!(recorder.events.lock().is_empty());

    telemetry.initialize(identity()).await;
    assert_eq!(telemetry.queued_events(), 0);

    let events = recorder.events.lock();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event, EVENT_INSTALLATION_STARTED);
    assert_eq!(events[0].distinct_id, "install-1");
}

#[tokio::test]
async fn properties_are_sanitized_and_stamped() {
    let (telemetry, recorder) = service(TelemetryConfig::default());
    telemetry.initialize(identity()).await;

    telemetry
        .track_page_view(
            "/admin/content/42?draft=1",
            props(json!({ "nested": { "a": 1 }, "count": 3 })),
        )
        .await;
    telemetry
        .track_error("TypeError: cannot read property 'x' of undefined", None)
        .await;

    let events = recorder.events.lock();
    assert_eq!(events.len(), 2);

    let page = &events[0];
    assert_eq!(page.event, EVENT_PAGE_VIEWED);
    assert_eq!(page.properties["route"], "/admin/content/:id");
    assert_eq!(page.properties["count"], 3);
    assert!(!page.properties.contains_key("nested"));
    assert_eq!(page.properties["version"], "1.2.3");
    assert!(page.properties["timestamp"].as_str().is_some());

    let error = &events[1];
    assert_eq!(error.event, EVENT_ERROR_OCCURRED);
    assert_eq!(error.properties["errorType"], "TypeError");
}

#[tokio::test]
async fn disabled_telemetry_sends_nothing() {
    let (telemetry, recorder) = service(TelemetryConfig::disabled());
    telemetry.initialize(identity()).await;
    telemetry.track_installation_started(None).await;

    assert_eq!(telemetry.queued_events(), 0);
    assert!(recorder.events.lock().is_empty());

    let (telemetry, recorder) = service(TelemetryConfig::default());
    telemetry.initialize(identity()).await;
    telemetry.disable();
    telemetry.track_migration_run(None).await;
    assert!(recorder.events.lock().is_empty());

    telemetry.enable();
    telemetry.track_migration_run(None).await;
    assert_eq!(recorder.events.lock().len(), 1);
}

#[tokio::test]
async fn zero_sample_rate_skips_everything() {
    let config = TelemetryConfig {
        sample_rate: 0.0,
        ..TelemetryConfig::default()
    };
    let (telemetry, recorder) = service(config);
    telemetry.initialize(identity()).await;
    telemetry.track_plugin_activated(None).await;

    assert!(recorder.events.lock().is_empty());
}

#[tokio::test]
async fn transport_failures_are_swallowed() {
    let telemetry =
        TelemetryService::with_transport(TelemetryConfig::default(), "1.2.3", Arc::new(Failing));
    telemetry.initialize(create_installation_identity(Some("blog"))).await;

    telemetry
        .track_installation_failed("Error: EACCES /home/alice/site", None)
        .await;
    telemetry.shutdown().await;
}

#[tokio::test]
async fn shutdown_flushes_transport() {
    let (telemetry, recorder) = service(TelemetryConfig::default());
    telemetry.shutdown().await;
    assert_eq!(recorder.flushes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn buffered_events_are_flushed_periodically() {
    let (telemetry, recorder) = service(TelemetryConfig::default());
    telemetry.initialize(identity()).await;
    telemetry.track_dev_server_started(None).await;
    assert_eq!(recorder.flushes.load(Ordering::SeqCst), 0);

    tokio::time::sleep(FLUSH_INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(recorder.flushes.load(Ordering::SeqCst), 1);

    tokio::time::sleep(FLUSH_INTERVAL).await;
    assert_eq!(recorder.flushes.load(Ordering::SeqCst), 2);

    // Shutdown flushes once more and stops the timer.
    telemetry.shutdown().await;
    assert_eq!(recorder.flushes.load(Ordering::SeqCst), 3);
    tokio::time::sleep(FLUSH_INTERVAL * 3).await;
    assert_eq!(recorder.flushes.load(Ordering::SeqCst), 3);
}

#[test]
fn environment_opt_out() {
    let config = TelemetryConfig::from_lookup(|key| match key {
        "DO_NOT_TRACK" => Some("1".to_string()),
        _ => None,
    });
    assert!(!config.enabled);

    let config = TelemetryConfig::from_lookup(|key| match key {
        "HEADWIND_TELEMETRY" => Some("disabled".to_string()),
        _ => None,
    });
    assert!(!config.enabled);

    let config = TelemetryConfig::from_lookup(|key| match key {
        "HEADWIND_TELEMETRY_KEY" => Some("phc_test".to_string()),
        "HEADWIND_ENV" => Some("development".to_string()),
        _ => None,
    });
    assert!(config.enabled);
    assert!(config.debug);
    assert_eq!(config.api_key.as_deref(), Some("phc_test"));
}
