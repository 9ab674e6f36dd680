//! Anonymous usage telemetry.
//!
//! Events are sanitized before they leave the process and are sent in
//! batches. Telemetry never fails the caller: every error is logged at
//! debug level and dropped.

pub mod config;
pub mod sanitize;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

pub use config::TelemetryConfig;
pub use sanitize::{
    TelemetryIdentity, create_installation_identity, generate_installation_id,
    generate_project_id, sanitize_error_message, sanitize_properties, sanitize_route,
    should_skip_event,
};

/// Event names.
pub const EVENT_INSTALLATION_STARTED: &str = "installation_started";
pub const EVENT_INSTALLATION_COMPLETED: &str = "installation_completed";
pub const EVENT_INSTALLATION_FAILED: &str = "installation_failed";
pub const EVENT_DEV_SERVER_STARTED: &str = "dev_server_started";
pub const EVENT_PAGE_VIEWED: &str = "page_viewed";
pub const EVENT_ERROR_OCCURRED: &str = "error_occurred";
pub const EVENT_PLUGIN_ACTIVATED: &str = "plugin_activated";
pub const EVENT_MIGRATION_RUN: &str = "migration_run";

/// Events buffered by [`HttpTransport`] before a batch is posted.
const BATCH_SIZE: usize = 20;

/// How often buffered events are flushed once telemetry is initialized.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// A sanitized event ready to send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub event: String,
    pub distinct_id: String,
    pub properties: Map<String, Value>,
}

/// Delivers events to a collection backend.
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn send(&self, event: TelemetryEvent) -> Result<()>;

    /// Deliver anything buffered.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Posts batches of events to `batch/` under the host URL.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    buffer: Mutex<Vec<TelemetryEvent>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("buffered", &self.buffer.lock().len())
            .finish()
    }
}

#[derive(Serialize)]
struct BatchBody<'a> {
    api_key: &'a str,
    batch: &'a [TelemetryEvent],
}

impl HttpTransport {
    pub fn new(host: &str, api_key: impl Into<String>) -> Result<Self> {
        let mut base =
            Url::parse(host).with_context(|| format!("invalid telemetry host: {host}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("batch/").context("failed to build batch endpoint")?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: api_key.into(),
            buffer: Mutex::new(Vec::new()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetryTransport for HttpTransport {
    async fn send(&self, event: TelemetryEvent) -> Result<()> {
        let full = {
            let mut buffer = self.buffer.lock();
            buffer.push(event);
            buffer.len() >= BATCH_SIZE
        };

        if full {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let batch: Vec<TelemetryEvent> = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return Ok(());
        }

        let body = BatchBody {
            api_key: &self.api_key,
            batch: &batch,
        };

        self.client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .context("failed to post telemetry batch")?
            .error_for_status()
            .context("telemetry endpoint rejected batch")?;

        debug!(count = batch.len(), "telemetry batch sent");
        Ok(())
    }
}

#[derive(Default)]
struct TelemetryState {
    identity: Option<TelemetryIdentity>,
    initialized: bool,
    queue: Vec<(String, Map<String, Value>)>,
}

struct TelemetryInner {
    config: TelemetryConfig,
    version: String,
    enabled: AtomicBool,
    transport: Option<Arc<dyn TelemetryTransport>>,
    state: Mutex<TelemetryState>,
    /// Dropping the sender stops the periodic flush task.
    flusher: Mutex<Option<mpsc::Sender<()>>>,
}

/// Privacy-preserving event tracker.
#[derive(Clone)]
pub struct TelemetryService {
    inner: Arc<TelemetryInner>,
}

impl std::fmt::Debug for TelemetryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryService")
            .field("enabled", &self.is_enabled())
            .field("transport", &self.inner.transport.is_some())
            .finish()
    }
}

impl TelemetryService {
    /// Create a service. Events are posted over HTTP when an api key is
    /// configured, and only logged otherwise.
    pub fn new(config: TelemetryConfig, version: impl Into<String>) -> Self {
        let transport = config.api_key.as_deref().and_then(|key| {
            match HttpTransport::new(&config.host, key) {
                Ok(t) => Some(Arc::new(t) as Arc<dyn TelemetryTransport>),
                Err(e) => {
                    debug!(error = %format!("{e:#}"), "telemetry transport unavailable");
                    None
                }
            }
        });

        Self::build(config, version.into(), transport)
    }

    /// Create a service with a custom transport.
    pub fn with_transport(
        config: TelemetryConfig,
        version: impl Into<String>,
        transport: Arc<dyn TelemetryTransport>,
    ) -> Self {
        Self::build(config, version.into(), Some(transport))
    }

    fn build(
        config: TelemetryConfig,
        version: String,
        transport: Option<Arc<dyn TelemetryTransport>>,
    ) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                enabled: AtomicBool::new(config.enabled),
                config,
                version,
                transport,
                state: Mutex::new(TelemetryState::default()),
                flusher: Mutex::new(None),
            }),
        }
    }

    /// Attach an identity and send any events queued before this call.
    pub async fn initialize(&self, identity: TelemetryIdentity) {
        if !self.is_enabled() {
            debug!("telemetry disabled via configuration");
            return;
        }

        let queued = {
            let mut state = self.inner.state.lock();
            state.identity = Some(identity);
            state.initialized = true;
            std::mem::take(&mut state.queue)
        };

        debug!(queued = queued.len(), "telemetry initialized");
        for (event, properties) in queued {
            self.deliver(event, properties).await;
        }

        self.start_flusher();
    }

    /// Flush the transport every [`FLUSH_INTERVAL`] until shutdown.
    fn start_flusher(&self) {
        let Some(transport) = self.inner.transport.clone() else {
            return;
        };

        let mut flusher = self.inner.flusher.lock();
        if flusher.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + FLUSH_INTERVAL;
            let mut interval = tokio::time::interval_at(start, FLUSH_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = transport.flush().await {
                            debug!(error = %format!("{e:#}"), "periodic telemetry flush failed");
                        }
                    }
                    _ = stop_rx.recv() => {
                        debug!("telemetry flush task stopped");
                        break;
                    }
                }
            }
        });

        *flusher = Some(stop_tx);
    }

    /// Record an event. Properties are sanitized first.
    pub async fn track(&self, event: &str, properties: Option<Map<String, Value>>) {
        if !self.is_enabled() || should_skip_event(event, self.inner.config.sample_rate) {
            return;
        }

        let mut properties = properties
            .as_ref()
            .map(sanitize_properties)
            .unwrap_or_default();
        properties.insert(
            "timestamp".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        properties.insert(
            "version".to_string(),
            Value::String(self.inner.version.clone()),
        );

        {
            let mut state = self.inner.state.lock();
            if !state.initialized {
                if self.inner.config.debug {
                    debug!(event = %event, "telemetry event queued");
                }
                state.queue.push((event.to_string(), properties));
                return;
            }
        }

        self.deliver(event.to_string(), properties).await;
    }

    async fn deliver(&self, event: String, properties: Map<String, Value>) {
        let distinct_id = self
            .inner
            .state
            .lock()
            .identity
            .as_ref()
            .map(|i| i.installation_id.clone());

        let (Some(transport), Some(distinct_id)) = (&self.inner.transport, distinct_id) else {
            debug!(event = %event, "telemetry event (no transport)");
            return;
        };

        let name = event.clone();
        let event = TelemetryEvent {
            event,
            distinct_id,
            properties,
        };

        match transport.send(event).await {
            Ok(()) => debug!(event = %name, "telemetry event tracked"),
            Err(e) => debug!(event = %name, error = %format!("{e:#}"), "failed to send telemetry event"),
        }
    }

    pub async fn track_installation_started(&self, properties: Option<Map<String, Value>>) {
        self.track(EVENT_INSTALLATION_STARTED, properties).await;
    }

    pub async fn track_installation_completed(&self, properties: Option<Map<String, Value>>) {
        self.track(EVENT_INSTALLATION_COMPLETED, properties).await;
    }

    pub async fn track_installation_failed(
        &self,
        error: &str,
        properties: Option<Map<String, Value>>,
    ) {
        let properties = with_property(properties, "errorType", error);
        self.track(EVENT_INSTALLATION_FAILED, Some(properties)).await;
    }

    pub async fn track_dev_server_started(&self, properties: Option<Map<String, Value>>) {
        self.track(EVENT_DEV_SERVER_STARTED, properties).await;
    }

    pub async fn track_page_view(&self, route: &str, properties: Option<Map<String, Value>>) {
        let properties = with_property(properties, "route", route);
        self.track(EVENT_PAGE_VIEWED, Some(properties)).await;
    }

    pub async fn track_error(&self, error: &str, properties: Option<Map<String, Value>>) {
        let properties = with_property(properties, "errorType", error);
        self.track(EVENT_ERROR_OCCURRED, Some(properties)).await;
    }

    pub async fn track_plugin_activated(&self, properties: Option<Map<String, Value>>) {
        self.track(EVENT_PLUGIN_ACTIVATED, properties).await;
    }

    pub async fn track_migration_run(&self, properties: Option<Map<String, Value>>) {
        self.track(EVENT_MIGRATION_RUN, properties).await;
    }

    /// Stop the periodic flush and deliver buffered events.
    pub async fn shutdown(&self) {
        drop(self.inner.flusher.lock().take());

        if let Some(transport) = &self.inner.transport {
            if let Err(e) = transport.flush().await {
                debug!(error = %format!("{e:#}"), "telemetry shutdown flush failed");
            }
        }
    }

    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Number of events waiting for [`initialize`](Self::initialize).
    pub fn queued_events(&self) -> usize {
        self.inner.state.lock().queue.len()
    }
}

fn with_property(
    properties: Option<Map<String, Value>>,
    key: &str,
    value: &str,
) -> Map<String, Value> {
    let mut properties = properties.unwrap_or_default();
    properties.insert(key.to_string(), Value::String(value.to_string()));
    properties
}
