//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics in Prometheus format for monitoring.
//!
//! # Metrics
//!
//! - `advisor_requests_total{route}`: handled requests
//! - `advisor_errors_total{route,stage,kind}`: failed requests
//! - `advisor_messages_sent_total`: chat messages delivered
//! - `advisor_processing_duration_seconds{route}`: wall-clock processing time
//! - `advisor_poll_failures_total`: failed long-polls
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the service HTTP port. Services
//! never touch the recorder directly; they receive an
//! `Arc<dyn PipelineMetrics>`.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;

use crate::application::ports::{ErrorKind, PipelineMetrics, Route, Stage};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics initialization error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The global recorder could not be installed.
    #[error("failed to install Prometheus recorder: {0}")]
    InstallFailed(String),
}

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
pub fn init_metrics() -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            register_metrics();
            Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
        }
        // Lost a race with a concurrent initializer.
        Err(e) => PROMETHEUS_HANDLE
            .get()
            .cloned()
            .ok_or_else(|| MetricsError::InstallFailed(e.to_string())),
    }
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

const REQUESTS_TOTAL: &str = "advisor_requests_total";
const ERRORS_TOTAL: &str = "advisor_errors_total";
const MESSAGES_SENT_TOTAL: &str = "advisor_messages_sent_total";
const PROCESSING_DURATION: &str = "advisor_processing_duration_seconds";
const POLL_FAILURES_TOTAL: &str = "advisor_poll_failures_total";

fn register_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total requests handled, by route");
    describe_counter!(
        ERRORS_TOTAL,
        "Total failed requests, by route, failing stage and error kind"
    );
    describe_counter!(MESSAGES_SENT_TOTAL, "Total chat messages delivered");
    describe_histogram!(
        PROCESSING_DURATION,
        "Wall-clock time to fully process a request"
    );
    describe_counter!(POLL_FAILURES_TOTAL, "Total failed long-poll attempts");
}

/// Label value for an optional stage.
const fn stage_label(stage: Option<Stage>) -> &'static str {
    match stage {
        Some(stage) => stage.as_str(),
        None => "none",
    }
}

// =============================================================================
// Recorders
// =============================================================================

/// Records through the global `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl PipelineMetrics for PrometheusMetrics {
    fn record_request(&self, route: Route) {
        counter!(REQUESTS_TOTAL, "route" => route.as_str()).increment(1);
    }

    fn record_error(&self, route: Route, stage: Option<Stage>, kind: ErrorKind) {
        counter!(
            ERRORS_TOTAL,
            "route" => route.as_str(),
            "stage" => stage_label(stage),
            "kind" => kind.as_str()
        )
        .increment(1);
    }

    fn record_messages_sent(&self, count: u64) {
        counter!(MESSAGES_SENT_TOTAL).increment(count);
    }

    fn record_duration(&self, route: Route, duration: Duration) {
        histogram!(PROCESSING_DURATION, "route" => route.as_str()).record(duration.as_secs_f64());
    }

    fn record_poll_failure(&self) {
        counter!(POLL_FAILURES_TOTAL).increment(1);
    }
}

#[derive(Debug, Default)]
struct Recorded {
    requests: HashMap<Route, u64>,
    errors: HashMap<(Route, Option<Stage>, ErrorKind), u64>,
    messages_sent: u64,
    durations: HashMap<Route, Vec<Duration>>,
    poll_failures: u64,
}

/// Keeps every observation in memory for assertions.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    recorded: Mutex<Recorded>,
}

impl InMemoryMetrics {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests counted for `route`.
    #[must_use]
    pub fn requests(&self, route: Route) -> u64 {
        self.recorded.lock().requests.get(&route).copied().unwrap_or(0)
    }

    /// Errors counted for an exact label set.
    #[must_use]
    pub fn errors(&self, route: Route, stage: Option<Stage>, kind: ErrorKind) -> u64 {
        self.recorded
            .lock()
            .errors
            .get(&(route, stage, kind))
            .copied()
            .unwrap_or(0)
    }

    /// Errors counted across all labels.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.recorded.lock().errors.values().sum()
    }

    /// Chat messages counted as delivered.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.recorded.lock().messages_sent
    }

    /// Number of duration observations for `route`.
    #[must_use]
    pub fn durations(&self, route: Route) -> usize {
        self.recorded.lock().durations.get(&route).map_or(0, Vec::len)
    }

    /// Failed polls counted.
    #[must_use]
    pub fn poll_failures(&self) -> u64 {
        self.recorded.lock().poll_failures
    }
}

impl PipelineMetrics for InMemoryMetrics {
    fn record_request(&self, route: Route) {
        *self.recorded.lock().requests.entry(route).or_default() += 1;
    }

    fn record_error(&self, route: Route, stage: Option<Stage>, kind: ErrorKind) {
        *self
            .recorded
            .lock()
            .errors
            .entry((route, stage, kind))
            .or_default() += 1;
    }

    fn record_messages_sent(&self, count: u64) {
        self.recorded.lock().messages_sent += count;
    }

    fn record_duration(&self, route: Route, duration: Duration) {
        self.recorded
            .lock()
            .durations
            .entry(route)
            .or_default()
            .push(duration);
    }

    fn record_poll_failure(&self) {
        self.recorded.lock().poll_failures += 1;
    }
}

// =============================================================================
// Tests
// =============================================================================
