//! Port Interfaces
//!
//! Contracts between the pipeline services and the outside world. Each
//! upstream hop is a driven port implemented by an infrastructure adapter;
//! tests substitute recording mocks.
//!
//! ## Driven Ports (Outbound)
//!
//! - `LivenessPort`: liveness probe of the data service
//! - `MarketDataPort`: latest price for a symbol
//! - `DecisionProvider`: buy/sell/hold verdict for a snapshot
//! - `ChatTransport`: outbound replies and inbound long-poll
//! - `PipelineMetrics`: counters and histograms keyed by route

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::chat::ChatUpdate;
use crate::domain::decision::Decision;
use crate::domain::market::MarketSnapshot;

// =============================================================================
// Errors
// =============================================================================

/// Failure of a single upstream call.
///
/// Each variant is a distinct condition callers may branch on; see
/// [`UpstreamError::kind`] for the coarse taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Required input missing or empty; no request was sent.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport failure (connect, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Upstream answered with an unexpected HTTP status.
    #[error("upstream returned status {status}: {body}")]
    BadStatus {
        /// Observed HTTP status code.
        status: u16,
        /// Response body captured for diagnostics.
        body: String,
    },

    /// Body could not be decoded, or a numeric field did not parse.
    #[error("invalid response body: {0}")]
    InvalidBody(String),

    /// Upstream reported a non-success status marker.
    #[error("upstream reported status {0:?}")]
    NotSuccess(String),

    /// Success marker present but no usable result.
    #[error("empty result: {0}")]
    EmptyResult(String),

    /// Decision backend answered with something other than buy/sell/hold.
    #[error("invalid decision: {0}")]
    InvalidDecision(String),

    /// A chat message could not be delivered.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Coarse error taxonomy used for metric labels and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or empty required input.
    Validation,
    /// Transport failure.
    Network,
    /// Non-2xx status.
    UpstreamStatus,
    /// Malformed or unparseable payload.
    Parse,
    /// Well-formed payload with unusable content.
    Semantic,
    /// Failed to send a reply.
    Delivery,
}

impl ErrorKind {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Network => "network",
            Self::UpstreamStatus => "upstream_status",
            Self::Parse => "parse",
            Self::Semantic => "semantic",
            Self::Delivery => "delivery",
        }
    }
}

impl UpstreamError {
    /// Classify into the coarse taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Network(_) => ErrorKind::Network,
            Self::BadStatus { .. } => ErrorKind::UpstreamStatus,
            Self::InvalidBody(_) => ErrorKind::Parse,
            Self::NotSuccess(_) | Self::EmptyResult(_) | Self::InvalidDecision(_) => {
                ErrorKind::Semantic
            }
            Self::Delivery(_) => ErrorKind::Delivery,
        }
    }
}

// =============================================================================
// Stages and Routes
// =============================================================================

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// "Analyzing" acknowledgement sent to the user.
    Acknowledge,
    /// Liveness probe of the data service.
    HealthCheck,
    /// Price fetch.
    FetchMarketData,
    /// Decision engine call.
    InferDecision,
    /// Final reply delivery.
    DeliverReply,
}

impl Stage {
    /// Stage name used in spans, metrics and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acknowledge => "acknowledge",
            Self::HealthCheck => "health-check",
            Self::FetchMarketData => "fetch-market-data",
            Self::InferDecision => "infer-decision",
            Self::DeliverReply => "deliver-reply",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical route a metric observation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Chat-driven advisory pipeline.
    Pipeline,
    /// `/start` command.
    Start,
    /// `/help` command.
    Help,
    /// `GET /health`.
    HttpHealth,
    /// `GET /price`.
    HttpPrice,
    /// `GET|POST /decision`.
    HttpDecision,
}

impl Route {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Start => "start",
            Self::Help => "help",
            Self::HttpHealth => "http_health",
            Self::HttpPrice => "http_price",
            Self::HttpDecision => "http_decision",
        }
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Liveness probe of the market data service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LivenessPort: Send + Sync {
    /// Succeeds only when the service answers HTTP 200.
    async fn check_liveness(&self) -> Result<(), UpstreamError>;
}

/// Source of market snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Fetch the latest price for `symbol`.
    ///
    /// An empty symbol fails with [`UpstreamError::Validation`] before any
    /// network call.
    async fn fetch_price(&self, symbol: &str) -> Result<MarketSnapshot, UpstreamError>;
}

/// Decision strategy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Produce a verdict for the snapshot.
    async fn compute_decision(&self, snapshot: &MarketSnapshot) -> Result<Decision, UpstreamError>;
}

/// Chat transport: replies out, updates in.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `text` to `chat_id`.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError>;

    /// Long-poll for updates with id `>= offset`, waiting up to `timeout`.
    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<ChatUpdate>, UpstreamError>;
}

/// Metrics capability injected into services.
pub trait PipelineMetrics: Send + Sync {
    /// Count one handled request.
    fn record_request(&self, route: Route);

    /// Count one failed request.
    fn record_error(&self, route: Route, stage: Option<Stage>, kind: ErrorKind);

    /// Count chat messages delivered.
    fn record_messages_sent(&self, count: u64);

    /// Observe wall-clock processing time.
    fn record_duration(&self, route: Route, duration: Duration);

    /// Count one failed long-poll.
    fn record_poll_failure(&self);
}
