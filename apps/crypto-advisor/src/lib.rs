#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Crypto Advisor - Chat-driven Trading Recommendations
//!
//! Long-polls a chat transport for advice requests and answers each one with
//! a buy/sell/hold verdict for a cryptocurrency. Every request runs the same
//! traced chain of upstream hops, and the chain is also exposed over HTTP.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Snapshots, verdicts and chat commands
//!   - `market`: price snapshots and symbol extraction
//!   - `decision`: verdicts and their normalization
//!   - `chat`: inbound updates and intent classification
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: liveness, market data, decision, chat and metrics ports
//!   - `services`: advisory chain, pipeline orchestrator, ingestion loop
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchange`, `liveness`, `decision`, `telegram`: upstream adapters
//!   - `http`: health, price, decision and metrics endpoints
//!   - `config`, `telemetry`, `metrics`: environment and observability
//!
//! # Data Flow
//!
//! ```text
//! getUpdates ──► IngestionLoop ──► PipelineOrchestrator ──► sendMessage
//!                                        │
//!                                        ▼
//!                      liveness ──► exchange ──► decision engine
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core advisory types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

pub use application::services::{
    AdvisoryService, IngestionLoop, IngestionSettings, PipelineOrchestrator,
};
pub use infrastructure::config::AdvisorConfig;
pub use infrastructure::metrics::init_metrics;
