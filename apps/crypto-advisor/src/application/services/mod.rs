//! Application Services
//!
//! - `AdvisoryService`: liveness → market data → decision chain
//! - `PipelineOrchestrator`: chat-facing run of the chain with replies
//! - `IngestionLoop`: long-poll loop that feeds the orchestrator

mod advisory;
mod ingestion;
mod pipeline;

pub use advisory::{Advice, AdvisoryService, PipelineError};
pub use ingestion::{IngestionLoop, IngestionSettings, spawn_detached};
pub use pipeline::{
    ACK_TEXT, FAILURE_TEXT, HELP_REPLY, PipelineOrchestrator, START_REPLY, format_reply,
};
