//! Application Layer - Use cases and port definitions.
//!
//! This layer holds the advisory pipeline, the chat ingestion loop and the
//! port interfaces they drive.

/// Port interfaces for upstream services, chat transport and metrics.
pub mod ports;

/// Pipeline orchestration and chat ingestion.
pub mod services;
