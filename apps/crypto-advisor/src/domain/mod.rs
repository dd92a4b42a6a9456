//! Domain Layer - Core advisory types and business rules.
//!
//! Pure types with no I/O: market snapshots, verdicts and inbound chat
//! updates, plus the small parsing rules that belong to them.

/// Inbound chat updates and command classification.
pub mod chat;

/// Trading verdicts and their canonical parsing.
pub mod decision;

/// Market snapshots and symbol extraction.
pub mod market;
