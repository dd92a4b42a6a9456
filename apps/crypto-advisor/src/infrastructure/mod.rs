//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - **Driven Adapters (Outbound)**: Implement ports for external systems
//!   - `liveness/`: data-service liveness probe
//!   - `exchange/`: market data service client
//!   - `decision/`: rule-based and inference-backed decision engines
//!   - `telegram/`: Bot API transport
//!
//! - **Driver Adapters (Inbound)**: Expose the advisor to the outside world
//!   - `http/`: health, price, decision and metrics endpoints
//!
//! - **Cross-cutting**
//!   - `config/`: environment configuration
//!   - `telemetry/`: tracing subscriber, OTLP export, context propagation
//!   - `metrics/`: Prometheus recorder and in-memory metrics
//!   - `mock`: scripted adapters for tests

pub mod config;
pub mod decision;
pub mod exchange;
pub mod http;
pub mod liveness;
pub mod metrics;
pub mod mock;
pub mod telegram;
pub mod telemetry;

mod upstream;
