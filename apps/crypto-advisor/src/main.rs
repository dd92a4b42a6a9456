//! Crypto Advisor Binary
//!
//! Starts the chat ingestion loop and the HTTP surface.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin crypto-advisor
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TELEGRAM_BOT_TOKEN`: Bot API token
//! - `EXCHANGE_API_KEY`: Market data API key
//!
//! ## Optional
//! - `TELEGRAM_API_URL`: Bot API base (default: <https://api.telegram.org>)
//! - `TELEGRAM_POLL_TIMEOUT_SECS`: Long-poll wait (default: 30)
//! - `TELEGRAM_POLL_INTERVAL_MS`: Pause after a failed poll (default: 2000)
//! - `EXCHANGE_API_URL`: Price endpoint (default: <https://api.freecryptoapi.com/v1/getData>)
//! - `DECISION_STRATEGY`: rules | inference (default: rules)
//! - `INFERENCE_API_URL`: Chat-completions base (default: <https://api.groq.com/openai/v1>)
//! - `INFERENCE_API_KEY`: Bearer key, omitted when empty
//! - `INFERENCE_MODEL`: Model name (default: llama3-8b-8192)
//! - `LIVENESS_URL`: Data service base probed at `/health` (default: <http://localhost:8080>,
//!   which is this service itself unless `SERVICE_PORT` changes)
//! - `SERVICE_PORT`: HTTP port (default: 8080)
//! - `HTTP_TIMEOUT_SECS`: Upstream request timeout (default: 10)
//! - `INGESTION_ENABLED`: Run the chat loop (default: true)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: crypto-advisor)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crypto_advisor::application::ports::{
    ChatTransport, DecisionProvider, LivenessPort, MarketDataPort, PipelineMetrics,
};
use crypto_advisor::infrastructure::decision::DecisionEngine;
use crypto_advisor::infrastructure::exchange::ExchangeClient;
use crypto_advisor::infrastructure::http::{AppState, HttpServer};
use crypto_advisor::infrastructure::liveness::HttpLivenessProbe;
use crypto_advisor::infrastructure::metrics::PrometheusMetrics;
use crypto_advisor::infrastructure::telegram::TelegramClient;
use crypto_advisor::infrastructure::telemetry::{self, TracePropagator};
use crypto_advisor::{
    AdvisorConfig, AdvisoryService, IngestionLoop, IngestionSettings, PipelineOrchestrator,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let telemetry_guard = telemetry::init();

    tracing::info!(
        otel_export = telemetry_guard.is_exporting(),
        "Starting Crypto Advisor"
    );

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
    }

    let config = AdvisorConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let propagator = TracePropagator::new();
    let metrics: Arc<dyn PipelineMetrics> = Arc::new(PrometheusMetrics);
    let timeout = config.service.http_timeout;

    // Upstream adapters
    let liveness: Arc<dyn LivenessPort> = Arc::new(HttpLivenessProbe::new(
        &config.service.liveness_url,
        timeout,
        propagator.clone(),
    )?);
    let exchange = ExchangeClient::new(&config.exchange, timeout, propagator.clone())?;
    let market_data: Arc<dyn MarketDataPort> = Arc::new(exchange.clone());
    let engine = DecisionEngine::from_settings(&config.decision, timeout, propagator.clone())?;
    tracing::info!(strategy = engine.strategy().as_str(), "Decision engine selected");
    let decisions: Arc<dyn DecisionProvider> = Arc::new(engine);
    let chat: Arc<dyn ChatTransport> =
        Arc::new(TelegramClient::new(&config.telegram, timeout, propagator.clone())?);

    let advisory = AdvisoryService::new(liveness, market_data, decisions);
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        advisory.clone(),
        Arc::clone(&chat),
        Arc::clone(&metrics),
    ));

    // Spawn HTTP server
    let http_state = Arc::new(AppState::new(
        advisory,
        exchange,
        Arc::clone(&metrics),
        propagator,
    ));
    let http_server = HttpServer::new(config.service.port, http_state, shutdown_token.clone());
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Spawn chat ingestion
    let ingestion_handle = if config.service.ingestion_enabled {
        let settings = IngestionSettings {
            poll_timeout: config.telegram.poll_timeout,
            poll_interval: config.telegram.poll_interval,
        };
        let ingestion = IngestionLoop::new(chat, orchestrator, metrics, settings);
        Some(tokio::spawn(ingestion.run(shutdown_token.clone())))
    } else {
        tracing::info!("Chat ingestion disabled");
        None
    };

    tracing::info!("Crypto advisor ready");

    await_shutdown(shutdown_token).await;

    let drain = async {
        let _ = http_handle.await;
        if let Some(handle) = ingestion_handle {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Shutdown timed out, exiting anyway");
    }

    tracing::info!("Crypto advisor stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &AdvisorConfig) {
    tracing::info!(
        strategy = config.decision.strategy.as_str(),
        port = config.service.port,
        ingestion_enabled = config.service.ingestion_enabled,
        http_timeout_secs = config.service.http_timeout.as_secs(),
        "Configuration loaded"
    );
    tracing::debug!(
        exchange_url = %config.exchange.api_url,
        liveness_url = %config.service.liveness_url,
        inference_url = %config.decision.inference_api_url,
        "Upstream endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
