//! Advisor HTTP Surface
//!
//! # Endpoints
//!
//! - `GET /health` - liveness, plain `OK`
//! - `GET /price?symbol=` - raw exchange payload (symbol defaults to BTC)
//! - `GET|POST /decision?symbol=` - `{"decision": "<verdict>"}`
//! - `GET /metrics` - Prometheus metrics in text format
//!
//! Failures answer 500 with a plain-text description. Every request is
//! counted and timed per route, and an inbound W3C trace context becomes the
//! parent of the request span.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, field};

use crate::application::ports::{ErrorKind, PipelineMetrics, Route, Stage, UpstreamError};
use crate::application::services::{AdvisoryService, PipelineError};
use crate::domain::market::DEFAULT_SYMBOL;
use crate::infrastructure::exchange::ExchangeClient;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::telemetry::TracePropagator;

// =============================================================================
// State
// =============================================================================

/// Shared state for the HTTP handlers.
pub struct AppState {
    advisory: AdvisoryService,
    exchange: ExchangeClient,
    metrics: Arc<dyn PipelineMetrics>,
    propagator: TracePropagator,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub fn new(
        advisory: AdvisoryService,
        exchange: ExchangeClient,
        metrics: Arc<dyn PipelineMetrics>,
        propagator: TracePropagator,
    ) -> Self {
        Self {
            advisory,
            exchange,
            metrics,
            propagator,
        }
    }
}

/// `?symbol=` query.
#[derive(Debug, Default, Deserialize)]
pub struct SymbolQuery {
    /// Requested symbol; blank means the default.
    pub symbol: Option<String>,
}

impl SymbolQuery {
    fn symbol(&self) -> String {
        self.symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| DEFAULT_SYMBOL.to_string(), str::to_uppercase)
    }
}

// =============================================================================
// Server
// =============================================================================

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/price", get(price_handler))
        .route("/decision", get(decision_handler).post(decision_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Advisor HTTP server.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server hits a fatal
    /// error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// A failed request, as reported to metrics and the client.
struct HttpFailure {
    stage: Option<Stage>,
    kind: ErrorKind,
    message: String,
}

impl HttpFailure {
    fn price(err: &UpstreamError) -> Self {
        Self {
            stage: Some(Stage::FetchMarketData),
            kind: err.kind(),
            message: format!("Failed to fetch price: {err}"),
        }
    }

    fn decision(err: &PipelineError) -> Self {
        let prefix = match err.stage {
            Stage::HealthCheck => "Market data service is unavailable",
            Stage::FetchMarketData => "Failed to fetch market data",
            _ => "Failed to get decision",
        };
        Self {
            stage: Some(err.stage),
            kind: err.kind(),
            message: format!("{prefix}: {}", err.source),
        }
    }
}

/// Count, time and trace one request.
async fn observe<F>(state: &AppState, route: Route, headers: &HeaderMap, handler: F) -> Response
where
    F: Future<Output = Result<Response, HttpFailure>>,
{
    let started = Instant::now();
    let span = tracing::info_span!(
        "http.request",
        http.route = route.as_str(),
        otel.kind = "server",
        error.kind = field::Empty,
        otel.status_code = field::Empty,
    );
    state.propagator.set_parent_from(&span, headers);
    state.metrics.record_request(route);

    let outcome = handler.instrument(span.clone()).await;
    state.metrics.record_duration(route, started.elapsed());

    match outcome {
        Ok(response) => response,
        Err(failure) => {
            state.metrics.record_error(route, failure.stage, failure.kind);
            span.record("error.kind", failure.kind.as_str());
            span.record("otel.status_code", "ERROR");
            span.in_scope(|| tracing::warn!(error = %failure.message, "Request failed"));
            (StatusCode::INTERNAL_SERVER_ERROR, failure.message).into_response()
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    observe(&state, Route::HttpHealth, &headers, async {
        Ok((StatusCode::OK, "OK").into_response())
    })
    .await
}

async fn price_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SymbolQuery>,
) -> Response {
    let symbol = query.symbol();
    observe(&state, Route::HttpPrice, &headers, async {
        let payload = state
            .exchange
            .fetch_quote(&symbol)
            .await
            .map_err(|e| HttpFailure::price(&e))?;
        Ok(Json(payload).into_response())
    })
    .await
}

async fn decision_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SymbolQuery>,
) -> Response {
    let symbol = query.symbol();
    observe(&state, Route::HttpDecision, &headers, async {
        let advice = state
            .advisory
            .evaluate(&symbol)
            .await
            .map_err(|e| HttpFailure::decision(&e))?;
        Ok(Json(advice.decision).into_response())
    })
    .await
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{DecisionProvider, LivenessPort, MarketDataPort};
    use crate::domain::decision::Verdict;
    use crate::infrastructure::config::{ExchangeSettings, Secret};
    use crate::infrastructure::metrics::InMemoryMetrics;
    use crate::infrastructure::mock::{StubDecision, StubLiveness, StubMarketData};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        router: Router,
        metrics: Arc<InMemoryMetrics>,
        market: Arc<StubMarketData>,
    }

    fn exchange(url: String) -> ExchangeClient {
        let settings = ExchangeSettings {
            api_key: Secret::new("k".to_string()),
            api_url: url,
        };
        ExchangeClient::new(&settings, Duration::from_secs(2), TracePropagator::new()).unwrap()
    }

    fn harness(liveness: StubLiveness, exchange_url: String) -> Harness {
        let metrics = Arc::new(InMemoryMetrics::new());
        let market = Arc::new(StubMarketData::with_price(43_000.0));
        let liveness: Arc<dyn LivenessPort> = Arc::new(liveness);
        let market_port: Arc<dyn MarketDataPort> = market.clone();
        let decisions: Arc<dyn DecisionProvider> = Arc::new(StubDecision::new(Verdict::Hold));
        let state = AppState::new(
            AdvisoryService::new(liveness, market_port, decisions),
            exchange(exchange_url),
            metrics.clone(),
            TracePropagator::new(),
        );
        Harness {
            router: router(Arc::new(state)),
            metrics,
            market,
        }
    }

    async fn send(router: Router, method: &str, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(
                        "traceparent",
                        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn symbol_defaults_to_btc() {
        assert_eq!(SymbolQuery::default().symbol(), "BTC");
        let blank = SymbolQuery {
            symbol: Some("  ".into()),
        };
        assert_eq!(blank.symbol(), "BTC");
        let eth = SymbolQuery {
            symbol: Some("eth".into()),
        };
        assert_eq!(eth.symbol(), "ETH");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let h = harness(StubLiveness::healthy(), "http://127.0.0.1:1".into());
        let (status, body) = send(h.router, "GET", "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
        assert_eq!(h.metrics.requests(Route::HttpHealth), 1);
        assert_eq!(h.metrics.durations(Route::HttpHealth), 1);
    }

    #[tokio::test]
    async fn decision_get_and_post_return_verdict_json() {
        for method in ["GET", "POST"] {
            let h = harness(StubLiveness::healthy(), "http://127.0.0.1:1".into());
            let (status, body) = send(h.router, method, "/decision?symbol=eth").await;

            assert_eq!(status, StatusCode::OK);
            let value: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(value, json!({"decision": "hold"}));
            assert_eq!(h.market.requested(), vec!["ETH".to_string()]);
            assert_eq!(h.metrics.requests(Route::HttpDecision), 1);
        }
    }

    #[tokio::test]
    async fn decision_liveness_failure_is_500_text() {
        let h = harness(StubLiveness::failing(503), "http://127.0.0.1:1".into());
        let (status, body) = send(h.router, "GET", "/decision").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("Market data service is unavailable"));
        assert!(body.contains("503"));
        assert!(h.market.requested().is_empty());
        assert_eq!(
            h.metrics.errors(
                Route::HttpDecision,
                Some(Stage::HealthCheck),
                ErrorKind::UpstreamStatus
            ),
            1
        );
    }

    #[tokio::test]
    async fn price_passes_exchange_payload_through() {
        let server = MockServer::start().await;
        let payload = json!({
            "status": "success",
            "symbols": [{
                "symbol": "BTC", "last": "43000", "last_btc": "1", "lowest": "1",
                "highest": "2", "date": "2024-03-01 12:30:00",
                "daily_change_percentage": "0.1", "source_exchange": "binance"
            }]
        });
        Mock::given(method("GET"))
            .and(query_param("symbol", "BTC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(StubLiveness::healthy(), server.uri());
        let (status, body) = send(h.router, "GET", "/price").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<serde_json::Value>(&body).unwrap(), payload);
    }

    #[tokio::test]
    async fn price_failure_is_500_with_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let h = harness(StubLiveness::healthy(), server.uri());
        let (status, body) = send(h.router, "GET", "/price?symbol=ETH").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("Failed to fetch price"));
        assert!(body.contains("upstream down"));
        assert_eq!(h.metrics.total_errors(), 1);
    }
}
