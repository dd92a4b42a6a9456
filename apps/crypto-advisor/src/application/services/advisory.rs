//! Advisory chain: liveness check, price fetch, decision.
//!
//! Shared by the chat pipeline and the `/decision` HTTP endpoint. Stages run
//! strictly in order and the first failure ends the chain.

use std::sync::Arc;

use tracing::{Instrument, Span, field};

use crate::application::ports::{
    DecisionProvider, ErrorKind, LivenessPort, MarketDataPort, Stage, UpstreamError,
};
use crate::domain::decision::Decision;
use crate::domain::market::MarketSnapshot;

/// A stage failure, tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    /// Stage that failed.
    pub stage: Stage,
    /// Underlying upstream error.
    pub source: UpstreamError,
}

impl PipelineError {
    /// Tag `source` with `stage`.
    #[must_use]
    pub const fn new(stage: Stage, source: UpstreamError) -> Self {
        Self { stage, source }
    }

    /// Coarse error kind of the underlying failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Result of a successful chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    /// Snapshot the decision was made on.
    pub snapshot: MarketSnapshot,
    /// The decision.
    pub decision: Decision,
}

/// Runs liveness → fetch → decide against the configured ports.
#[derive(Clone)]
pub struct AdvisoryService {
    liveness: Arc<dyn LivenessPort>,
    market_data: Arc<dyn MarketDataPort>,
    decisions: Arc<dyn DecisionProvider>,
}

impl AdvisoryService {
    /// Create a new advisory service.
    #[must_use]
    pub fn new(
        liveness: Arc<dyn LivenessPort>,
        market_data: Arc<dyn MarketDataPort>,
        decisions: Arc<dyn DecisionProvider>,
    ) -> Self {
        Self {
            liveness,
            market_data,
            decisions,
        }
    }

    /// Evaluate `symbol`, stopping at the first failing stage.
    pub async fn evaluate(&self, symbol: &str) -> Result<Advice, PipelineError> {
        self.check_liveness().await?;
        let snapshot = self.fetch_market_data(symbol).await?;
        let decision = self.infer_decision(&snapshot).await?;
        Ok(Advice { snapshot, decision })
    }

    async fn check_liveness(&self) -> Result<(), PipelineError> {
        let span = stage_span(Stage::HealthCheck);
        async {
            self.liveness
                .check_liveness()
                .await
                .map_err(|e| fail_stage(Stage::HealthCheck, e))
        }
        .instrument(span)
        .await
    }

    async fn fetch_market_data(&self, symbol: &str) -> Result<MarketSnapshot, PipelineError> {
        let span = stage_span(Stage::FetchMarketData);
        span.record("symbol", symbol);
        async {
            let snapshot = self
                .market_data
                .fetch_price(symbol)
                .await
                .map_err(|e| fail_stage(Stage::FetchMarketData, e))?;
            Span::current().record("price", snapshot.last_price);
            Ok(snapshot)
        }
        .instrument(span)
        .await
    }

    async fn infer_decision(&self, snapshot: &MarketSnapshot) -> Result<Decision, PipelineError> {
        let span = stage_span(Stage::InferDecision);
        span.record("symbol", snapshot.symbol.as_str());
        span.record("price", snapshot.last_price);
        async {
            let decision = self
                .decisions
                .compute_decision(snapshot)
                .await
                .map_err(|e| fail_stage(Stage::InferDecision, e))?;
            Span::current().record("verdict", decision.verdict.as_str());
            Ok(decision)
        }
        .instrument(span)
        .await
    }
}

/// Span for one pipeline stage with the attributes stages may fill in.
pub(crate) fn stage_span(stage: Stage) -> Span {
    tracing::info_span!(
        "pipeline.stage",
        stage = stage.as_str(),
        symbol = field::Empty,
        price = field::Empty,
        verdict = field::Empty,
        chat_id = field::Empty,
        error.kind = field::Empty,
        otel.status_code = field::Empty,
    )
}

/// Record `source` on the current span and tag it with `stage`.
pub(crate) fn fail_stage(stage: Stage, source: UpstreamError) -> PipelineError {
    let span = Span::current();
    span.record("error.kind", source.kind().as_str());
    span.record("otel.status_code", "ERROR");
    tracing::warn!(stage = stage.as_str(), error = %source, "Pipeline stage failed");
    PipelineError::new(stage, source)
}
