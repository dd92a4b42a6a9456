//! Pipeline Orchestrator
//!
//! Chat-facing run of the advisory chain: acknowledge, evaluate, reply.
//! Converts stage failures into a user-facing notice and one error metric.

use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, Span, field};

use super::advisory::{Advice, AdvisoryService, PipelineError, fail_stage, stage_span};
use crate::application::ports::{ChatTransport, PipelineMetrics, Route, Stage, UpstreamError};
use crate::domain::market::extract_symbol;

/// Acknowledgement sent before the chain starts.
pub const ACK_TEXT: &str = "🔍 Analyzing cryptocurrency market...";

/// Notice sent when any stage after the acknowledgement fails.
pub const FAILURE_TEXT: &str = "❌ Failed to analyze cryptocurrency. Please try again later.";

/// Reply to `/start`.
pub const START_REPLY: &str = "👋 Welcome to the crypto advisor!\n\n\
Send /advice (or \"рекомендации\") followed by a coin name to get a \
buy/sell/hold recommendation. Use /help to see all commands.";

/// Reply to `/help`.
pub const HELP_REPLY: &str = "Available commands:\n\
/start - welcome message\n\
/help - this list\n\
/advice <coin> - trading recommendation (BTC by default)\n\n\
Supported coins: BTC, ETH, ADA, SOL, XRP, DOGE, LTC.";

/// Messages delivered by a successful run (acknowledgement + reply).
const MESSAGES_PER_RUN: u64 = 2;

/// Format the final reply for a successful chain.
#[must_use]
pub fn format_reply(advice: &Advice) -> String {
    let verdict = advice.decision.verdict;
    format!(
        "{} {}\n\nPrice: ${:.2}\nDecision: {}",
        verdict.marker(),
        advice.snapshot.symbol,
        advice.snapshot.last_price,
        verdict.as_str()
    )
}

/// Runs one advisory request end to end for a chat.
pub struct PipelineOrchestrator {
    advisory: AdvisoryService,
    chat: Arc<dyn ChatTransport>,
    metrics: Arc<dyn PipelineMetrics>,
}

impl PipelineOrchestrator {
    /// Create a new orchestrator.
    #[must_use]
    pub fn new(
        advisory: AdvisoryService,
        chat: Arc<dyn ChatTransport>,
        metrics: Arc<dyn PipelineMetrics>,
    ) -> Self {
        Self {
            advisory,
            chat,
            metrics,
        }
    }

    /// Handle one advice request from `chat_id`.
    pub async fn run(&self, chat_id: i64, text: &str) -> Result<(), PipelineError> {
        let span = tracing::info_span!(
            "pipeline.run",
            chat_id,
            symbol = field::Empty,
            price = field::Empty,
            verdict = field::Empty,
            error.stage = field::Empty,
            error.kind = field::Empty,
            otel.status_code = field::Empty,
        );
        self.run_inner(chat_id, text).instrument(span).await
    }

    async fn run_inner(&self, chat_id: i64, text: &str) -> Result<(), PipelineError> {
        let started = Instant::now();
        self.metrics.record_request(Route::Pipeline);

        if let Err(e) = self.send(chat_id, ACK_TEXT, Stage::Acknowledge).await {
            return Err(self.fail(e));
        }

        let symbol = extract_symbol(text);
        Span::current().record("symbol", symbol);

        let advice = match self.advisory.evaluate(symbol).await {
            Ok(advice) => advice,
            Err(e) => {
                self.notify_failure(chat_id).await;
                return Err(self.fail(e));
            }
        };

        let span = Span::current();
        span.record("price", advice.snapshot.last_price);
        span.record("verdict", advice.decision.verdict.as_str());

        let reply = format_reply(&advice);
        if let Err(e) = self.send(chat_id, &reply, Stage::DeliverReply).await {
            return Err(self.fail(e));
        }

        self.metrics.record_duration(Route::Pipeline, started.elapsed());
        self.metrics.record_messages_sent(MESSAGES_PER_RUN);
        tracing::info!(
            chat_id,
            symbol,
            verdict = advice.decision.verdict.as_str(),
            "Advice delivered"
        );
        Ok(())
    }

    async fn send(&self, chat_id: i64, text: &str, stage: Stage) -> Result<(), PipelineError> {
        let span = stage_span(stage);
        span.record("chat_id", chat_id);
        async {
            self.chat
                .send_message(chat_id, text)
                .await
                .map_err(|e| fail_stage(stage, into_delivery(e)))
        }
        .instrument(span)
        .await
    }

    async fn notify_failure(&self, chat_id: i64) {
        if let Err(e) = self.chat.send_message(chat_id, FAILURE_TEXT).await {
            tracing::warn!(chat_id, error = %e, "Failed to send failure notice");
        }
    }

    fn fail(&self, err: PipelineError) -> PipelineError {
        let span = Span::current();
        span.record("error.stage", err.stage.as_str());
        span.record("error.kind", err.kind().as_str());
        span.record("otel.status_code", "ERROR");
        self.metrics
            .record_error(Route::Pipeline, Some(err.stage), err.kind());
        tracing::error!(error = %err, "Pipeline run failed");
        err
    }
}

fn into_delivery(err: UpstreamError) -> UpstreamError {
    match err {
        delivery @ UpstreamError::Delivery(_) => delivery,
        other => UpstreamError::Delivery(other.to_string()),
    }
}
