//! Chat-completions backed decisions.
//!
//! Sends the snapshot as a prompt to an OpenAI-compatible
//! `POST <base>/chat/completions` and accepts only a single-word
//! buy/sell/hold answer.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::field;

use crate::application::ports::{DecisionProvider, UpstreamError};
use crate::domain::decision::{Decision, Verdict};
use crate::domain::market::MarketSnapshot;
use crate::infrastructure::config::{DecisionSettings, Secret};
use crate::infrastructure::telemetry::TracePropagator;
use crate::infrastructure::upstream::{
    UpstreamResponse, build_client, network_error, record_span_error,
};

const SYSTEM_PROMPT: &str = "You are a professional trading analyst. Analyze the given market \
data and provide ONLY a single word decision: 'buy', 'sell', or 'hold'. Do not provide any \
explanations or additional text.";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [PromptMessage<'a>; 2],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct PromptMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// User prompt for a snapshot.
#[must_use]
pub fn build_prompt(snapshot: &MarketSnapshot) -> String {
    format!(
        "Analyze this market data and provide a trading decision:\n\n\
         Current Price: ${:.2}\n\
         Volume: {:.2}\n\
         Timestamp: {}\n\n\
         Based on this data, should I buy, sell, or hold? \
         Respond with only one word: buy, sell, or hold.",
        snapshot.last_price,
        snapshot.volume,
        snapshot.as_of.to_rfc3339(),
    )
}

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    completions_url: String,
    api_key: Secret,
    model: String,
    propagator: TracePropagator,
}

impl InferenceClient {
    /// Create a new inference client.
    pub fn new(
        settings: &DecisionSettings,
        timeout: Duration,
        propagator: TracePropagator,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_client(timeout)?,
            completions_url: format!(
                "{}/chat/completions",
                settings.inference_api_url.trim_end_matches('/')
            ),
            api_key: settings.inference_api_key.clone(),
            model: settings.inference_model.clone(),
            propagator,
        })
    }

    async fn request_verdict(&self, snapshot: &MarketSnapshot) -> Result<Verdict, UpstreamError> {
        let prompt = build_prompt(snapshot);
        let body = CompletionRequest {
            model: &self.model,
            messages: [
                PromptMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                PromptMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            stream: false,
        };

        let mut request = self
            .client
            .post(&self.completions_url)
            .json(&body)
            .headers(self.propagator.outbound_headers());
        if !self.api_key.is_empty() {
            request = request.bearer_auth(self.api_key.expose());
        }

        let response = request.send().await.map_err(network_error)?;
        let response = UpstreamResponse::read(response).await?;
        response.record_remote_context(&self.propagator);
        let response: CompletionResponse = response.require_success()?.json()?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::EmptyResult("no choices in response".to_string()))?;
        let content = choice.message.content.unwrap_or_default();

        Verdict::normalize(&content).map_err(|e| UpstreamError::InvalidDecision(e.0))
    }
}

#[async_trait]
impl DecisionProvider for InferenceClient {
    #[tracing::instrument(
        name = "decision.inference",
        skip_all,
        fields(
            model = %self.model,
            price = snapshot.last_price,
            http.status_code = field::Empty,
            remote.trace_id = field::Empty,
            remote.span_id = field::Empty,
            verdict = field::Empty,
            error.kind = field::Empty,
            otel.status_code = field::Empty,
        )
    )]
    async fn compute_decision(&self, snapshot: &MarketSnapshot) -> Result<Decision, UpstreamError> {
        let verdict = self
            .request_verdict(snapshot)
            .await
            .inspect_err(record_span_error)?;
        tracing::Span::current().record("verdict", verdict.as_str());
        Ok(Decision::new(verdict))
    }
}
