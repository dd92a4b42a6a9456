//! Telegram Bot API Adapter
//!
//! Implements `ChatTransport` over `sendMessage` and long-poll `getUpdates`.
//! The bot token is part of every URL, so transport errors are stripped of
//! their URL before they are surfaced.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::field;

use crate::application::ports::{ChatTransport, UpstreamError};
use crate::domain::chat::{ChatMessage, ChatUpdate};
use crate::infrastructure::config::TelegramSettings;
use crate::infrastructure::telemetry::TracePropagator;
use crate::infrastructure::upstream::{
    UpstreamResponse, build_client, network_error, record_span_error,
};

/// Slack added to the long-poll wait for the HTTP request timeout.
const POLL_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    chat: RawChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

impl From<RawUpdate> for ChatUpdate {
    fn from(raw: RawUpdate) -> Self {
        let message = raw
            .message
            .and_then(|m| m.text.map(|text| ChatMessage::new(m.chat.id, text)));
        Self {
            update_id: raw.update_id,
            message,
        }
    }
}

/// Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    bot_url: String,
    propagator: TracePropagator,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("bot_url", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Create a new client.
    pub fn new(
        settings: &TelegramSettings,
        timeout: Duration,
        propagator: TracePropagator,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_client(timeout)?,
            bot_url: format!(
                "{}/bot{}",
                settings.api_url.trim_end_matches('/'),
                settings.bot_token.expose()
            ),
            propagator,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.bot_url)
    }

    async fn post_message(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest { chat_id, text })
            .headers(self.propagator.outbound_headers())
            .send()
            .await
            .map_err(network_error)?;

        let response = UpstreamResponse::read(response).await?;
        response.record_remote_context(&self.propagator);
        let response: ApiResponse<serde_json::Value> = response.require_success()?.json()?;
        if !response.ok {
            return Err(UpstreamError::NotSuccess(
                response.description.unwrap_or_default(),
            ));
        }
        Ok(())
    }

    async fn poll_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<ChatUpdate>, UpstreamError> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset), ("timeout", as_secs_i64(timeout))])
            .timeout(timeout + POLL_TIMEOUT_SLACK)
            .send()
            .await
            .map_err(network_error)?;

        let response: ApiResponse<Vec<RawUpdate>> = UpstreamResponse::read(response)
            .await?
            .require_success()?
            .json()?;
        if !response.ok {
            return Err(UpstreamError::NotSuccess(
                response.description.unwrap_or_default(),
            ));
        }
        Ok(response
            .result
            .unwrap_or_default()
            .into_iter()
            .map(ChatUpdate::from)
            .collect())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    #[tracing::instrument(
        name = "telegram.send_message",
        skip(self, text),
        fields(
            text_len = text.len(),
            http.status_code = field::Empty,
            remote.trace_id = field::Empty,
            remote.span_id = field::Empty,
            error.kind = field::Empty,
            otel.status_code = field::Empty,
        )
    )]
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError> {
        self.post_message(chat_id, text)
            .await
            .map_err(|e| match e {
                delivery @ UpstreamError::Delivery(_) => delivery,
                other => UpstreamError::Delivery(other.to_string()),
            })
            .inspect_err(record_span_error)
    }

    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<ChatUpdate>, UpstreamError> {
        let updates = self.poll_updates(offset, timeout).await?;
        if !updates.is_empty() {
            tracing::debug!(offset, count = updates.len(), "Received updates");
        }
        Ok(updates)
    }
}

fn as_secs_i64(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
