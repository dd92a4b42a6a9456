//! Chat Ingestion Loop
//!
//! Long-polls the chat transport, advances the update cursor and routes each
//! message by intent. Advice requests run detached so one slow pipeline never
//! blocks the next poll.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::pipeline::{HELP_REPLY, PipelineOrchestrator, START_REPLY};
use crate::application::ports::{ChatTransport, PipelineMetrics, Route, UpstreamError};
use crate::domain::chat::{ChatMessage, ChatUpdate, Intent};

/// Polling parameters.
#[derive(Debug, Clone, Copy)]
pub struct IngestionSettings {
    /// Long-poll wait passed to the transport.
    pub poll_timeout: Duration,
    /// Pause after a failed poll.
    pub poll_interval: Duration,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(2000),
        }
    }
}

/// Spawn a task that is neither awaited nor cancelled on shutdown.
///
/// Advice runs are fire-and-forget: the caller keeps polling while the run
/// proceeds, and an in-flight run is allowed to finish after cancellation.
pub fn spawn_detached<F>(future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future)
}

/// Owns the update cursor and dispatches messages.
pub struct IngestionLoop {
    chat: Arc<dyn ChatTransport>,
    orchestrator: Arc<PipelineOrchestrator>,
    metrics: Arc<dyn PipelineMetrics>,
    settings: IngestionSettings,
    cursor: Option<i64>,
}

impl IngestionLoop {
    /// Create a loop that has not seen any update yet.
    #[must_use]
    pub fn new(
        chat: Arc<dyn ChatTransport>,
        orchestrator: Arc<PipelineOrchestrator>,
        metrics: Arc<dyn PipelineMetrics>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            chat,
            orchestrator,
            metrics,
            settings,
            cursor: None,
        }
    }

    /// Highest update id processed so far.
    #[must_use]
    pub const fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    /// Offset for the next poll: one past the cursor, or 0 before any update.
    #[must_use]
    pub fn next_offset(&self) -> i64 {
        self.cursor.map_or(0, |c| c + 1)
    }

    /// Poll until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            poll_timeout_secs = self.settings.poll_timeout.as_secs(),
            "Chat ingestion started"
        );

        while !cancel.is_cancelled() {
            let offset = self.next_offset();
            let batch = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.chat.get_updates(offset, self.settings.poll_timeout) => result,
            };

            match batch {
                Ok(updates) => self.process_batch(updates).await,
                Err(e) => {
                    tracing::warn!(offset, error = %e, "Polling for updates failed");
                    self.metrics.record_poll_failure();
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!(cursor = ?self.cursor, "Chat ingestion stopped");
    }

    /// Fetch and process a single batch; returns the number of updates.
    pub async fn poll_once(&mut self) -> Result<usize, UpstreamError> {
        let updates = self
            .chat
            .get_updates(self.next_offset(), self.settings.poll_timeout)
            .await?;
        let count = updates.len();
        self.process_batch(updates).await;
        Ok(count)
    }

    async fn process_batch(&mut self, updates: Vec<ChatUpdate>) {
        for update in updates {
            self.cursor = Some(self.cursor.map_or(update.update_id, |c| c.max(update.update_id)));
            match update.message {
                Some(message) => self.handle(update.update_id, message).await,
                None => {
                    tracing::debug!(update_id = update.update_id, "Skipping non-message update");
                }
            }
        }
    }

    async fn handle(&self, update_id: i64, message: ChatMessage) {
        let intent = Intent::classify(&message);
        let span = tracing::info_span!(
            "ingestion.update",
            update_id,
            chat_id = message.chat_id,
            intent = ?intent,
        );

        match intent {
            Intent::Start => {
                self.reply_inline(Route::Start, &message, START_REPLY)
                    .instrument(span)
                    .await;
            }
            Intent::Help => {
                self.reply_inline(Route::Help, &message, HELP_REPLY)
                    .instrument(span)
                    .await;
            }
            Intent::Advice => {
                drop(self.dispatch_advice(message, span));
            }
            Intent::Ignore => {
                let _entered = span.enter();
                tracing::debug!("Ignoring message without a known command");
            }
        }
    }

    async fn reply_inline(&self, route: Route, message: &ChatMessage, text: &str) {
        self.metrics.record_request(route);
        match self.chat.send_message(message.chat_id, text).await {
            Ok(()) => self.metrics.record_messages_sent(1),
            Err(e) => {
                self.metrics.record_error(route, None, e.kind());
                tracing::warn!(route = route.as_str(), error = %e, "Failed to send reply");
            }
        }
    }

    fn dispatch_advice(&self, message: ChatMessage, span: tracing::Span) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        spawn_detached(
            async move {
                // Failures are already reported to the user and counted.
                let _ = orchestrator.run(message.chat_id, &message.text).await;
            }
            .instrument(span),
        )
    }
}
