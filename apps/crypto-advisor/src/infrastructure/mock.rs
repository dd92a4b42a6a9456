//! In-process adapters for testing.
//!
//! Every port has a scripted stand-in here that records what it was asked
//! to do. They are public so integration tests can wire a full pipeline
//! without a network.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::application::ports::{
    ChatTransport, DecisionProvider, LivenessPort, MarketDataPort, UpstreamError,
};
use crate::domain::chat::ChatUpdate;
use crate::domain::decision::{Decision, Verdict};
use crate::domain::market::MarketSnapshot;
use crate::infrastructure::decision::AcceptanceRoll;

// =============================================================================
// Chat
// =============================================================================

/// Chat transport that serves queued poll results and records sends.
///
/// Polling an empty queue waits out the full long-poll timeout and returns
/// no updates. Failed sends are not recorded.
#[derive(Debug)]
pub struct RecordingChatTransport {
    polls: Mutex<VecDeque<Result<Vec<ChatUpdate>, UpstreamError>>>,
    offsets: Mutex<Vec<i64>>,
    sent: Mutex<Vec<(i64, String)>>,
    failing_chats: Mutex<HashSet<i64>>,
    failing_texts: Mutex<Vec<String>>,
    blocked: watch::Sender<HashSet<i64>>,
}

impl Default for RecordingChatTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingChatTransport {
    /// Create a transport with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self {
            polls: Mutex::new(VecDeque::new()),
            offsets: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            failing_chats: Mutex::new(HashSet::new()),
            failing_texts: Mutex::new(Vec::new()),
            blocked: watch::Sender::new(HashSet::new()),
        }
    }

    /// Queue a batch for the next poll.
    pub fn push_updates(&self, updates: Vec<ChatUpdate>) {
        self.polls.lock().push_back(Ok(updates));
    }

    /// Queue a failure for the next poll.
    pub fn push_error(&self, error: UpstreamError) {
        self.polls.lock().push_back(Err(error));
    }

    /// Offsets passed to each poll, in order.
    #[must_use]
    pub fn requested_offsets(&self) -> Vec<i64> {
        self.offsets.lock().clone()
    }

    /// Every delivered message as `(chat_id, text)`.
    #[must_use]
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().clone()
    }

    /// Texts delivered to one chat.
    #[must_use]
    pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Fail every send to `chat_id`.
    pub fn fail_sends_to(&self, chat_id: i64) {
        self.failing_chats.lock().insert(chat_id);
    }

    /// Fail every send whose text contains `needle`.
    pub fn fail_text_containing(&self, needle: &str) {
        self.failing_texts.lock().push(needle.to_string());
    }

    /// Hold sends to `chat_id` until [`Self::release_chat`].
    pub fn block_chat(&self, chat_id: i64) {
        self.blocked.send_modify(|set| {
            set.insert(chat_id);
        });
    }

    /// Let held sends to `chat_id` through.
    pub fn release_chat(&self, chat_id: i64) {
        self.blocked.send_modify(|set| {
            set.remove(&chat_id);
        });
    }

    /// Wait until at least `count` messages have been delivered.
    pub async fn wait_for_sent(&self, count: usize) {
        while self.sent.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn should_fail(&self, chat_id: i64, text: &str) -> bool {
        self.failing_chats.lock().contains(&chat_id)
            || self
                .failing_texts
                .lock()
                .iter()
                .any(|needle| text.contains(needle.as_str()))
    }
}

#[async_trait]
impl ChatTransport for RecordingChatTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), UpstreamError> {
        let mut gate = self.blocked.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = gate.wait_for(|blocked| !blocked.contains(&chat_id)).await;

        if self.should_fail(chat_id, text) {
            return Err(UpstreamError::Delivery(format!(
                "chat {chat_id} rejected the message"
            )));
        }
        self.sent.lock().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<ChatUpdate>, UpstreamError> {
        self.offsets.lock().push(offset);
        let next = self.polls.lock().pop_front();
        match next {
            Some(result) => result,
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }
}

// =============================================================================
// Upstream stubs
// =============================================================================

/// Liveness probe with a fixed answer.
#[derive(Debug)]
pub struct StubLiveness {
    status: u16,
    calls: AtomicUsize,
}

impl StubLiveness {
    /// Always answers 200.
    #[must_use]
    pub const fn healthy() -> Self {
        Self {
            status: 200,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers `status`.
    #[must_use]
    pub const fn failing(status: u16) -> Self {
        Self {
            status,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of probes so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessPort for StubLiveness {
    async fn check_liveness(&self) -> Result<(), UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.status == 200 {
            Ok(())
        } else {
            Err(UpstreamError::BadStatus {
                status: self.status,
                body: "unavailable".to_string(),
            })
        }
    }
}

/// Market data source quoting one price for every symbol.
#[derive(Debug)]
pub struct StubMarketData {
    price: f64,
    requested: Mutex<Vec<String>>,
}

impl StubMarketData {
    /// Quote `price` for every symbol.
    #[must_use]
    pub fn with_price(price: f64) -> Self {
        Self {
            price,
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Symbols requested so far.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl MarketDataPort for StubMarketData {
    async fn fetch_price(&self, symbol: &str) -> Result<MarketSnapshot, UpstreamError> {
        if symbol.is_empty() {
            return Err(UpstreamError::Validation("symbol is required".to_string()));
        }
        self.requested.lock().push(symbol.to_string());
        MarketSnapshot::from_last(symbol, &self.price.to_string(), Utc::now())
            .ok_or_else(|| UpstreamError::InvalidBody(format!("price {}", self.price)))
    }
}

/// Decision provider with a fixed verdict.
#[derive(Debug)]
pub struct StubDecision {
    verdict: Verdict,
    calls: AtomicUsize,
}

impl StubDecision {
    /// Always answer `verdict`.
    #[must_use]
    pub const fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of decisions so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionProvider for StubDecision {
    async fn compute_decision(
        &self,
        _snapshot: &MarketSnapshot,
    ) -> Result<Decision, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Decision::new(self.verdict))
    }
}

/// Acceptance roll with fixed outcomes.
#[derive(Debug, Clone, Copy)]
pub struct FixedRoll {
    /// Answer to every acceptance check.
    pub accept: bool,
    /// Index returned by every pick, clamped to the range.
    pub pick: usize,
}

impl AcceptanceRoll for FixedRoll {
    fn accept(&mut self, _probability: f64) -> bool {
        self.accept
    }

    fn pick(&mut self, n: usize) -> usize {
        self.pick.min(n.saturating_sub(1))
    }
}
