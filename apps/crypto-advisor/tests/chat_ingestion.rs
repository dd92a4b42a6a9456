//! Chat Ingestion Integration Tests
//!
//! Drives the ingestion loop against the recording transport and stubbed
//! upstreams.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crypto_advisor::application::ports::{
    ChatTransport, DecisionProvider, LivenessPort, MarketDataPort, PipelineMetrics, Route,
};
use crypto_advisor::application::services::{ACK_TEXT, START_REPLY};
use crypto_advisor::domain::chat::{ChatMessage, ChatUpdate};
use crypto_advisor::domain::decision::Verdict;
use crypto_advisor::infrastructure::metrics::InMemoryMetrics;
use crypto_advisor::infrastructure::mock::{
    RecordingChatTransport, StubDecision, StubLiveness, StubMarketData,
};
use crypto_advisor::{AdvisoryService, IngestionLoop, IngestionSettings, PipelineOrchestrator};

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    chat: Arc<RecordingChatTransport>,
    metrics: Arc<InMemoryMetrics>,
    market: Arc<StubMarketData>,
    ingestion: IngestionLoop,
}

fn harness(settings: IngestionSettings) -> Harness {
    let chat = Arc::new(RecordingChatTransport::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let market = Arc::new(StubMarketData::with_price(43_000.0));

    let liveness: Arc<dyn LivenessPort> = Arc::new(StubLiveness::healthy());
    let market_port: Arc<dyn MarketDataPort> = market.clone();
    let decisions: Arc<dyn DecisionProvider> = Arc::new(StubDecision::new(Verdict::Hold));
    let transport: Arc<dyn ChatTransport> = chat.clone();
    let sink: Arc<dyn PipelineMetrics> = metrics.clone();

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        AdvisoryService::new(liveness, market_port, decisions),
        Arc::clone(&transport),
        Arc::clone(&sink),
    ));
    let ingestion = IngestionLoop::new(transport, orchestrator, sink, settings);

    Harness {
        chat,
        metrics,
        market,
        ingestion,
    }
}

fn update(id: i64, chat_id: i64, text: &str) -> ChatUpdate {
    ChatUpdate {
        update_id: id,
        message: Some(ChatMessage::new(chat_id, text)),
    }
}

#[tokio::test]
async fn next_poll_starts_after_highest_update() {
    let mut h = harness(IngestionSettings::default());
    h.chat.push_updates(vec![
        update(5, 1, "hi"),
        update(6, 1, "/unknown"),
        update(7, 1, "still nothing"),
    ]);
    h.chat.push_updates(vec![]);

    h.ingestion.poll_once().await.unwrap();
    h.ingestion.poll_once().await.unwrap();

    assert_eq!(h.chat.requested_offsets(), vec![0, 8]);
    assert_eq!(h.ingestion.cursor(), Some(7));
}

#[tokio::test]
async fn slow_chat_does_not_block_other_chats() {
    let mut h = harness(IngestionSettings::default());
    h.chat.block_chat(100);
    h.chat
        .push_updates(vec![update(1, 100, "/advice"), update(2, 200, "/advice eth")]);

    h.ingestion.poll_once().await.unwrap();

    tokio::time::timeout(WAIT, h.chat.wait_for_sent(2))
        .await
        .unwrap();
    let fast = h.chat.sent_to(200);
    assert_eq!(fast.len(), 2);
    assert_eq!(fast[0], ACK_TEXT);
    assert!(fast[1].contains("ETH"));
    assert!(h.chat.sent_to(100).is_empty());
    assert_eq!(h.ingestion.next_offset(), 3);

    h.chat.release_chat(100);
    tokio::time::timeout(WAIT, h.chat.wait_for_sent(4))
        .await
        .unwrap();
    assert_eq!(h.chat.sent_to(100).len(), 2);
    assert_eq!(h.metrics.requests(Route::Pipeline), 2);
}

#[tokio::test]
async fn run_loop_serves_commands_until_cancelled() {
    let h = harness(IngestionSettings {
        poll_timeout: Duration::from_millis(20),
        poll_interval: Duration::from_millis(10),
    });
    h.chat.push_updates(vec![update(10, 7, "/start")]);
    h.chat.push_updates(vec![update(11, 7, "/advice sol")]);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(h.ingestion.run(cancel.clone()));

    tokio::time::timeout(WAIT, h.chat.wait_for_sent(3))
        .await
        .unwrap();
    cancel.cancel();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();

    let sent = h.chat.sent_to(7);
    assert_eq!(sent[0], START_REPLY);
    assert_eq!(sent[1], ACK_TEXT);
    assert!(sent[2].contains("SOL"));
    assert_eq!(h.market.requested(), vec!["SOL".to_string()]);

    let offsets = h.chat.requested_offsets();
    assert_eq!(&offsets[..2], &[0, 11]);
    assert!(offsets[2..].iter().all(|&o| o == 12));
}

#[tokio::test]
async fn cancelled_loop_leaves_in_flight_run_to_finish() {
    let h = harness(IngestionSettings {
        poll_timeout: Duration::from_millis(20),
        poll_interval: Duration::from_millis(10),
    });
    h.chat.block_chat(9);
    h.chat.push_updates(vec![update(1, 9, "/advice")]);

    let chat = Arc::clone(&h.chat);
    let metrics = Arc::clone(&h.metrics);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(h.ingestion.run(cancel.clone()));

    // A second poll means the batch holding the advice request was dispatched.
    tokio::time::timeout(WAIT, async {
        while chat.requested_offsets().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    cancel.cancel();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(chat.sent_to(9).is_empty());

    // Detached runs are not cancelled with the loop.
    chat.release_chat(9);
    tokio::time::timeout(WAIT, chat.wait_for_sent(2))
        .await
        .unwrap();
    let sent = chat.sent_to(9);
    assert_eq!(sent[0], ACK_TEXT);
    assert!(sent[1].contains("BTC"));
    assert_eq!(metrics.messages_sent(), 2);
}
