//! Exchange Price Adapter
//!
//! Implements `MarketDataPort` against a `getData`-style crypto price API:
//! `GET <base>?symbol=<SYM>` with bearer auth, answering
//! `{status, symbols: [{symbol, last, date, ...}]}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::field;

use crate::application::ports::{MarketDataPort, UpstreamError};
use crate::domain::market::{MarketSnapshot, parse_timestamp};
use crate::infrastructure::config::{ExchangeSettings, Secret};
use crate::infrastructure::telemetry::TracePropagator;
use crate::infrastructure::upstream::{
    UpstreamResponse, build_client, network_error, record_span_error,
};

/// Status marker of a successful exchange response.
const SUCCESS_STATUS: &str = "success";

/// Raw exchange payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeResponse {
    /// `"success"` on success.
    pub status: String,
    /// One entry per requested symbol.
    #[serde(default)]
    pub symbols: Vec<SymbolData>,
}

/// Price data for one symbol. Numeric fields arrive as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolData {
    /// Ticker.
    #[serde(default)]
    pub symbol: String,
    /// Last traded price.
    #[serde(default)]
    pub last: String,
    /// Last price in BTC.
    #[serde(default)]
    pub last_btc: String,
    /// Daily low.
    #[serde(default)]
    pub lowest: String,
    /// Daily high.
    #[serde(default)]
    pub highest: String,
    /// Quote time.
    #[serde(default)]
    pub date: String,
    /// Daily change in percent.
    #[serde(default)]
    pub daily_change_percentage: String,
    /// Exchange the quote came from.
    #[serde(default)]
    pub source_exchange: String,
}

/// Client for the exchange price API.
#[derive(Debug, Clone)]
pub struct ExchangeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Secret,
    propagator: TracePropagator,
}

impl ExchangeClient {
    /// Create a new exchange client.
    pub fn new(
        settings: &ExchangeSettings,
        timeout: Duration,
        propagator: TracePropagator,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: settings.api_url.clone(),
            api_key: settings.api_key.clone(),
            propagator,
        })
    }

    /// Fetch and validate the raw payload for `symbol`.
    #[tracing::instrument(
        name = "exchange.fetch_quote",
        skip(self),
        fields(
            http.status_code = field::Empty,
            remote.trace_id = field::Empty,
            remote.span_id = field::Empty,
            error.kind = field::Empty,
            otel.status_code = field::Empty,
        )
    )]
    pub async fn fetch_quote(&self, symbol: &str) -> Result<ExchangeResponse, UpstreamError> {
        self.request_quote(symbol).await.inspect_err(record_span_error)
    }

    async fn request_quote(&self, symbol: &str) -> Result<ExchangeResponse, UpstreamError> {
        if symbol.trim().is_empty() {
            return Err(UpstreamError::Validation("symbol is required".to_string()));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("symbol", symbol)])
            .header(reqwest::header::ACCEPT, "*/*")
            .bearer_auth(self.api_key.expose())
            .headers(self.propagator.outbound_headers())
            .send()
            .await
            .map_err(network_error)?;

        let response = UpstreamResponse::read(response).await?;
        response.record_remote_context(&self.propagator);

        let payload: ExchangeResponse = response.require_success()?.json()?;
        if payload.status != SUCCESS_STATUS {
            return Err(UpstreamError::NotSuccess(payload.status));
        }
        if payload.symbols.is_empty() {
            return Err(UpstreamError::EmptyResult("no symbols in response".to_string()));
        }
        Ok(payload)
    }
}

#[async_trait]
impl MarketDataPort for ExchangeClient {
    async fn fetch_price(&self, symbol: &str) -> Result<MarketSnapshot, UpstreamError> {
        let payload = self.fetch_quote(symbol).await?;
        snapshot_from(symbol, &payload)
    }
}

/// Build a snapshot from the first symbol entry.
///
/// The API reports no volume, so the snapshot carries `0.0`.
fn snapshot_from(
    symbol: &str,
    payload: &ExchangeResponse,
) -> Result<MarketSnapshot, UpstreamError> {
    let data = payload
        .symbols
        .first()
        .ok_or_else(|| UpstreamError::EmptyResult("no symbols in response".to_string()))?;

    MarketSnapshot::from_last(symbol, &data.last, parse_timestamp(&data.date)).ok_or_else(|| {
        UpstreamError::InvalidBody(format!("last price {:?} is not a number", data.last))
    })
}
