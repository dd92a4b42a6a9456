//! Market Snapshot Types
//!
//! A snapshot is the single priced observation a pipeline run decides on.
//! It is built per run from the exchange response and discarded afterwards.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

// =============================================================================
// Symbols
// =============================================================================

/// Symbol used when a message names no known asset.
pub const DEFAULT_SYMBOL: &str = "BTC";

/// Keyword table for symbol extraction, scanned in order.
///
/// Full names precede tickers so that the first hit is the most specific.
const SYMBOL_KEYWORDS: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("btc", "BTC"),
    ("ethereum", "ETH"),
    ("eth", "ETH"),
    ("cardano", "ADA"),
    ("ada", "ADA"),
    ("solana", "SOL"),
    ("sol", "SOL"),
    ("ripple", "XRP"),
    ("xrp", "XRP"),
    ("dogecoin", "DOGE"),
    ("doge", "DOGE"),
    ("litecoin", "LTC"),
    ("ltc", "LTC"),
];

/// Extract a trading symbol from free text.
///
/// Matching is a case-insensitive substring search over a fixed keyword
/// table. Text that names no known asset resolves to [`DEFAULT_SYMBOL`].
#[must_use]
pub fn extract_symbol(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    SYMBOL_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map_or(DEFAULT_SYMBOL, |(_, symbol)| symbol)
}

// =============================================================================
// Snapshot
// =============================================================================

/// Latest priced observation for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    /// Asset symbol (e.g. "BTC").
    pub symbol: String,
    /// Last traded price, always finite.
    pub last_price: f64,
    /// Traded volume; `0.0` when the source does not report one.
    pub volume: f64,
    /// Observation time.
    pub as_of: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Build a snapshot from the textual price reported by an exchange.
    ///
    /// Returns `None` when the price is not a finite number, so callers never
    /// hold a partially-populated snapshot.
    #[must_use]
    pub fn from_last(symbol: impl Into<String>, last: &str, as_of: DateTime<Utc>) -> Option<Self> {
        let last_price = last.trim().parse::<f64>().ok().filter(|p| p.is_finite())?;
        Some(Self {
            symbol: symbol.into(),
            last_price,
            volume: 0.0,
            as_of,
        })
    }

    /// Set the traded volume.
    #[must_use]
    pub const fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }
}

/// Parse an exchange timestamp, falling back to the current time.
///
/// Accepts RFC 3339 as well as the naive `YYYY-MM-DDTHH:MM:SSZ` and
/// `YYYY-MM-DD HH:MM:SS` forms some exchanges emit.
#[must_use]
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }

    ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map_or_else(Utc::now, |naive| naive.and_utc())
}

// =============================================================================
// Tests
// =============================================================================
