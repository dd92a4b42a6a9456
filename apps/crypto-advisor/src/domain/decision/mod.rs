//! Trading Verdicts
//!
//! A verdict is one of exactly three canonical lowercase tokens. Anything
//! else coming out of a decision backend is rejected, never coerced.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Three-way trading verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Enter or add to a position.
    Buy,
    /// Exit or reduce a position.
    Sell,
    /// Do nothing.
    Hold,
}

impl Verdict {
    /// All verdicts, in band evaluation order.
    pub const ALL: [Self; 3] = [Self::Buy, Self::Sell, Self::Hold];

    /// Canonical lowercase token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Hold => "hold",
        }
    }

    /// Directional marker shown to chat users.
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Buy => "🟢 BUY",
            Self::Sell => "🔴 SELL",
            Self::Hold => "🟡 HOLD",
        }
    }

    /// Normalize free-form backend output and parse it.
    ///
    /// Trims whitespace, lowercases and strips trailing `.,!?` before the
    /// exact match.
    pub fn normalize(raw: &str) -> Result<Self, InvalidVerdict> {
        raw.trim()
            .to_lowercase()
            .trim_end_matches(['.', ',', '!', '?'])
            .parse()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = InvalidVerdict;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            "hold" => Ok(Self::Hold),
            other => Err(InvalidVerdict(other.to_string())),
        }
    }
}

/// Token that is not one of `buy`, `sell`, `hold`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decision token: {0:?}")]
pub struct InvalidVerdict(pub String);

/// Outcome of a decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// The verdict.
    #[serde(rename = "decision")]
    pub verdict: Verdict,
}

impl Decision {
    /// Wrap a verdict.
    #[must_use]
    pub const fn new(verdict: Verdict) -> Self {
        Self { verdict }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("buy", Verdict::Buy)]
    #[test_case("  Sell.  ", Verdict::Sell)]
    #[test_case("HOLD!", Verdict::Hold)]
    #[test_case("buy?!", Verdict::Buy)]
    #[test_case("\nhold,\n", Verdict::Hold)]
    fn normalizes_backend_output(raw: &str, expected: Verdict) {
        assert_eq!(Verdict::normalize(raw).unwrap(), expected);
    }

    #[test_case("strong buy")]
    #[test_case("buy and hold")]
    #[test_case("покупать")]
    #[test_case("")]
    fn rejects_non_canonical_tokens(raw: &str) {
        assert!(Verdict::normalize(raw).is_err());
    }

    #[test]
    fn exact_parse_is_case_sensitive() {
        assert!("Buy".parse::<Verdict>().is_err());
        assert_eq!("buy".parse::<Verdict>().unwrap(), Verdict::Buy);
    }

    #[test]
    fn decision_serializes_as_decision_field() {
        let json = serde_json::to_string(&Decision::new(Verdict::Hold)).unwrap();
        assert_eq!(json, r#"{"decision":"hold"}"#);
    }

    #[test]
    fn marker_embeds_direction() {
        for verdict in Verdict::ALL {
            assert!(
                verdict
                    .marker()
                    .to_lowercase()
                    .contains(verdict.as_str())
            );
        }
    }

    proptest! {
        #[test]
        fn normalize_only_yields_canonical_verdicts(raw in ".{0,24}") {
            if let Ok(verdict) = Verdict::normalize(&raw) {
                prop_assert!(Verdict::ALL.contains(&verdict));
                let cleaned = raw.trim().to_lowercase();
                let cleaned = cleaned.trim_end_matches(['.', ',', '!', '?']);
                prop_assert_eq!(cleaned, verdict.as_str());
            }
        }

        #[test]
        fn arbitrary_words_are_rejected(word in "[a-z]{1,12}") {
            prop_assume!(!["buy", "sell", "hold"].contains(&word.as_str()));
            prop_assert!(Verdict::normalize(&word).is_err());
        }
    }
}
