//! Stochastic threshold rules.
//!
//! Bands are tried in order (buy, sell, hold). A band that matches still has
//! to pass an acceptance roll; a rejected roll falls through to the next
//! band, and when nothing is accepted the verdict is picked uniformly.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::field;

use crate::application::ports::{DecisionProvider, UpstreamError};
use crate::domain::decision::{Decision, Verdict};
use crate::domain::market::MarketSnapshot;

/// Source of acceptance rolls.
pub trait AcceptanceRoll: Send {
    /// `true` with probability `probability`.
    fn accept(&mut self, probability: f64) -> bool;

    /// Uniform index in `0..n`.
    fn pick(&mut self, n: usize) -> usize;
}

/// Rolls backed by a seeded [`StdRng`].
#[derive(Debug)]
pub struct SeededRoll(StdRng);

impl SeededRoll {
    /// Seed from the operating system.
    #[must_use]
    pub fn from_os_rng() -> Self {
        Self(StdRng::from_os_rng())
    }

    /// Deterministic sequence for a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl AcceptanceRoll for SeededRoll {
    fn accept(&mut self, probability: f64) -> bool {
        self.0.random::<f64>() < probability
    }

    fn pick(&mut self, n: usize) -> usize {
        self.0.random_range(0..n)
    }
}

/// Band boundaries and acceptance probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleThresholds {
    /// Buy band: price strictly above.
    pub buy_min_price: f64,
    /// Buy band: volume strictly above.
    pub buy_min_volume: f64,
    /// Buy acceptance probability.
    pub buy_probability: f64,
    /// Sell band: price strictly below.
    pub sell_max_price: f64,
    /// Sell band: volume strictly below.
    pub sell_max_volume: f64,
    /// Sell acceptance probability.
    pub sell_probability: f64,
    /// Hold band: inclusive lower price bound.
    pub hold_min_price: f64,
    /// Hold band: inclusive upper price bound.
    pub hold_max_price: f64,
    /// Hold acceptance probability.
    pub hold_probability: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            buy_min_price: 45_000.0,
            buy_min_volume: 1_500_000.0,
            buy_probability: 0.7,
            sell_max_price: 35_000.0,
            sell_max_volume: 800_000.0,
            sell_probability: 0.6,
            hold_min_price: 35_000.0,
            hold_max_price: 45_000.0,
            hold_probability: 0.5,
        }
    }
}

/// Which band produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Buy band.
    HighPriceHighVolume,
    /// Sell band.
    LowPriceLowVolume,
    /// Hold band.
    MediumRange,
    /// No band accepted.
    RandomFallback,
}

impl Rule {
    /// Span attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HighPriceHighVolume => "high_price_high_volume",
            Self::LowPriceLowVolume => "low_price_low_volume",
            Self::MediumRange => "medium_range",
            Self::RandomFallback => "random_fallback",
        }
    }
}

/// Walk the bands for `price`/`volume`.
pub fn evaluate(
    price: f64,
    volume: f64,
    thresholds: &RuleThresholds,
    roll: &mut dyn AcceptanceRoll,
) -> (Verdict, Rule) {
    let t = thresholds;
    if price > t.buy_min_price && volume > t.buy_min_volume && roll.accept(t.buy_probability) {
        return (Verdict::Buy, Rule::HighPriceHighVolume);
    }
    if price < t.sell_max_price && volume < t.sell_max_volume && roll.accept(t.sell_probability) {
        return (Verdict::Sell, Rule::LowPriceLowVolume);
    }
    if (t.hold_min_price..=t.hold_max_price).contains(&price) && roll.accept(t.hold_probability) {
        return (Verdict::Hold, Rule::MediumRange);
    }

    let index = roll.pick(Verdict::ALL.len()).min(Verdict::ALL.len() - 1);
    (Verdict::ALL[index], Rule::RandomFallback)
}

/// Rule-based decision engine.
pub struct RuleBasedEngine {
    thresholds: RuleThresholds,
    roll: Mutex<Box<dyn AcceptanceRoll>>,
}

impl std::fmt::Debug for RuleBasedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleBasedEngine")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl Default for RuleBasedEngine {
    fn default() -> Self {
        Self::new(RuleThresholds::default())
    }
}

impl RuleBasedEngine {
    /// Engine with OS-seeded rolls.
    #[must_use]
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self::with_roll(thresholds, Box::new(SeededRoll::from_os_rng()))
    }

    /// Engine with an explicit roll source.
    #[must_use]
    pub fn with_roll(thresholds: RuleThresholds, roll: Box<dyn AcceptanceRoll>) -> Self {
        Self {
            thresholds,
            roll: Mutex::new(roll),
        }
    }

    /// Decide for `snapshot`, returning the matched rule too.
    pub fn decide(&self, snapshot: &MarketSnapshot) -> (Verdict, Rule) {
        let mut roll = self.roll.lock();
        evaluate(
            snapshot.last_price,
            snapshot.volume,
            &self.thresholds,
            roll.as_mut(),
        )
    }
}

#[async_trait]
impl DecisionProvider for RuleBasedEngine {
    #[tracing::instrument(
        name = "decision.rules",
        skip_all,
        fields(
            price = snapshot.last_price,
            volume = snapshot.volume,
            rule = field::Empty,
            verdict = field::Empty,
        )
    )]
    async fn compute_decision(&self, snapshot: &MarketSnapshot) -> Result<Decision, UpstreamError> {
        let (verdict, rule) = self.decide(snapshot);
        let span = tracing::Span::current();
        span.record("rule", rule.as_str());
        span.record("verdict", verdict.as_str());
        tracing::debug!(rule = rule.as_str(), verdict = verdict.as_str(), "Rule matched");
        Ok(Decision::new(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use test_case::test_case;

    /// Answers rolls from a script and records the probabilities asked.
    #[derive(Default)]
    struct Script {
        answers: VecDeque<bool>,
        asked: Vec<f64>,
        pick: usize,
    }

    impl Script {
        fn new(answers: &[bool], pick: usize) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                asked: Vec::new(),
                pick,
            }
        }
    }

    impl AcceptanceRoll for Script {
        fn accept(&mut self, probability: f64) -> bool {
            self.asked.push(probability);
            self.answers.pop_front().unwrap_or(false)
        }

        fn pick(&mut self, _n: usize) -> usize {
            self.pick
        }
    }

    struct Always(bool);

    impl AcceptanceRoll for Always {
        fn accept(&mut self, _probability: f64) -> bool {
            self.0
        }

        fn pick(&mut self, n: usize) -> usize {
            n - 1
        }
    }

    fn decide(price: f64, volume: f64, roll: &mut dyn AcceptanceRoll) -> (Verdict, Rule) {
        evaluate(price, volume, &RuleThresholds::default(), roll)
    }

    #[test_case(50_000.0, 2_000_000.0, Verdict::Buy, Rule::HighPriceHighVolume)]
    #[test_case(30_000.0, 100_000.0, Verdict::Sell, Rule::LowPriceLowVolume)]
    #[test_case(43_000.0, 0.0, Verdict::Hold, Rule::MediumRange)]
    #[test_case(35_000.0, 0.0, Verdict::Hold, Rule::MediumRange; "hold lower bound inclusive")]
    #[test_case(45_000.0, 9_000_000.0, Verdict::Hold, Rule::MediumRange; "buy needs strictly above")]
    fn accepted_band_wins(price: f64, volume: f64, verdict: Verdict, rule: Rule) {
        assert_eq!(decide(price, volume, &mut Always(true)), (verdict, rule));
    }

    #[test]
    fn rejected_buy_falls_through_to_fallback() {
        let mut script = Script::new(&[false], 1);
        let outcome = decide(50_000.0, 2_000_000.0, &mut script);

        assert_eq!(outcome, (Verdict::Sell, Rule::RandomFallback));
        assert_eq!(script.asked, vec![0.7]);
    }

    #[test]
    fn rejected_sell_falls_through_to_hold_band_check() {
        // Price 30000 is outside the hold band, so only the sell roll is asked.
        let mut script = Script::new(&[false], 2);
        let outcome = decide(30_000.0, 100_000.0, &mut script);

        assert_eq!(outcome, (Verdict::Hold, Rule::RandomFallback));
        assert_eq!(script.asked, vec![0.6]);
    }

    #[test]
    fn rejected_hold_goes_to_fallback() {
        let mut script = Script::new(&[false], 0);
        let outcome = decide(40_000.0, 0.0, &mut script);

        assert_eq!(outcome, (Verdict::Buy, Rule::RandomFallback));
        assert_eq!(script.asked, vec![0.5]);
    }

    #[test]
    fn out_of_range_pick_is_clamped() {
        let mut script = Script::new(&[], 99);
        assert_eq!(decide(1.0, 1e9, &mut script).0, Verdict::Hold);
    }

    #[test]
    fn rule_names() {
        assert_eq!(Rule::HighPriceHighVolume.as_str(), "high_price_high_volume");
        assert_eq!(Rule::LowPriceLowVolume.as_str(), "low_price_low_volume");
        assert_eq!(Rule::MediumRange.as_str(), "medium_range");
        assert_eq!(Rule::RandomFallback.as_str(), "random_fallback");
    }

    #[tokio::test]
    async fn engine_uses_injected_roll() {
        let engine = RuleBasedEngine::with_roll(RuleThresholds::default(), Box::new(Always(true)));
        let snapshot = MarketSnapshot::from_last("BTC", "43000", Utc::now()).unwrap();

        let decision = engine.compute_decision(&snapshot).await.unwrap();
        assert_eq!(decision.verdict, Verdict::Hold);
    }

    #[test]
    fn seeded_rolls_are_reproducible() {
        let mut a = SeededRoll::seeded(42);
        let mut b = SeededRoll::seeded(42);
        let first: Vec<bool> = (0..16).map(|_| a.accept(0.5)).collect();
        let second: Vec<bool> = (0..16).map(|_| b.accept(0.5)).collect();
        assert_eq!(first, second);
        assert!((0..32).all(|_| a.pick(3) < 3));
    }

    proptest! {
        #[test]
        fn verdict_is_always_one_of_three(
            price in 0.0f64..100_000.0,
            volume in 0.0f64..5_000_000.0,
            seed in any::<u64>(),
        ) {
            let mut roll = SeededRoll::seeded(seed);
            let (verdict, _) = decide(price, volume, &mut roll);
            prop_assert!(Verdict::ALL.contains(&verdict));
        }

        #[test]
        fn hold_band_is_hold_when_accepted(price in 35_000.0f64..=45_000.0, volume in 0.0f64..5_000_000.0) {
            prop_assert_eq!(decide(price, volume, &mut Always(true)), (Verdict::Hold, Rule::MediumRange));
        }

        #[test]
        fn all_rejections_reach_fallback(price in 0.0f64..100_000.0, volume in 0.0f64..5_000_000.0) {
            prop_assert_eq!(decide(price, volume, &mut Always(false)).1, Rule::RandomFallback);
        }
    }
}
