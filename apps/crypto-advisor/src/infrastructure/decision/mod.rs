//! Decision Engines
//!
//! Two interchangeable strategies behind `DecisionProvider`, selected once at
//! startup:
//!
//! - [`RuleBasedEngine`]: stochastic threshold bands
//! - [`InferenceClient`]: remote chat-completions call

mod inference;
mod rule_based;

pub use inference::{InferenceClient, build_prompt};
pub use rule_based::{
    AcceptanceRoll, Rule, RuleBasedEngine, RuleThresholds, SeededRoll, evaluate,
};

use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{DecisionProvider, UpstreamError};
use crate::domain::decision::Decision;
use crate::domain::market::MarketSnapshot;
use crate::infrastructure::config::{DecisionSettings, DecisionStrategy};
use crate::infrastructure::telemetry::TracePropagator;

/// The configured decision strategy.
#[derive(Debug)]
pub enum DecisionEngine {
    /// Threshold rules.
    RuleBased(RuleBasedEngine),
    /// Remote inference.
    InferenceBacked(InferenceClient),
}

impl DecisionEngine {
    /// Build the engine named by `settings.strategy`.
    pub fn from_settings(
        settings: &DecisionSettings,
        timeout: Duration,
        propagator: TracePropagator,
    ) -> Result<Self, UpstreamError> {
        Ok(match settings.strategy {
            DecisionStrategy::Rules => Self::RuleBased(RuleBasedEngine::default()),
            DecisionStrategy::Inference => {
                Self::InferenceBacked(InferenceClient::new(settings, timeout, propagator)?)
            }
        })
    }

    /// Strategy this engine implements.
    #[must_use]
    pub const fn strategy(&self) -> DecisionStrategy {
        match self {
            Self::RuleBased(_) => DecisionStrategy::Rules,
            Self::InferenceBacked(_) => DecisionStrategy::Inference,
        }
    }
}

#[async_trait]
impl DecisionProvider for DecisionEngine {
    async fn compute_decision(&self, snapshot: &MarketSnapshot) -> Result<Decision, UpstreamError> {
        match self {
            Self::RuleBased(engine) => engine.compute_decision(snapshot).await,
            Self::InferenceBacked(client) => client.compute_decision(snapshot).await,
        }
    }
}
