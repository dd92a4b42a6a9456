//! Configuration Module
//!
//! Environment-sourced configuration for the advisor service.

mod settings;

pub use settings::{
    AdvisorConfig, ConfigError, DecisionSettings, DecisionStrategy, ExchangeSettings, Secret,
    ServiceSettings, TelegramSettings,
};
