//! Advisor Configuration Settings
//!
//! Configuration types for the advisor, loaded from environment variables.

use std::fmt;
use std::time::Duration;

/// A credential whose value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a credential.
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// The raw value, for building request headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the value is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Which decision engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionStrategy {
    /// Stochastic threshold rules.
    #[default]
    Rules,
    /// Remote chat-completions call.
    Inference,
}

impl DecisionStrategy {
    /// Parse strategy name; `None` when unknown.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "rules" | "rule" | "rule_based" => Some(Self::Rules),
            "inference" | "llm" => Some(Self::Inference),
            _ => None,
        }
    }

    /// Strategy name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Inference => "inference",
        }
    }
}

/// Chat transport settings.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    /// Bot token.
    pub bot_token: Secret,
    /// Bot API base URL.
    pub api_url: String,
    /// Long-poll wait per `getUpdates` call.
    pub poll_timeout: Duration,
    /// Pause after a failed poll.
    pub poll_interval: Duration,
}

/// Exchange settings.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// Bearer token.
    pub api_key: Secret,
    /// Full `getData` endpoint URL.
    pub api_url: String,
}

/// Decision engine settings.
#[derive(Debug, Clone)]
pub struct DecisionSettings {
    /// Selected engine.
    pub strategy: DecisionStrategy,
    /// Chat-completions base URL.
    pub inference_api_url: String,
    /// Optional bearer token; empty sends no auth header.
    pub inference_api_key: Secret,
    /// Model name.
    pub inference_model: String,
}

/// Service-level settings.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Base URL probed by the liveness check.
    pub liveness_url: String,
    /// Port for the HTTP surface.
    pub port: u16,
    /// Timeout for upstream HTTP calls.
    pub http_timeout: Duration,
    /// Whether to run the chat ingestion loop.
    pub ingestion_enabled: bool,
}

/// Complete advisor configuration.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    /// Chat transport.
    pub telegram: TelegramSettings,
    /// Price exchange.
    pub exchange: ExchangeSettings,
    /// Decision engine.
    pub decision: DecisionSettings,
    /// Service settings.
    pub service: ServiceSettings,
}

const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_EXCHANGE_API_URL: &str = "https://api.freecryptoapi.com/v1/getData";
const DEFAULT_INFERENCE_API_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_INFERENCE_MODEL: &str = "llama3-8b-8192";
const DEFAULT_LIVENESS_URL: &str = "http://localhost:8080";
const DEFAULT_SERVICE_PORT: u16 = 8080;

impl AdvisorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty, or the
    /// decision strategy is unknown.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let telegram = TelegramSettings {
            bot_token: env.required("TELEGRAM_BOT_TOKEN")?,
            api_url: env.string_or("TELEGRAM_API_URL", DEFAULT_TELEGRAM_API_URL),
            poll_timeout: env.duration_secs("TELEGRAM_POLL_TIMEOUT_SECS", Duration::from_secs(30)),
            poll_interval: env
                .duration_millis("TELEGRAM_POLL_INTERVAL_MS", Duration::from_millis(2000)),
        };

        let exchange = ExchangeSettings {
            api_key: env.required("EXCHANGE_API_KEY")?,
            api_url: env.string_or("EXCHANGE_API_URL", DEFAULT_EXCHANGE_API_URL),
        };

        let strategy = match lookup("DECISION_STRATEGY") {
            Some(raw) => DecisionStrategy::from_str_case_insensitive(&raw).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "DECISION_STRATEGY".to_string(),
                    value: raw,
                }
            })?,
            None => DecisionStrategy::default(),
        };

        let decision = DecisionSettings {
            strategy,
            inference_api_url: env.string_or("INFERENCE_API_URL", DEFAULT_INFERENCE_API_URL),
            inference_api_key: Secret::new(lookup("INFERENCE_API_KEY").unwrap_or_default()),
            inference_model: env.string_or("INFERENCE_MODEL", DEFAULT_INFERENCE_MODEL),
        };

        let service = ServiceSettings {
            liveness_url: env.string_or("LIVENESS_URL", DEFAULT_LIVENESS_URL),
            port: env.parsed("SERVICE_PORT", DEFAULT_SERVICE_PORT),
            http_timeout: env.duration_secs("HTTP_TIMEOUT_SECS", Duration::from_secs(10)),
            ingestion_enabled: env.flag("INGESTION_ENABLED", true),
        };

        Ok(Self {
            telegram,
            exchange,
            decision,
            service,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value that cannot be used.
    #[error("invalid value {value:?} for environment variable {key}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn required(&self, key: &str) -> Result<Secret, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(Secret::new(value))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        (self.0)(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        (self.0)(key).map_or(default, |v| {
            !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("EXCHANGE_API_KEY", "exchange-key"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = AdvisorConfig::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.telegram.api_url, DEFAULT_TELEGRAM_API_URL);
        assert_eq!(config.telegram.poll_timeout, Duration::from_secs(30));
        assert_eq!(config.telegram.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.exchange.api_url, DEFAULT_EXCHANGE_API_URL);
        assert_eq!(config.decision.strategy, DecisionStrategy::Rules);
        assert!(config.decision.inference_api_key.is_empty());
        assert_eq!(config.decision.inference_model, DEFAULT_INFERENCE_MODEL);
        assert_eq!(config.service.liveness_url, DEFAULT_LIVENESS_URL);
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.service.http_timeout, Duration::from_secs(10));
        assert!(config.service.ingestion_enabled);
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = AdvisorConfig::from_lookup(lookup(&[("EXCHANGE_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn blank_exchange_key_is_an_error() {
        let err = AdvisorConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("EXCHANGE_API_KEY", "  "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "EXCHANGE_API_KEY"));
    }

    #[test]
    fn overrides_are_read() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("DECISION_STRATEGY", "Inference"),
            ("INFERENCE_API_KEY", "gsk_secret"),
            ("SERVICE_PORT", "9000"),
            ("TELEGRAM_POLL_TIMEOUT_SECS", "5"),
            ("TELEGRAM_POLL_INTERVAL_MS", "250"),
            ("INGESTION_ENABLED", "false"),
        ]);
        let config = AdvisorConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.decision.strategy, DecisionStrategy::Inference);
        assert_eq!(config.decision.inference_api_key.expose(), "gsk_secret");
        assert_eq!(config.service.port, 9000);
        assert_eq!(config.telegram.poll_timeout, Duration::from_secs(5));
        assert_eq!(config.telegram.poll_interval, Duration::from_millis(250));
        assert!(!config.service.ingestion_enabled);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DECISION_STRATEGY", "coinflip"));
        let err = AdvisorConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "DECISION_STRATEGY"));
    }

    #[test]
    fn unparseable_numbers_fall_back_to_defaults() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SERVICE_PORT", "eighty"));
        let config = AdvisorConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.service.port, DEFAULT_SERVICE_PORT);
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let config = AdvisorConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("123:abc"));
        assert!(!debug.contains("exchange-key"));
        assert!(debug.contains("[REDACTED]"));
    }
}
