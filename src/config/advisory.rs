//! Advisory source configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::advisory::{
    ProviderDefaults, PROVIDER_ANTHROPIC, PROVIDER_OLLAMA, PROVIDER_OPENAI,
};
use crate::ports::CircuitBreakerConfig;

/// Defaults for requests whose `advisory_config` leaves fields out.
///
/// Credentials are never configured here; they travel with each request.
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorySettings {
    /// Bound on one advisory call, retries included, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    pub default_provider: Option<String>,

    pub default_model: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,

    /// Consecutive failures before an endpoint's breaker opens
    #[serde(default = "default_failure_threshold")]
    pub breaker_failure_threshold: u32,

    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,
}

impl AdvisorySettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn provider_defaults(&self) -> ProviderDefaults {
        ProviderDefaults {
            provider: self.default_provider.clone(),
            model: self.default_model.clone(),
            openai_base_url: self.openai_base_url.clone(),
            ollama_base_url: self.ollama_base_url.clone(),
            anthropic_base_url: self.anthropic_base_url.clone(),
            request_timeout: self.request_timeout(),
            max_retries: self.max_retries,
            breaker: CircuitBreakerConfig::for_advisory_source(
                self.breaker_failure_threshold,
                Duration::from_secs(self.breaker_cooldown_secs),
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        if let Some(provider) = &self.default_provider {
            let known = [PROVIDER_OPENAI, PROVIDER_OLLAMA, PROVIDER_ANTHROPIC];
            if !known.contains(&provider.to_ascii_lowercase().as_str()) {
                return Err(ValidationError::UnknownAdvisoryProvider(provider.clone()));
            }
        }
        Ok(())
    }
}

impl Default for AdvisorySettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            default_provider: None,
            default_model: None,
            openai_base_url: default_openai_base_url(),
            ollama_base_url: default_ollama_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            breaker_failure_threshold: default_failure_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    1
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_breaker_cooldown() -> u64 {
    60
}
