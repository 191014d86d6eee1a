//! Process-scoped registry of advisory providers.
//!
//! A request's `advisory_config` names a provider, model and credential.
//! The registry resolves it against configured defaults, builds the provider
//! on the shared HTTP client and hands it out as a [`ProviderLease`] guarded
//! by the breaker for that endpoint. Callers return the lease with
//! [`ProviderRegistry::release`] and report whether the endpoint behaved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::Client;

use crate::adapters::ai::{AnthropicConfig, AnthropicProvider, OpenAIConfig, OpenAIProvider};
use crate::adapters::resilience::InMemoryCircuitBreaker;
use crate::domain::intent::AdvisoryConfig;
use crate::ports::{AIProvider, AdvisoryError, CircuitBreaker, CircuitBreakerConfig};

pub const PROVIDER_OPENAI: &str = "openai";
pub const PROVIDER_OLLAMA: &str = "ollama";
pub const PROVIDER_ANTHROPIC: &str = "anthropic";

/// Fallbacks applied when a request leaves fields out.
#[derive(Debug, Clone)]
pub struct ProviderDefaults {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub openai_base_url: String,
    pub ollama_base_url: String,
    pub anthropic_base_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub breaker: CircuitBreakerConfig,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            ollama_base_url: "http://localhost:11434/v1".to_string(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 1,
            breaker: CircuitBreakerConfig::for_advisory_source(3, Duration::from_secs(60)),
        }
    }
}

/// A provider checked out for one advisory call.
pub struct ProviderLease {
    key: String,
    provider: Arc<dyn AIProvider>,
    breaker: Arc<InMemoryCircuitBreaker>,
}

impl ProviderLease {
    /// Breaker key, `provider:base_url`.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn provider(&self) -> &dyn AIProvider {
        self.provider.as_ref()
    }
}

/// Hands out providers and tracks endpoint health.
pub struct ProviderRegistry {
    defaults: ProviderDefaults,
    client: Client,
    breakers: Mutex<HashMap<String, Arc<InMemoryCircuitBreaker>>>,
    pinned: HashMap<String, Arc<dyn AIProvider>>,
}

impl ProviderRegistry {
    pub fn new(defaults: ProviderDefaults) -> Self {
        let client = Client::builder()
            .timeout(defaults.request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            defaults,
            client,
            breakers: Mutex::new(HashMap::new()),
            pinned: HashMap::new(),
        }
    }

    /// Serves a fixed provider instance for `name`, skipping credential checks.
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn AIProvider>) -> Self {
        self.pinned.insert(name.into(), provider);
        self
    }

    pub fn defaults(&self) -> &ProviderDefaults {
        &self.defaults
    }

    /// Resolves the request's advisory config into a usable provider.
    pub fn acquire(&self, config: Option<&AdvisoryConfig>) -> Result<ProviderLease, AdvisoryError> {
        let provider_name = config
            .and_then(|c| c.provider.as_deref())
            .or(self.defaults.provider.as_deref())
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .ok_or(AdvisoryError::NotConfigured)?;

        let base_url = config
            .and_then(|c| c.base_url.as_deref())
            .map(str::trim)
            .filter(|u| !u.is_empty());

        if let Some(provider) = self.pinned.get(&provider_name) {
            let key = format!("{}:{}", provider_name, base_url.unwrap_or("pinned"));
            return self.lease(key, provider.clone());
        }

        let model = config
            .and_then(|c| c.model.as_deref())
            .or(self.defaults.model.as_deref())
            .map(str::trim)
            .filter(|m| !m.is_empty());
        let credential = config
            .and_then(|c| c.credential.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty());

        match provider_name.as_str() {
            PROVIDER_OPENAI => {
                let key = validated_credential(&provider_name, credential)?;
                let base_url = base_url.unwrap_or(&self.defaults.openai_base_url);
                let mut cfg = OpenAIConfig::new(key)
                    .with_base_url(base_url)
                    .with_timeout(self.defaults.request_timeout)
                    .with_max_retries(self.defaults.max_retries);
                if let Some(model) = model {
                    cfg = cfg.with_model(model);
                }
                let provider = Arc::new(OpenAIProvider::with_client(cfg, self.client.clone()));
                self.lease(format!("{}:{}", PROVIDER_OPENAI, base_url), provider)
            }
            PROVIDER_OLLAMA => {
                let base_url = base_url.unwrap_or(&self.defaults.ollama_base_url);
                let mut cfg = OpenAIConfig::ollama(base_url)
                    .with_timeout(self.defaults.request_timeout)
                    .with_max_retries(self.defaults.max_retries);
                if let Some(model) = model {
                    cfg = cfg.with_model(model);
                }
                let provider = Arc::new(OpenAIProvider::with_client(cfg, self.client.clone()));
                self.lease(format!("{}:{}", PROVIDER_OLLAMA, base_url), provider)
            }
            PROVIDER_ANTHROPIC => {
                let key = validated_credential(&provider_name, credential)?;
                let base_url = base_url.unwrap_or(&self.defaults.anthropic_base_url);
                let mut cfg = AnthropicConfig::new(key)
                    .with_base_url(base_url)
                    .with_timeout(self.defaults.request_timeout)
                    .with_max_retries(self.defaults.max_retries);
                if let Some(model) = model {
                    cfg = cfg.with_model(model);
                }
                let provider = Arc::new(AnthropicProvider::with_client(cfg, self.client.clone()));
                self.lease(format!("{}:{}", PROVIDER_ANTHROPIC, base_url), provider)
            }
            other => Err(AdvisoryError::UnsupportedProvider(other.to_string())),
        }
    }

    /// Returns a lease, recording whether the endpoint answered.
    pub fn release(&self, lease: ProviderLease, healthy: bool) {
        if healthy {
            lease.breaker.record_success();
        } else {
            lease.breaker.record_failure();
        }
    }

    /// Breaker for an endpoint key, if one has been created.
    pub fn breaker(&self, key: &str) -> Option<Arc<InMemoryCircuitBreaker>> {
        self.breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn lease(&self, key: String, provider: Arc<dyn AIProvider>) -> Result<ProviderLease, AdvisoryError> {
        let breaker = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(InMemoryCircuitBreaker::new(key.clone(), self.defaults.breaker.clone()))
            })
            .clone();

        if !breaker.should_allow() {
            return Err(AdvisoryError::CircuitOpen(key));
        }
        Ok(ProviderLease {
            key,
            provider,
            breaker,
        })
    }
}

fn validated_credential<'a>(provider: &str, credential: Option<&'a str>) -> Result<&'a str, AdvisoryError> {
    match credential {
        Some(key) if !key.chars().any(char::is_whitespace) => Ok(key),
        _ => Err(AdvisoryError::InvalidCredentials(provider.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockAIProvider;

    fn config(provider: &str, credential: Option<&str>) -> AdvisoryConfig {
        AdvisoryConfig {
            provider: Some(provider.to_string()),
            model: None,
            credential: credential.map(str::to_string),
            base_url: None,
        }
    }

    #[test]
    fn missing_provider_is_not_configured() {
        let registry = ProviderRegistry::new(ProviderDefaults::default());
        assert!(matches!(registry.acquire(None), Err(AdvisoryError::NotConfigured)));
    }

    #[test]
    fn default_provider_applies() {
        let registry = ProviderRegistry::new(ProviderDefaults {
            provider: Some("ollama".into()),
            model: Some("qwen2".into()),
            ..ProviderDefaults::default()
        });
        let lease = registry.acquire(None).unwrap();
        assert_eq!(lease.key(), "ollama:http://localhost:11434/v1");
        assert_eq!(lease.provider().provider_info().model, "qwen2");
    }

    #[test]
    fn unknown_provider_is_unsupported() {
        let registry = ProviderRegistry::new(ProviderDefaults::default());
        let err = registry.acquire(Some(&config("cohere", Some("k")))).err().unwrap();
        assert_eq!(err, AdvisoryError::UnsupportedProvider("cohere".into()));
    }

    #[test]
    fn hosted_providers_require_credentials() {
        let registry = ProviderRegistry::new(ProviderDefaults::default());
        for provider in [PROVIDER_OPENAI, PROVIDER_ANTHROPIC] {
            assert!(matches!(
                registry.acquire(Some(&config(provider, None))),
                Err(AdvisoryError::InvalidCredentials(_))
            ));
            assert!(matches!(
                registry.acquire(Some(&config(provider, Some("sk bad")))),
                Err(AdvisoryError::InvalidCredentials(_))
            ));
        }
        assert!(registry.acquire(Some(&config("Anthropic", Some("sk-ant")))).is_ok());
    }

    #[test]
    fn breaker_opens_per_endpoint() {
        let registry = ProviderRegistry::new(ProviderDefaults {
            breaker: CircuitBreakerConfig::for_advisory_source(1, Duration::from_secs(60)),
            ..ProviderDefaults::default()
        });

        let lease = registry.acquire(Some(&config("openai", Some("sk-1")))).unwrap();
        registry.release(lease, false);

        assert!(matches!(
            registry.acquire(Some(&config("openai", Some("sk-2")))),
            Err(AdvisoryError::CircuitOpen(ref key)) if key == "openai:https://api.openai.com/v1"
        ));
        assert!(registry.acquire(Some(&config("ollama", None))).is_ok());
    }

    #[test]
    fn pinned_provider_skips_credentials() {
        let registry = ProviderRegistry::new(ProviderDefaults::default())
            .with_provider("mock", Arc::new(MockAIProvider::new()));
        let lease = registry.acquire(Some(&config("mock", None))).unwrap();
        assert_eq!(lease.provider().provider_info().name, "mock");
        registry.release(lease, true);
        assert_eq!(registry.breaker("mock:pinned").unwrap().metrics().total_successes, 1);
    }
}
