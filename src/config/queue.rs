//! Queue backend selection

use serde::Deserialize;

use super::error::ValidationError;
use crate::adapters::queue::{QueueKeys, DEFAULT_KEY_PREFIX, DEFAULT_LOG_CAP};

/// Which store deployment holds the queue
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// Blocking-pop list plus in-flight set
    #[default]
    Redis,
    /// Conditional-update document table
    Postgres,
    /// Single process only; nothing survives a restart
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,

    /// Namespace for every Redis key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Length of the completed and failed logs
    #[serde(default = "default_log_cap")]
    pub log_cap: usize,

    /// Lifetime of a cancel marker in seconds
    #[serde(default = "default_cancel_ttl")]
    pub cancel_ttl_secs: u64,
}

impl QueueConfig {
    pub fn keys(&self) -> QueueKeys {
        QueueKeys::new(&self.key_prefix)
    }

    pub fn cancel_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cancel_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key_prefix.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidKeyPrefix);
        }
        if self.cancel_ttl_secs == 0 {
            return Err(ValidationError::InvalidDuration("queue.cancel_ttl_secs"));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            key_prefix: default_key_prefix(),
            log_cap: default_log_cap(),
            cancel_ttl_secs: default_cancel_ttl(),
        }
    }
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_log_cap() -> usize {
    DEFAULT_LOG_CAP
}

fn default_cancel_ttl() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_redis_with_prefix() {
        let config = QueueConfig::default();
        assert_eq!(config.backend, QueueBackend::Redis);
        assert_eq!(config.log_cap, 100);
        assert_eq!(config.keys().queue(), "intent_engine:queue:decisions");
    }

    #[test]
    fn prefix_with_space_is_rejected() {
        let config = QueueConfig {
            key_prefix: "my queue".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidKeyPrefix));
    }
}
