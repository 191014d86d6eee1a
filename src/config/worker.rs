//! Worker pool configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::worker::{ProcessorConfig, WorkerPoolConfig};

const MAX_POOL_SIZE: usize = 256;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker units
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long one claim waits, in seconds
    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_secs: u64,

    /// Lifetime of the pollable result slot, in seconds
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,

    #[serde(default = "default_heartbeat_ttl")]
    pub heartbeat_ttl_secs: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,

    /// Pause after a store error, in milliseconds
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,
}

impl WorkerConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::default()
            .with_pool_size(self.pool_size)
            .with_claim_timeout(Duration::from_secs(self.claim_timeout_secs))
            .with_heartbeat(
                Duration::from_secs(self.heartbeat_ttl_secs),
                Duration::from_secs(self.heartbeat_interval_secs),
            )
            .with_error_backoff(Duration::from_millis(self.error_backoff_ms))
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig::default()
            .with_result_ttl(self.result_ttl())
            .with_callback_timeout(self.callback_timeout())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(ValidationError::InvalidWorkerPoolSize);
        }
        if self.claim_timeout_secs == 0 {
            return Err(ValidationError::InvalidDuration("worker.claim_timeout_secs"));
        }
        if self.result_ttl_secs == 0 {
            return Err(ValidationError::InvalidDuration("worker.result_ttl_secs"));
        }
        if self.callback_timeout_secs == 0 {
            return Err(ValidationError::InvalidDuration("worker.callback_timeout_secs"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ValidationError::InvalidDuration("worker.heartbeat_interval_secs"));
        }
        if self.heartbeat_interval_secs >= self.heartbeat_ttl_secs {
            return Err(ValidationError::HeartbeatOutlivesTtl);
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            claim_timeout_secs: default_claim_timeout(),
            result_ttl_secs: default_result_ttl(),
            heartbeat_ttl_secs: default_heartbeat_ttl(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            callback_timeout_secs: default_callback_timeout(),
            error_backoff_ms: default_error_backoff(),
        }
    }
}

fn default_pool_size() -> usize {
    4
}

fn default_claim_timeout() -> u64 {
    5
}

fn default_result_ttl() -> u64 {
    300
}

fn default_heartbeat_ttl() -> u64 {
    30
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_callback_timeout() -> u64 {
    5
}

fn default_error_backoff() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_config().pool_size, 4);
        assert_eq!(config.processor_config().result_ttl, Duration::from_secs(300));
    }

    #[test]
    fn zero_pool_is_rejected() {
        let config = WorkerConfig {
            pool_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidWorkerPoolSize));
    }

    #[test]
    fn heartbeat_must_refresh_before_expiry() {
        let config = WorkerConfig {
            heartbeat_interval_secs: 30,
            heartbeat_ttl_secs: 30,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::HeartbeatOutlivesTtl));
    }
}
