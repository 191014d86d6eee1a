//! Stuck-job watchdog configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::worker::WatchdogConfig as WatchdogSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Age in `processing` after which a job is force-canceled, in seconds
    #[serde(default = "default_stuck_after")]
    pub stuck_after_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl WatchdogConfig {
    pub fn settings(&self) -> WatchdogSettings {
        WatchdogSettings::default()
            .with_stuck_after(Duration::from_secs(self.stuck_after_secs))
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stuck_after_secs < 60 {
            return Err(ValidationError::InvalidDuration("watchdog.stuck_after_secs"));
        }
        if self.poll_interval_secs == 0 {
            return Err(ValidationError::InvalidDuration("watchdog.poll_interval_secs"));
        }
        Ok(())
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            stuck_after_secs: default_stuck_after(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_stuck_after() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    30
}
