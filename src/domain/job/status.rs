//! Job lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// `queued → processing → {done, canceled, failed}`.
///
/// `canceled` and `failed` are also reachable straight from `queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Canceled,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Done,
        JobStatus::Canceled,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Canceled => "canceled",
            JobStatus::Failed => "failed",
        }
    }
}

impl StateMachine for JobStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use JobStatus::*;
        match self {
            Queued => vec![Processing, Canceled, Failed],
            Processing => vec![Done, Canceled, Failed],
            Done | Canceled | Failed => vec![],
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::invalid_format("status", format!("unknown status '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_moves_queued_to_processing() {
        assert_eq!(
            JobStatus::Queued.transition_to(JobStatus::Processing),
            Ok(JobStatus::Processing)
        );
    }

    #[test]
    fn cancel_is_reachable_before_and_during_processing() {
        assert!(JobStatus::Queued.can_transition_to(&JobStatus::Canceled));
        assert!(JobStatus::Processing.can_transition_to(&JobStatus::Canceled));
    }

    #[test]
    fn terminal_states_never_change() {
        for terminal in [JobStatus::Done, JobStatus::Canceled, JobStatus::Failed] {
            assert!(terminal.is_terminal());
            for target in JobStatus::ALL {
                assert!(terminal.transition_to(target).is_err());
            }
        }
    }

    #[test]
    fn done_requires_processing() {
        assert!(JobStatus::Queued.transition_to(JobStatus::Done).is_err());
    }

    #[test]
    fn parses_wire_names() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert!("running".parse::<JobStatus>().is_err());
    }
}
