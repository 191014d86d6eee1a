//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, the state-machine contract and the error
//! vocabulary used by the intent and job domains.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{IntentId, JobId, WorkerId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
