//! Domain layer containing decision logic and queue-side types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (ids, timestamps, errors, state machine)
//! - `intent` - Next-action decision engine and its pure building blocks
//! - `job` - Job lifecycle, envelopes, outcomes and queue status

pub mod foundation;
pub mod intent;
pub mod job;
