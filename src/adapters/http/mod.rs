//! HTTP adapters.
//!
//! Only the operational surface is served; decisions are submitted through
//! the job store.

pub mod ops;

pub use ops::{ops_router, OpsAppState};
