//! Operational HTTP surface.
//!
//! - `GET /health` - liveness and store reachability
//! - `GET /queue/status` - counts per status and queue age
//! - `GET /queue/workers` - live worker registry
//! - `GET /jobs/:job_id` - pollable result slot
//! - `POST /cancel` - cancel by correlation id or job id

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::OpsAppState;
pub use routes::{ops_router, ops_routes};
