//! Axum router for the operational endpoints.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    cancel, get_job, health, live_workers, queue_status, reset_queue, OpsAppState,
};

/// # Routes
///
/// - `GET /health` - liveness and store reachability
/// - `GET /queue/status` - counts, oldest queued job, last activity
/// - `GET /queue/workers` - workers with a live heartbeat
/// - `GET /jobs/:job_id` - poll slot, else current status
/// - `POST /cancel` - cancel by `correlation_id` or `job_id`
/// - `POST /queue/reset` - cancel everything currently processing
pub fn ops_routes() -> Router<OpsAppState> {
    Router::new()
        .route("/health", get(health))
        .route("/queue/status", get(queue_status))
        .route("/queue/workers", get(live_workers))
        .route("/jobs/:job_id", get(get_job))
        .route("/queue/reset", post(reset_queue))
        .route("/cancel", post(cancel))
}

/// The ops router with state, tracing and a request timeout applied.
pub fn ops_router(state: OpsAppState, request_timeout: Duration) -> Router {
    ops_routes()
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
