//! Axum handlers for the operational endpoints.

use std::sync::Arc;

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use crate::application::handlers::decision::{
    CancelDecisionCommand, CancelDecisionHandler, GetJobResultHandler, GetQueueStatusHandler,
    JobResultView,
};
use crate::application::worker::Watchdog;
use crate::domain::foundation::{DomainError, ErrorCode, JobId};
use crate::ports::JobStore;

use super::dto::{
    CancelRequest, CancelResponse, ErrorResponse, HealthResponse, JobResponse,
    QueueStatusResponse, ResetResponse, WorkersResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct OpsAppState {
    pub store: Arc<dyn JobStore>,
    /// Runs operator resets so canceled jobs still get their callbacks.
    pub watchdog: Arc<Watchdog>,
}

impl OpsAppState {
    pub fn new(store: Arc<dyn JobStore>, watchdog: Arc<Watchdog>) -> Self {
        Self { store, watchdog }
    }

    pub fn queue_status_handler(&self) -> GetQueueStatusHandler {
        GetQueueStatusHandler::new(self.store.clone())
    }

    pub fn job_result_handler(&self) -> GetJobResultHandler {
        GetJobResultHandler::new(self.store.clone())
    }

    pub fn cancel_handler(&self) -> CancelDecisionHandler {
        CancelDecisionHandler::new(self.store.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /health - process liveness plus store reachability
pub async fn health(State(state): State<OpsAppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                store: "ok".to_string(),
            }),
        ),
        Err(err) => {
            warn!(error = %err, "Health check found store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    store: "unavailable".to_string(),
                }),
            )
        }
    }
}

/// GET /queue/status
pub async fn queue_status(
    State(state): State<OpsAppState>,
) -> Result<impl IntoResponse, OpsApiError> {
    let status = state.queue_status_handler().handle().await?;
    Ok(Json(QueueStatusResponse::from(status)))
}

/// GET /queue/workers
pub async fn live_workers(
    State(state): State<OpsAppState>,
) -> Result<impl IntoResponse, OpsApiError> {
    let workers = state.queue_status_handler().live_workers().await?;
    Ok(Json(WorkersResponse::from(workers)))
}

/// GET /jobs/:job_id
pub async fn get_job(
    State(state): State<OpsAppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, OpsApiError> {
    let job_id = JobId::from_string(job_id)?;
    let view = state.job_result_handler().handle(&job_id).await?;

    let response = match view {
        JobResultView::Ready(result) => JobResponse {
            job_id: job_id.to_string(),
            state: "ready".to_string(),
            result: Some(result),
        },
        JobResultView::Pending(status) => JobResponse {
            job_id: job_id.to_string(),
            state: status.to_string(),
            result: None,
        },
    };
    Ok(Json(response))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /cancel
pub async fn cancel(
    State(state): State<OpsAppState>,
    Json(request): Json<CancelRequest>,
) -> Result<impl IntoResponse, OpsApiError> {
    let mut cmd = CancelDecisionCommand::new(request.target()?);
    if let Some(reason) = request.reason {
        cmd = cmd.with_reason(reason);
    }

    let result = state.cancel_handler().handle(cmd).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            target: result.target.to_string(),
            matched: result.matched,
        }),
    ))
}

/// POST /queue/reset - cancel every job currently processing
pub async fn reset_queue(
    State(state): State<OpsAppState>,
) -> Result<impl IntoResponse, OpsApiError> {
    let canceled = state.watchdog.reset_processing().await?;
    Ok(Json(ResetResponse { canceled }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Mapping
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct OpsApiError(DomainError);

impl From<DomainError> for OpsApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl From<crate::domain::foundation::ValidationError> for OpsApiError {
    fn from(err: crate::domain::foundation::ValidationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for OpsApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0.code {
            ErrorCode::JobNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat
            | ErrorCode::MalformedSubmission => StatusCode::BAD_REQUEST,
            ErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse::new(self.0.code.to_string(), self.0.message);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_maps_not_found_to_404() {
        let err = OpsApiError(DomainError::new(ErrorCode::JobNotFound, "no job"));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn api_error_maps_store_outage_to_503() {
        let err = OpsApiError(DomainError::new(ErrorCode::StoreUnavailable, "down"));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn api_error_maps_validation_to_400() {
        let err = OpsApiError(DomainError::validation("job_id", "required"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
