//! Job domain - queue-side lifecycle around a decision request.

mod envelope;
mod queue_status;
mod status;

pub use envelope::{CancelTarget, ClaimedJob, JobEnvelope, JobOutcome, MalformedJob};
pub use queue_status::{
    QueueStatus, QueuedJobSummary, StatusCounts, WorkerHeartbeat, STATUS_SAMPLE_SIZE,
};
pub use status::JobStatus;
