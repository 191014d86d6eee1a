//! GetQueueStatusHandler - read-only queue overview.

use std::sync::Arc;

use crate::domain::foundation::DomainError;
use crate::domain::job::{QueueStatus, WorkerHeartbeat};
use crate::ports::JobStore;

pub struct GetQueueStatusHandler {
    store: Arc<dyn JobStore>,
}

impl GetQueueStatusHandler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self) -> Result<QueueStatus, DomainError> {
        Ok(self.store.queue_status().await?)
    }

    pub async fn live_workers(&self) -> Result<Vec<WorkerHeartbeat>, DomainError> {
        let mut workers = self.store.live_workers().await?;
        workers.sort_by(|a, b| a.worker_id.as_str().cmp(b.worker_id.as_str()));
        Ok(workers)
    }
}
