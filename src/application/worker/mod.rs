//! Background workers - the job processor, its pool, and the stuck-job watchdog.

mod delivery;
mod pool;
mod processor;
mod watchdog;

pub use pool::{WorkerError, WorkerPool, WorkerPoolConfig};
pub use processor::{
    JobProcessor, ProcessOutcome, ProcessorConfig, CANCELED_BEFORE_COMPUTE,
    CANCELED_DURING_COMPUTE, CANCEL_CHECK_FAILED,
};
pub use watchdog::{stuck_reason, Watchdog, WatchdogConfig, RESET_REASON};
