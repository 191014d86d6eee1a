//! Result delivery adapters.

mod http_notifier;
mod tracing_observer;

pub use http_notifier::{HttpResultNotifier, DEFAULT_CALLBACK_TIMEOUT};
pub use tracing_observer::TracingDecisionObserver;
