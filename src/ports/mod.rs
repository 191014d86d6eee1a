//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Decision Ports
//!
//! - `AdvisoryReasoner` - Untrusted next-action suggestions
//! - `AIProvider` - Completion backend used by the advisory reasoner
//! - `CircuitBreaker` - Cooldown-on-failure guard per advisory endpoint
//!
//! ## Queue Ports
//!
//! - `JobStore` - Claim, cancel, finalize, heartbeat and status queries
//! - `ResultNotifier` - Callback delivery of finished results
//! - `DecisionObserver` - Side-channel mirror of recorded outcomes

mod advisory_reasoner;
mod ai_provider;
mod circuit_breaker;
mod decision_observer;
mod job_store;
mod result_notifier;

pub use advisory_reasoner::{AdvisoryError, AdvisoryOutcome, AdvisoryProposal, AdvisoryReasoner};
pub use ai_provider::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, FinishReason, Message,
    MessageRole, ProviderInfo, RequestMetadata, TokenUsage,
};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
pub use decision_observer::{DecisionObserver, NoOpDecisionObserver};
pub use job_store::{ClaimOutcome, FinishOutcome, JobStore, StoreError, SweptJob};
pub use result_notifier::{NotifyError, ResultNotifier};
