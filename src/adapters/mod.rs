//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `ai` - Completion providers (OpenAI-compatible, Anthropic, mock)
//! - `advisory` - LLM-backed advisory reasoner and its provider registry
//! - `resilience` - Circuit breakers guarding advisory endpoints
//! - `queue` - Job stores (Redis list, PostgreSQL document, in-memory)
//! - `callback` - Result callbacks and decision observers
//! - `http` - Operational HTTP surface

pub mod advisory;
pub mod ai;
pub mod callback;
pub mod http;
pub mod queue;
pub mod resilience;

pub use advisory::{LlmAdvisoryReasoner, NoopAdvisoryReasoner, ProviderDefaults, ProviderRegistry};
pub use callback::{HttpResultNotifier, TracingDecisionObserver};
pub use queue::{InMemoryJobStore, PostgresJobStore, RedisJobStore};
pub use resilience::InMemoryCircuitBreaker;
