//! Advisory adapters - LLM-backed implementation of the AdvisoryReasoner port.
//!
//! - `ProviderRegistry` - resolves per-request provider config, one breaker per endpoint
//! - `prompt_builder` - system and user prompt sections
//! - `reply_parser` - line format with JSON fallback
//! - `LlmAdvisoryReasoner` / `NoopAdvisoryReasoner`

mod llm_reasoner;
pub mod prompt_builder;
mod provider_registry;
pub mod reply_parser;

pub use llm_reasoner::{LlmAdvisoryReasoner, NoopAdvisoryReasoner};
pub use provider_registry::{
    ProviderDefaults, ProviderLease, ProviderRegistry, PROVIDER_ANTHROPIC, PROVIDER_OLLAMA,
    PROVIDER_OPENAI,
};
