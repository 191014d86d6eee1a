//! AI Provider Adapters.
//!
//! Implementations of the AIProvider port.
//!
//! ## Available Adapters
//!
//! - `OpenAIProvider` - OpenAI and OpenAI-compatible servers (Ollama)
//! - `AnthropicProvider` - Anthropic Messages API
//! - `MockAIProvider` - Configurable mock for testing

mod anthropic_provider;
mod mock_provider;
mod openai_provider;
mod transport;

pub use anthropic_provider::{AnthropicConfig, AnthropicProvider};
pub use mock_provider::{MockAIProvider, DEFAULT_MOCK_REPLY};
pub use openai_provider::{OpenAIConfig, OpenAIProvider};
