//! OpenAI-compatible chat completions provider.
//!
//! Also serves local OpenAI-compatible servers such as Ollama, which take no
//! API key; the `Authorization` header is omitted when the key is empty.
//!
//! ```ignore
//! let config = OpenAIConfig::new(api_key)
//!     .with_model("gpt-4o-mini")
//!     .with_base_url("https://api.openai.com/v1");
//!
//! let provider = OpenAIProvider::new(config);
//! ```

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use super::transport::{check_status, map_send_error, retry_delay};
use crate::ports::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, FinishReason, MessageRole,
    ProviderInfo, TokenUsage,
};

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    api_key: Secret<String>,
    /// Name reported in logs and used as the breaker key ("openai", "ollama").
    pub provider_name: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            provider_name: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 1,
            retry_base_delay: Duration::from_millis(500),
        }
    }

    /// Keyless configuration for a local OpenAI-compatible server.
    pub fn ollama(base_url: impl Into<String>) -> Self {
        Self {
            provider_name: "ollama".to_string(),
            model: "llama3".to_string(),
            base_url: base_url.into(),
            ..Self::new("")
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// OpenAI-compatible API provider.
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }

    /// Reuses a shared connection pool; the per-request timeout still applies.
    pub fn with_client(config: OpenAIConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn to_openai_request(&self, request: &CompletionRequest) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(prompt) = &request.system_prompt {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: prompt.clone(),
            });
        }
        for msg in &request.messages {
            messages.push(OpenAIMessage {
                role: match msg.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                }
                .to_string(),
                content: msg.content.clone(),
            });
        }

        OpenAIRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        }
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<CompletionResponse, AIError> {
        let mut builder = self
            .client
            .post(self.completions_url())
            .timeout(self.config.timeout)
            .json(&self.to_openai_request(request));
        if !self.config.api_key().is_empty() {
            builder = builder.bearer_auth(self.config.api_key());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_send_error(e, self.config.timeout))?;
        let response = check_status(response).await?;

        let body: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| AIError::parse(format!("Failed to parse response: {}", e)))?;
        parse_completion(body)
    }
}

fn parse_completion(body: OpenAIResponse) -> Result<CompletionResponse, AIError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AIError::parse("No choices in response"))?;

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    };
    if finish_reason == FinishReason::ContentFilter {
        return Err(AIError::content_filtered("reply withheld by provider"));
    }

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        usage: body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default(),
        model: body.model,
        finish_reason,
    })
}

#[async_trait]
impl AIProvider for OpenAIProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError> {
        let mut attempt = 0;
        loop {
            match self.attempt(&request).await {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    tracing::debug!(
                        provider = %self.config.provider_name,
                        attempt,
                        error = %err,
                        "Retrying completion"
                    );
                    sleep(retry_delay(self.config.retry_base_delay, attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new(&self.config.provider_name, &self.config.model)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::RequestMetadata;

    #[test]
    fn config_builder_works() {
        let config = OpenAIConfig::new("test-key")
            .with_model("gpt-4o")
            .with_base_url("https://custom.api.com/v1/")
            .with_timeout(Duration::from_secs(10))
            .with_max_retries(2);

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.api_key(), "test-key");

        let provider = OpenAIProvider::new(config);
        assert_eq!(provider.completions_url(), "https://custom.api.com/v1/chat/completions");
    }

    #[test]
    fn ollama_config_is_keyless() {
        let config = OpenAIConfig::ollama("http://localhost:11434/v1");
        assert_eq!(config.api_key(), "");
        let info = OpenAIProvider::new(config).provider_info();
        assert_eq!(info.name, "ollama");
    }

    #[test]
    fn request_puts_system_prompt_first() {
        let provider = OpenAIProvider::new(OpenAIConfig::new("k"));
        let request = CompletionRequest::new(RequestMetadata::default())
            .with_system_prompt("sys")
            .with_message(MessageRole::User, "hi");
        let wire = provider.to_openai_request(&request);
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[1].content, "hi");
        assert!(!wire.stream);
    }

    #[test]
    fn parses_completion_body() {
        let body: OpenAIResponse = serde_json::from_str(
            r#"{"model":"gpt-4o-mini","choices":[{"message":{"content":"ACTION: finish"},"finish_reason":"stop"}],"usage":{"prompt_tokens":10,"completion_tokens":3}}"#,
        )
        .unwrap();
        let completion = parse_completion(body).unwrap();
        assert_eq!(completion.content, "ACTION: finish");
        assert_eq!(completion.usage.total_tokens, 13);
    }

    #[test]
    fn empty_choices_is_parse_error() {
        let body: OpenAIResponse = serde_json::from_str(r#"{"model":"m","choices":[]}"#).unwrap();
        assert!(matches!(parse_completion(body), Err(AIError::Parse(_))));
    }
}
