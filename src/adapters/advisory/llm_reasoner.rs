//! Advisory reasoner backed by an LLM provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::prompt_builder::build_completion;
use super::provider_registry::ProviderRegistry;
use super::reply_parser::parse_reply;
use crate::domain::intent::DecisionRequest;
use crate::ports::{AdvisoryError, AdvisoryOutcome, AdvisoryReasoner};

/// Consults the provider named by the request, bounded by `timeout`.
pub struct LlmAdvisoryReasoner {
    registry: Arc<ProviderRegistry>,
    timeout: Duration,
}

impl LlmAdvisoryReasoner {
    pub fn new(registry: Arc<ProviderRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }
}

#[async_trait]
impl AdvisoryReasoner for LlmAdvisoryReasoner {
    async fn propose(&self, request: &DecisionRequest) -> AdvisoryOutcome {
        let lease = match self.registry.acquire(request.advisory.as_ref()) {
            Ok(lease) => lease,
            Err(err) => {
                debug!(session_id = %request.session_id, reason = %err, "Advisory source unavailable");
                return AdvisoryOutcome::NoDecision(err);
            }
        };

        let completion = build_completion(request);
        let reply = timeout(self.timeout, lease.provider().complete(completion)).await;
        let provider = lease.key().to_string();

        match reply {
            Err(_) => {
                self.registry.release(lease, false);
                warn!(session_id = %request.session_id, provider = %provider, "Advisory call timed out");
                AdvisoryOutcome::NoDecision(AdvisoryError::Timeout(self.timeout))
            }
            Ok(Err(err)) => {
                self.registry.release(lease, false);
                warn!(session_id = %request.session_id, provider = %provider, error = %err, "Advisory call failed");
                AdvisoryOutcome::NoDecision(AdvisoryError::Provider(err))
            }
            Ok(Ok(response)) => {
                self.registry.release(lease, true);
                match parse_reply(&response.content) {
                    Ok(proposal) => AdvisoryOutcome::Proposal(proposal),
                    Err(err) => {
                        debug!(session_id = %request.session_id, provider = %provider, reason = %err, "Discarding advisory reply");
                        AdvisoryOutcome::NoDecision(err)
                    }
                }
            }
        }
    }
}

/// Reasoner for deployments without an advisory source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdvisoryReasoner;

#[async_trait]
impl AdvisoryReasoner for NoopAdvisoryReasoner {
    async fn propose(&self, _request: &DecisionRequest) -> AdvisoryOutcome {
        AdvisoryOutcome::NoDecision(AdvisoryError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::advisory::ProviderDefaults;
    use crate::adapters::ai::MockAIProvider;
    use crate::domain::intent::{AdvisoryConfig, DecisionPayload};
    use crate::ports::{AIError, AdvisoryProposal, CircuitBreakerConfig};

    fn request_for(provider: &str) -> DecisionRequest {
        let mut payload = DecisionPayload::new("s-1", "Find the retry policy");
        payload.advisory_config = Some(AdvisoryConfig {
            provider: Some(provider.to_string()),
            ..AdvisoryConfig::default()
        });
        DecisionRequest::from_payload(payload).unwrap()
    }

    fn reasoner(mock: MockAIProvider, timeout: Duration) -> LlmAdvisoryReasoner {
        let registry = ProviderRegistry::new(ProviderDefaults {
            breaker: CircuitBreakerConfig::for_advisory_source(1, Duration::from_secs(60)),
            ..ProviderDefaults::default()
        })
        .with_provider("mock", Arc::new(mock));
        LlmAdvisoryReasoner::new(Arc::new(registry), timeout)
    }

    #[tokio::test]
    async fn parsed_reply_becomes_proposal() {
        let mock = MockAIProvider::new()
            .with_response("ACTION: context.fts_search\nRESULT: retry policy\nREASONING: look");
        let outcome = reasoner(mock.clone(), Duration::from_secs(1))
            .propose(&request_for("mock"))
            .await;

        assert!(matches!(
            outcome,
            AdvisoryOutcome::Proposal(AdvisoryProposal::Tool { ref tool_name, .. })
                if tool_name == "context.fts_search"
        ));
        let call = &mock.get_calls()[0];
        assert!(call.messages[0].content.contains("Find the retry policy"));
    }

    #[tokio::test]
    async fn provider_error_is_no_decision_and_trips_breaker() {
        let mock = MockAIProvider::new().with_error(AIError::AuthenticationFailed);
        let reasoner = reasoner(mock, Duration::from_secs(1));

        let first = reasoner.propose(&request_for("mock")).await;
        assert_eq!(
            first,
            AdvisoryOutcome::NoDecision(AdvisoryError::Provider(AIError::AuthenticationFailed))
        );

        let second = reasoner.propose(&request_for("mock")).await;
        assert!(matches!(second, AdvisoryOutcome::NoDecision(AdvisoryError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let mock = MockAIProvider::new().with_delay(Duration::from_millis(200));
        let outcome = reasoner(mock, Duration::from_millis(20))
            .propose(&request_for("mock"))
            .await;
        assert!(matches!(outcome, AdvisoryOutcome::NoDecision(AdvisoryError::Timeout(_))));
    }

    #[tokio::test]
    async fn unparseable_reply_is_no_decision() {
        let mock = MockAIProvider::new().with_response("no idea");
        let outcome = reasoner(mock, Duration::from_secs(1))
            .propose(&request_for("mock"))
            .await;
        assert!(matches!(outcome, AdvisoryOutcome::NoDecision(AdvisoryError::Unparseable(_))));
    }

    #[tokio::test]
    async fn missing_config_is_not_configured() {
        let reasoner = reasoner(MockAIProvider::new(), Duration::from_secs(1));
        let request = DecisionRequest::from_payload(DecisionPayload::new("s", "g")).unwrap();
        assert_eq!(
            reasoner.propose(&request).await,
            AdvisoryOutcome::NoDecision(AdvisoryError::NotConfigured)
        );
        assert_eq!(
            NoopAdvisoryReasoner.propose(&request).await,
            AdvisoryOutcome::NoDecision(AdvisoryError::NotConfigured)
        );
    }
}
