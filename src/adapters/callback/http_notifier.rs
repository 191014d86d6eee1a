//! HTTP callback delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::domain::intent::DecisionResult;
use crate::ports::{NotifyError, ResultNotifier};

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// POSTs the result as JSON. One attempt, bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct HttpResultNotifier {
    client: Client,
    timeout: Duration,
}

impl HttpResultNotifier {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, timeout }
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Default for HttpResultNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_TIMEOUT)
    }
}

fn parse_callback_url(url: &str) -> Result<Url, NotifyError> {
    let parsed = Url::parse(url).map_err(|e| NotifyError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(NotifyError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    }
}

#[async_trait]
impl ResultNotifier for HttpResultNotifier {
    async fn notify(&self, url: &str, result: &DecisionResult) -> Result<(), NotifyError> {
        let url = parse_callback_url(url)?;
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(result)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(parse_callback_url("http://localhost:9000/cb").is_ok());
        assert!(parse_callback_url("https://hooks.example.com/x?y=1").is_ok());
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(matches!(
            parse_callback_url("ftp://host/x"),
            Err(NotifyError::InvalidUrl(_))
        ));
        assert!(matches!(parse_callback_url("not a url"), Err(NotifyError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn invalid_url_fails_before_any_request() {
        let notifier = HttpResultNotifier::default();
        let result = DecisionResult::error("x");
        assert!(matches!(
            notifier.notify("mailto:a@b", &result).await,
            Err(NotifyError::InvalidUrl(_))
        ));
    }
}
