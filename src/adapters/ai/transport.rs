//! HTTP plumbing shared by the provider adapters.

use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::ports::AIError;

/// Maps a `send()` failure onto the provider error taxonomy.
pub(crate) fn map_send_error(err: reqwest::Error, timeout: Duration) -> AIError {
    if err.is_timeout() {
        AIError::Timeout {
            timeout_secs: timeout.as_secs() as u32,
        }
    } else if err.is_connect() {
        AIError::network(format!("Connection failed: {}", err))
    } else {
        AIError::network(err.to_string())
    }
}

/// Passes successful responses through and classifies the rest.
pub(crate) async fn check_status(response: Response) -> Result<Response, AIError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

pub(crate) fn classify_status(status: StatusCode, body: String) -> AIError {
    match status.as_u16() {
        401 | 403 => AIError::AuthenticationFailed,
        429 => AIError::rate_limited(30),
        400 | 404 | 422 => AIError::InvalidRequest(body),
        500..=599 => AIError::unavailable(format!("Server error {}: {}", status, body)),
        _ => AIError::network(format!("Unexpected status {}: {}", status, body)),
    }
}

/// Exponential backoff: base, 2×base, 4×base, ...
pub(crate) fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            AIError::AuthenticationFailed
        );
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "down".into()).is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "bad".into()).is_retryable());
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(250);
        assert_eq!(retry_delay(base, 0), Duration::from_millis(250));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(1));
    }
}
