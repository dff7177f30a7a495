//! Retry schedule for thread API requests.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use crate::comment_render::clip_chars;
use crate::thread_api::ThreadApiError;

const REJECTION_BODY_MAX_CHARS: usize = 800;

/// Why one attempt at a thread API request did not succeed.
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    Status {
        status: StatusCode,
        retry_after: Option<Duration>,
        body: String,
    },
    Transport(reqwest::Error),
}

impl AttemptFailure {
    pub(crate) fn from_response_parts(status: StatusCode, headers: &HeaderMap, body: String) -> Self {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        Self::Status {
            status,
            retry_after,
            body,
        }
    }

    /// Rate limits, server faults and connection-level failures are worth
    /// another attempt; everything else is final.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Transport(error) => error.is_timeout() || error.is_connect() || error.is_request(),
        }
    }

    pub(crate) fn into_error(self, operation: &str) -> ThreadApiError {
        match self {
            Self::Status { status, body, .. } => ThreadApiError::Rejected {
                operation: operation.to_string(),
                status: status.as_u16(),
                message: clip_chars(&body, REJECTION_BODY_MAX_CHARS),
            },
            Self::Transport(error) => ThreadApiError::Transport {
                operation: operation.to_string(),
                message: error.to_string(),
            },
        }
    }
}

/// Bounded exponential backoff; a server-supplied `retry-after` takes
/// precedence but is still capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

    pub fn new(max_attempts: usize, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms.max(1)),
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }

    /// Delay before retrying after `attempt` (1-based) failed, or `None`
    /// when the failure should be returned to the caller.
    pub(crate) fn delay_after(&self, attempt: usize, failure: &AttemptFailure) -> Option<Duration> {
        if attempt >= self.max_attempts || !failure.is_retryable() {
            return None;
        }
        let requested = match failure {
            AttemptFailure::Status {
                retry_after: Some(delay),
                ..
            } => (*delay).max(self.base_delay),
            _ => self.backoff(attempt),
        };
        Some(requested.min(self.max_delay))
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(1_u32 << doublings)
    }
}

#[cfg(test)]
mod tests {
    use super::{AttemptFailure, RetryPolicy};
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use reqwest::StatusCode;
    use std::time::Duration;

    fn status(code: StatusCode) -> AttemptFailure {
        AttemptFailure::from_response_parts(code, &HeaderMap::new(), String::new())
    }

    #[test]
    fn unit_backoff_doubles_per_attempt_and_caps_at_max_delay() {
        let policy = RetryPolicy::new(40, 100);
        let failure = status(StatusCode::BAD_GATEWAY);
        assert_eq!(policy.delay_after(1, &failure), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_after(3, &failure), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_after(30, &failure), Some(RetryPolicy::DEFAULT_MAX_DELAY));
    }

    #[test]
    fn unit_retry_after_header_is_preferred_over_backoff() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        let failure = AttemptFailure::from_response_parts(
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            String::new(),
        );
        let policy = RetryPolicy::new(5, 10);
        assert_eq!(policy.delay_after(4, &failure), Some(Duration::from_secs(2)));
    }

    #[test]
    fn functional_client_errors_and_exhausted_attempts_are_final() {
        let policy = RetryPolicy::new(3, 10);
        assert_eq!(policy.delay_after(1, &status(StatusCode::NOT_FOUND)), None);
        assert_eq!(policy.delay_after(1, &status(StatusCode::UNPROCESSABLE_ENTITY)), None);
        assert!(policy
            .delay_after(2, &status(StatusCode::SERVICE_UNAVAILABLE))
            .is_some());
        assert_eq!(
            policy.delay_after(3, &status(StatusCode::SERVICE_UNAVAILABLE)),
            None
        );
    }

    #[test]
    fn regression_rejection_message_is_clipped() {
        let failure = AttemptFailure::from_response_parts(
            StatusCode::UNPROCESSABLE_ENTITY,
            &HeaderMap::new(),
            "é".repeat(2_000),
        );
        let error = failure.into_error("create issue comment");
        let message = match error {
            crate::ThreadApiError::Rejected {
                status, message, ..
            } => {
                assert_eq!(status, 422);
                message
            }
            other => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(message.chars().count(), 803);
        assert!(message.ends_with("..."));
    }
}
