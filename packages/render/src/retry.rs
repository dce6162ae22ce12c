//! HTTP retry for transient rendering failures.
//!
//! Every call to a rendering service goes through [`RetryPolicy::send`]
//! instead of `reqwest::RequestBuilder::send()`, so timeouts, connection
//! failures, HTTP 429 and HTTP 5xx are retried with exponential backoff.
//! Other 4xx responses are permanent and returned at once.

use std::time::Duration;

use crate::RenderError;

/// Attempts (first try included) before a transient failure is final.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Maximum length of the response body kept in errors and logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }

    /// Sends the request built by `build_request`, retrying transient
    /// failures.
    ///
    /// The closure is called on each attempt since builders are consumed
    /// by `.send()`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Service`] for a non-2xx response that is
    /// permanent or still failing on the last attempt,
    /// [`RenderError::Timeout`] if the last attempt timed out, and
    /// [`RenderError::Http`] for other transport errors.
    pub async fn send<F>(&self, build_request: F) -> Result<reqwest::Response, RenderError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let max_attempts = self.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let last = attempt == max_attempts;

            match build_request().send().await {
                Err(e) => {
                    if is_transient(&e) && !last {
                        log::warn!("  transient error (attempt {attempt}/{max_attempts}): {e}");
                        self.backoff(attempt, max_attempts).await;
                        continue;
                    }
                    return Err(classify(e));
                }
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let retryable = is_retryable_status(status.as_u16());
                    let body = preview(response).await;

                    if retryable && !last {
                        log::warn!("  HTTP {status} (attempt {attempt}/{max_attempts}): {body}");
                        self.backoff(attempt, max_attempts).await;
                        continue;
                    }
                    if retryable {
                        log::error!("HTTP {status} after {max_attempts} attempts, giving up");
                    }
                    return Err(RenderError::Service {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        }

        unreachable!("retry loop exited without returning")
    }

    pub(crate) async fn backoff(&self, attempt: u32, max_attempts: u32) {
        let delay = self.delay_after(attempt);
        log::warn!("  retry {}/{} in {delay:?}...", attempt, max_attempts - 1);
        tokio::time::sleep(delay).await;
    }
}

async fn preview(response: reqwest::Response) -> String {
    let mut text = response.text().await.unwrap_or_default();
    if text.len() > BODY_PREVIEW_LEN {
        let mut end = BODY_PREVIEW_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("...");
    }
    text
}

/// Maps a transport error to a [`RenderError`].
pub(crate) fn classify(e: reqwest::Error) -> RenderError {
    if e.is_timeout() {
        RenderError::Timeout {
            url: e.url().map(ToString::to_string).unwrap_or_default(),
        }
    } else {
        RenderError::Http(e)
    }
}

/// HTTP 429 and 5xx, whether sent as the response status or inside an
/// error body.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{Reply, StubServer};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn server_error_is_retried_up_to_bound() {
        let server = StubServer::start(|_| Reply::status(500, "boom")).await;
        let client = reqwest::Client::new();

        let result = fast().send(|| client.get(server.url("/map"))).await;

        assert!(matches!(
            result,
            Err(RenderError::Service { status: 500, ref body }) if body == "boom"
        ));
        assert_eq!(server.hits(), 3);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = StubServer::start(|_| Reply::status(400, "bad request")).await;
        let client = reqwest::Client::new();

        let result = fast().send(|| client.get(server.url("/map"))).await;

        assert!(matches!(result, Err(RenderError::Service { status: 400, .. })));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn rate_limit_then_success() {
        let server = StubServer::start(|request| {
            if request.index == 0 {
                Reply::status(429, "slow down")
            } else {
                Reply::ok("image/png", b"png".to_vec())
            }
        })
        .await;
        let client = reqwest::Client::new();

        let response = fast().send(|| client.get(server.url("/map"))).await.unwrap();

        assert_eq!(response.bytes().await.unwrap().as_ref(), b"png");
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn unresponsive_service_times_out() {
        let server = StubServer::start(|_| Reply::Hang).await;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();

        let result = fast().send(|| client.get(server.url("/map"))).await;

        assert!(matches!(result, Err(RenderError::Timeout { .. })));
        assert_eq!(server.hits(), 3);
    }
}
