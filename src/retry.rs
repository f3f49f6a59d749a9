//! Retry with capped exponential backoff for the provider HTTP clients.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;

const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

pub(crate) fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

/// Per-attempt HTTP timeout that leaves room for retries inside `deadline`.
pub fn attempt_timeout(deadline: Duration, max_retries: usize) -> Duration {
    let attempts = u32::try_from(max_retries.max(1)).unwrap_or(u32::MAX);
    (deadline / attempts).max(MIN_ATTEMPT_TIMEOUT).min(deadline)
}

/// Sends the request built by `build`, retrying 429/5xx responses and transient
/// transport errors up to `max_retries` attempts in total.
///
/// Returns the first successful response; any other final outcome is an error
/// carrying the status and response body.
pub(crate) async fn send_with_retry<F>(
    service: &str,
    max_retries: usize,
    build: F,
) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let max_attempts = max_retries.max(1);
    let mut attempt = 0usize;
    loop {
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                let body = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if should_retry(status) && attempt + 1 < max_attempts {
                    attempt += 1;
                    debug!(service, %status, attempt, "retrying request");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                anyhow::bail!("{service} request failed ({status}): {body}");
            }
            Err(err) => {
                if is_retryable_error(&err) && attempt + 1 < max_attempts {
                    attempt += 1;
                    debug!(service, error = %err, attempt, "retrying request");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                return Err(err).with_context(|| format!("failed to call {service}"));
            }
        }
    }
}
