//! HTTP retry helper for transient errors.
//!
//! Feed requests go through [`send_json`] instead of calling
//! `reqwest::RequestBuilder::send()` directly, so every request gets the
//! feed's bounded retry with a fixed backoff.
//!
//! ```ignore
//! let policy = config.retry_policy();
//! let body = retry::send_json(&policy, || client.get(&url).query(&params)).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How many times to retry a request and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before each retry.
    pub backoff: Duration,
}

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Retry,
    GiveUp,
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// Connection errors, timeouts, HTTP 429, HTTP 5xx, unreadable bodies, and
/// bodies that are not valid JSON are retried up to
/// [`RetryPolicy::max_retries`] times, sleeping [`RetryPolicy::backoff`]
/// between attempts. Other HTTP 4xx responses fail immediately.
///
/// # Errors
///
/// Returns [`SourceError`] if the request still fails after all retries or
/// the server returns a non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    policy: &RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        let (outcome, error) = match attempt_json(&build_request).await {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        if outcome == Outcome::GiveUp || attempt >= policy.max_retries {
            return Err(error);
        }

        attempt += 1;
        log::warn!(
            "Retry {attempt}/{} after error: {error}. Retrying in {:?}...",
            policy.max_retries,
            policy.backoff,
        );
        tokio::time::sleep(policy.backoff).await;
    }
}

/// One attempt: send, check the status, decode the body.
#[allow(clippy::future_not_send)]
async fn attempt_json<F>(build_request: &F) -> Result<serde_json::Value, (Outcome, SourceError)>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = build_request().send().await.map_err(|e| {
        let outcome = if is_transient(&e) {
            Outcome::Retry
        } else {
            Outcome::GiveUp
        };
        (outcome, SourceError::Http(e))
    })?;

    let status = response.status();
    if let Some(outcome) = status_outcome(status) {
        return Err((
            outcome,
            SourceError::Request {
                message: format!("HTTP {status} from {}", response.url()),
            },
        ));
    }

    let url = response.url().to_string();
    let text = response
        .text()
        .await
        .map_err(|e| (Outcome::Retry, SourceError::Http(e)))?;

    serde_json::from_str(&text).map_err(|e| {
        log::debug!(
            "JSON parse failed\n  url: {url}\n  received: {} bytes\n  body preview: {}",
            text.len(),
            preview(&text),
        );
        (Outcome::Retry, SourceError::Json(e))
    })
}

/// Classifies an HTTP status. `None` means the response is usable.
fn status_outcome(status: reqwest::StatusCode) -> Option<Outcome> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(Outcome::Retry)
    } else if status.is_client_error() {
        Some(Outcome::GiveUp)
    } else {
        None
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

/// Truncates a response body for logging without splitting a character.
fn preview(text: &str) -> &str {
    if text.len() <= BODY_PREVIEW_LEN {
        return text;
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
