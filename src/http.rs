//! Shared HTTP client construction and retry policy.
//!
//! Every outbound call to a content API or to the search engine goes through
//! [`send_with_retry`]:
//!
//! - HTTP 429, 5xx, and 403 with an exhausted rate-limit quota → retry
//! - Other 4xx → fail immediately
//! - Network errors → retry
//!
//! A rate-limited response that announces when the quota resets
//! (`Retry-After` or `x-ratelimit-reset`) waits until then, capped at
//! [`RetryPolicy::max_rate_limit_wait`]. Everything else backs off
//! exponentially with random jitter.

use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use rand::Rng;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::config::HttpConfig;

/// User agent sent on every request.
pub const USER_AGENT: &str = concat!("docs-indexer/", env!("CARGO_PKG_VERSION"));

/// Retry limits for one logical request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_rate_limit_wait: Duration::from_secs(config.rate_limit_max_wait_secs),
            ..Default::default()
        }
    }

    /// Exponential delay for `attempt` (1-based), capped, with up to 50%
    /// random jitter added.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        let delay = self.base_delay.saturating_mul(1 << exp).min(self.max_delay);
        let jitter_ceiling = (delay.as_millis() as u64) / 2;
        let jitter = if jitter_ceiling > 0 {
            rand::thread_rng().gen_range(0..=jitter_ceiling)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }
}

/// Build the shared async client.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Whether a response status is worth retrying.
pub fn should_retry(status: StatusCode, headers: &HeaderMap) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
        || (status == StatusCode::FORBIDDEN && quota_exhausted(headers))
}

fn quota_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

/// How long the server asked us to wait, if it said.
///
/// `Retry-After` in seconds takes precedence over an epoch-seconds
/// `x-ratelimit-reset`. `now_epoch` is injected for testability.
pub fn rate_limit_wait(headers: &HeaderMap, now_epoch: i64) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };
    if let Some(secs) = header("retry-after") {
        return Some(Duration::from_secs(secs.max(0) as u64));
    }
    header("x-ratelimit-reset").map(|reset| Duration::from_secs((reset - now_epoch).max(0) as u64))
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

/// Send the request produced by `build`, retrying per `policy`.
///
/// `build` is called once per attempt since a `RequestBuilder` is consumed
/// by sending. Returns the first successful response; the final failure
/// carries the status and response body.
pub async fn send_with_retry<F>(label: &str, policy: &RetryPolicy, build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    send_accepting(label, policy, |status| status.is_success(), build).await
}

/// Like [`send_with_retry`], but any status for which `accept` returns true
/// is handed back to the caller instead of being treated as a failure.
pub async fn send_accepting<A, F>(
    label: &str,
    policy: &RetryPolicy,
    accept: A,
    build: F,
) -> Result<Response>
where
    A: Fn(StatusCode) -> bool,
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if accept(status) {
                    return Ok(response);
                }
                if should_retry(status, response.headers()) && attempt < policy.max_retries {
                    attempt += 1;
                    let delay = match rate_limit_wait(response.headers(), Utc::now().timestamp()) {
                        Some(wait) => wait.min(policy.max_rate_limit_wait),
                        None => policy.backoff(attempt),
                    };
                    warn!(
                        request = label,
                        %status,
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                bail!("{} failed ({}) after {} retries: {}", label, status, attempt, body);
            }
            Err(err) => {
                if is_retryable_error(&err) && attempt < policy.max_retries {
                    attempt += 1;
                    let delay = policy.backoff(attempt);
                    warn!(
                        request = label,
                        error = %err,
                        attempt,
                        max_retries = policy.max_retries,
                        "retrying after network error"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(anyhow::Error::new(err).context(format!("{} failed", label)));
            }
        }
    }
}
