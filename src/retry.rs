//! HTTP retry with exponential backoff, shared by every upstream client.
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Delay before `attempt` (1-based retry number).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt.saturating_sub(1)).min(5))
    }
}

/// Send the request produced by `build`, retrying transient failures.
///
/// `build` is called once per attempt since a `RequestBuilder` is consumed
/// by `send`. `label` names the upstream in error messages.
pub async fn send_with_retry<F>(
    label: &str,
    policy: RetryPolicy,
    mut build: F,
) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.delay(attempt)).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::debug!(upstream = label, %status, attempt, "retryable upstream error");
                    last_err = Some(anyhow::anyhow!("{} error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} error {}: {}", label, status, body_text);
            }
            Err(e) => {
                tracing::debug!(upstream = label, error = %e, attempt, "upstream request failed");
                last_err = Some(anyhow::anyhow!("{} request failed: {}", label, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", label)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    /// Serves `POST /` answering with `statuses` in order, then 200.
    async fn scripted(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/",
            post(move || {
                let counter = counter.clone();
                let statuses = statuses.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let code = statuses.get(n).copied().unwrap_or(200);
                    (StatusCode::from_u16(code).unwrap(), "body")
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/", addr), hits)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy::new(10);
        assert_eq!(p.delay(1), Duration::from_secs(1));
        assert_eq!(p.delay(2), Duration::from_secs(2));
        assert_eq!(p.delay(4), Duration::from_secs(8));
        assert_eq!(p.delay(6), Duration::from_secs(32));
        assert_eq!(p.delay(9), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let (url, hits) = scripted(vec![503, 429]).await;
        let client = reqwest::Client::new();
        let resp = send_with_retry("test", fast(3), || client.post(&url))
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_fails_immediately() {
        let (url, hits) = scripted(vec![400]).await;
        let client = reqwest::Client::new();
        let err = send_with_retry("test", fast(3), || client.post(&url))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (url, hits) = scripted(vec![500, 500, 500, 500]).await;
        let client = reqwest::Client::new();
        let err = send_with_retry("test", fast(2), || client.post(&url))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
