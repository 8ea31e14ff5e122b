//! HTTP transport seam and transport-level retry.
//!
//! Every request issued by the engine (time indexes and tiles) goes through
//! [`RetryingClient`], which retries rate-limit and gateway failures with
//! exponential backoff before handing the final outcome to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use nowcast_common::{NowcastError, NowcastResult};
use reqwest::Client;
use tracing::warn;

/// Statuses that indicate a transient server-side condition.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("nowcast-rain/", env!("CARGO_PKG_VERSION"));

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_retryable(&self) -> bool {
        RETRYABLE_STATUSES.contains(&self.status)
    }
}

/// Issues a single GET. Implementations must enforce their own timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> NowcastResult<HttpResponse>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> NowcastResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(user_agent)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| NowcastError::InternalError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> NowcastResult<HttpResponse> {
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> NowcastError {
    if err.is_timeout() {
        NowcastError::Timeout(err.to_string())
    } else {
        NowcastError::Transport(err.to_string())
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retry)
    }
}

/// Transport wrapper that retries transient failures.
#[derive(Clone)]
pub struct RetryingClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET with retry.
    ///
    /// Returns the first non-retryable outcome, or the last outcome once
    /// retries are exhausted. Non-2xx statuses are not errors here; the
    /// caller decides what a 404 means.
    pub async fn get(&self, url: &str) -> NowcastResult<HttpResponse> {
        let mut retry = 0;
        loop {
            let outcome = self.transport.get(url).await;
            let retryable = match &outcome {
                Ok(response) => response.is_retryable(),
                Err(e) => e.is_transient(),
            };
            if !retryable || retry >= self.policy.max_retries {
                return outcome;
            }

            let delay = self.policy.delay_for(retry);
            let reason = match &outcome {
                Ok(response) => format!("HTTP {}", response.status),
                Err(e) => e.to_string(),
            };
            warn!(
                url = %url,
                reason = %reason,
                retry = retry + 1,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, retrying"
            );
            counter!("nowcast_http_retries_total").increment(1);

            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_status_classification() {
        assert!(HttpResponse::new(200, Bytes::new()).is_success());
        assert!(HttpResponse::new(204, Bytes::new()).is_success());
        assert!(HttpResponse::new(404, Bytes::new()).is_not_found());
        assert!(HttpResponse::new(503, Bytes::new()).is_retryable());
        assert!(!HttpResponse::new(403, Bytes::new()).is_retryable());
        assert!(!HttpResponse::new(404, Bytes::new()).is_retryable());
    }
}
