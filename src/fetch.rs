//! Page downloads with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`PageFetch`]: capability trait for "give me the body at this URL"
//! - [`HttpFetcher`]: `reqwest` implementation with a browser user agent
//! - [`RetryFetch`]: decorator that adds retries to any [`PageFetch`]
//!
//! Adapters and the image resolver only ever see the trait, so tests swap in
//! an in-memory fetcher and never touch the network.
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```
//!
//! Client errors (4xx other than 429) and invalid URLs are not retried.

use crate::config::FetchSettings;
use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("not an http(s) url: {0:?}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidUrl(_) => false,
            FetchError::Http { .. } | FetchError::Timeout { .. } => true,
        }
    }
}

/// Anything that can download a page body.
pub trait PageFetch: Send + Sync {
    /// Fetch `url` and return its body as text. Implementations must give up
    /// after `timeout`.
    fn fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

impl<T: PageFetch> PageFetch for Arc<T> {
    fn fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, FetchError>> + Send {
        (**self).fetch(url, timeout)
    }
}

/// [`PageFetch`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

fn transport_error(url: &str, timeout: Duration, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            source,
        }
    }
}

impl PageFetch for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(url, timeout, e))?;
        debug!(
            %url,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}

/// Backoff parameters for [`RetryFetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Initial delay between retries (doubles with each attempt).
    pub base_delay: Duration,
    /// Maximum delay cap to prevent excessive waiting.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to every delay.
    pub jitter: Duration,
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_cap = self.jitter.as_millis() as u64;
        let jitter_ms: u64 = if jitter_cap == 0 {
            0
        } else {
            rng().random_range(0..=jitter_cap)
        };
        delay + Duration::from_millis(jitter_ms)
    }
}

impl From<&FetchSettings> for RetryPolicy {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            max_delay: Duration::from_millis(settings.retry_max_delay_ms),
            jitter: Duration::from_millis(settings.retry_jitter_ms),
        }
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`PageFetch`].
pub struct RetryFetch<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: PageFetch> RetryFetch<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T: PageFetch> PageFetch for RetryFetch<T> {
    #[instrument(level = "debug", skip(self, timeout))]
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            match self.inner.fetch(url, timeout).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    let total_ms = total_t0.elapsed().as_millis() as u64;

                    if attempt > self.policy.max_retries || !e.is_retryable() {
                        debug!(
                            attempt,
                            max = self.policy.max_retries,
                            elapsed_ms_total = total_ms,
                            error = %e,
                            "fetch gave up"
                        );
                        return Err(e);
                    }

                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.policy.max_retries,
                        elapsed_ms_total = total_ms,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::StaticFetch;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a 503 `failures` times before serving `body`.
    struct Flaky {
        failures: u32,
        attempts: AtomicU32,
    }

    impl PageFetch for Flaky {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                })
            } else {
                Ok("body".to_string())
            }
        }
    }

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let flaky = Flaky {
            failures: 2,
            attempts: AtomicU32::new(0),
        };
        let fetcher = RetryFetch::new(flaky, quick_policy(3));
        let body = fetcher.fetch("https://a.test/", Duration::from_secs(1)).await.unwrap();
        assert_eq!(body, "body");
        assert_eq!(fetcher.inner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let flaky = Flaky {
            failures: 10,
            attempts: AtomicU32::new(0),
        };
        let fetcher = RetryFetch::new(flaky, quick_policy(2));
        let err = fetcher.fetch("https://a.test/", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert_eq!(fetcher.inner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let fetcher = RetryFetch::new(StaticFetch::new(), quick_policy(5));
        let err = fetcher.fetch("https://a.test/missing", Duration::from_secs(1)).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(fetcher.inner.call_count("https://a.test/missing"), 1);
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_non_http_urls() {
        let fetcher = HttpFetcher::new("test-agent").unwrap();
        let err = fetcher.fetch("ftp://a.test/", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for(64), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy {
            jitter: Duration::from_millis(250),
            ..quick_policy(1)
        };
        for _ in 0..20 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(1));
            assert!(delay <= Duration::from_millis(251));
        }
    }
}
