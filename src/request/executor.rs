//! Request executor with rate limiting, caching and retry
//!
//! Runs a caller-supplied async request function, spacing out requests that
//! share a cache key, storing successful responses, and retrying transient
//! failures with exponential backoff.

use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::backoff::{backoff_delay, delay_for, RetryPolicy};
use super::error::{RequestError, RetryClass};
use crate::cache::CacheManager;

/// Default time a successful response stays cached
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Default minimum spacing between requests under one cache key
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

/// Per-call configuration for the executor
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Key under which responses are cached and requests are paced
    pub cache_key: Option<String>,
    /// How long a successful response stays cached
    pub cache_duration: Duration,
    /// Minimum spacing between requests under `cache_key`
    pub rate_limit_delay: Duration,
    /// Retry behavior for transient failures
    pub retry: RetryPolicy,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cache_key: None,
            cache_duration: DEFAULT_CACHE_DURATION,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            retry: RetryPolicy::default(),
        }
    }
}

impl RequestOptions {
    /// Options with a cache key and default settings
    pub fn cached(key: impl Into<String>) -> Self {
        Self {
            cache_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with_cache_duration(mut self, cache_duration: Duration) -> Self {
        self.cache_duration = cache_duration;
        self
    }

    pub fn with_rate_limit_delay(mut self, rate_limit_delay: Duration) -> Self {
        self.rate_limit_delay = rate_limit_delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Runs requests against a shared [`CacheManager`]
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    cache: CacheManager,
    options: RequestOptions,
}

impl RequestExecutor {
    /// Creates an executor using the given shared cache
    pub fn new(cache: CacheManager, options: RequestOptions) -> Self {
        Self { cache, options }
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Performs the request, retrying transient failures
    ///
    /// The cache is written on success but never read here; cache lookups
    /// are the caller's decision (see [`super::RequestHandle::request`]).
    pub async fn execute<T, F, Fut>(&self, request_fn: F) -> Result<T, RequestError>
    where
        T: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        self.execute_with(request_fn, |_| {}).await
    }

    /// Like [`RequestExecutor::execute`], calling `on_retry` with the 1-based
    /// retry number before each backoff wait
    pub async fn execute_with<T, F, Fut, R>(
        &self,
        mut request_fn: F,
        mut on_retry: R,
    ) -> Result<T, RequestError>
    where
        T: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
        R: FnMut(u32),
    {
        let key = self.options.cache_key.as_deref();
        let mut attempt: u32 = 0;

        loop {
            if let Some(key) = key {
                let wait = self.cache.reserve(key, self.options.rate_limit_delay);
                delay_for(wait).await;
            }

            let error = match request_fn().await {
                Ok(data) => {
                    if let Some(key) = key {
                        if let Err(e) = self.cache.set(key, &data, self.options.cache_duration) {
                            warn!(key, error = %e, "failed to cache response");
                        }
                    }
                    if attempt > 0 {
                        debug!(key, attempt, "request succeeded after retry");
                    }
                    return Ok(data);
                }
                Err(error) => error,
            };

            let Some(delay) = self.retry_delay(&error, attempt) else {
                debug!(key, attempt, error = %error, "request failed");
                return Err(error);
            };

            attempt += 1;
            warn!(
                key,
                retry = attempt,
                max_retries = self.options.retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient request failure, backing off"
            );
            on_retry(attempt);
            delay_for(delay).await;
        }
    }

    /// Returns the wait before retrying, or `None` if the error is terminal
    fn retry_delay(&self, error: &RequestError, attempt: u32) -> Option<Duration> {
        let policy = &self.options.retry;
        if attempt >= policy.max_retries {
            return None;
        }

        match error.retry_class() {
            // A server-supplied wait is capped like any other backoff
            RetryClass::RateLimited { retry_after } => Some(
                retry_after
                    .map(|wait| wait.min(policy.max_delay))
                    .unwrap_or_else(|| backoff_delay(attempt, policy)),
            ),
            RetryClass::Transient => Some(backoff_delay(attempt, policy)),
            RetryClass::Fatal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Request function that fails with the given errors in order, then succeeds
    fn scripted(
        failures: Vec<RequestError>,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, RequestError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let result = match failures.get(n as usize) {
                Some(err) => Err(err.clone()),
                None => Ok(42),
            };
            std::future::ready(result)
        }
    }

    fn executor(options: RequestOptions) -> RequestExecutor {
        RequestExecutor::new(CacheManager::new(), options)
    }

    #[test]
    fn test_default_options() {
        let options = RequestOptions::default();
        assert!(options.cache_key.is_none());
        assert_eq!(options.cache_duration, Duration::from_secs(300));
        assert_eq!(options.rate_limit_delay, Duration::from_secs(1));
        assert_eq!(options.retry, RetryPolicy::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = executor(RequestOptions::default())
            .execute(scripted(vec![], calls.clone()))
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut retries = Vec::new();

        let result = executor(RequestOptions::default())
            .execute_with(
                scripted(
                    vec![RequestError::status(429), RequestError::status(429)],
                    calls.clone(),
                ),
                |n| retries.push(n),
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2], "Retry count should reach exactly 2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_fails_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let options = RequestOptions::default().with_retry(RetryPolicy {
            max_retries: 10,
            ..RetryPolicy::default()
        });

        let result = executor(options)
            .execute(scripted(vec![RequestError::status(404)], calls.clone()))
            .await;

        assert_eq!(result.unwrap_err().status_code(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_exhausts_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let failures = vec![RequestError::status(503); 10];

        let result = executor(RequestOptions::default())
            .execute(scripted(failures, calls.clone()))
            .await;

        assert_eq!(result.unwrap_err().status_code(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 4, "1 initial attempt + 3 retries");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_between_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = executor(RequestOptions::default())
            .execute(scripted(
                vec![RequestError::Timeout, RequestError::Network("reset".into())],
                calls.clone(),
            ))
            .await;

        assert!(result.is_ok());
        // 1000ms + 2000ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_overrides_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let throttled = RequestError::Status {
            status: 429,
            retry_after: Some(Duration::from_secs(7)),
            message: None,
        };

        let result = executor(RequestOptions::default())
            .execute(scripted(vec![throttled], calls.clone()))
            .await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_capped_at_max_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let throttled = RequestError::Status {
            status: 429,
            retry_after: Some(Duration::from_secs(3600)),
            message: None,
        };

        let result = executor(RequestOptions::default())
            .execute(scripted(vec![throttled], calls.clone()))
            .await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(30), "Capped at max_delay");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_ignored_for_server_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let unavailable = RequestError::Status {
            status: 503,
            retry_after: Some(Duration::from_secs(20)),
            message: None,
        };

        executor(RequestOptions::default())
            .execute(scripted(vec![unavailable], calls.clone()))
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_cached_under_key() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = executor(RequestOptions::cached("answer"));

        exec.execute(scripted(vec![], calls)).await.unwrap();

        assert_eq!(exec.cache().get::<u32>("answer"), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = executor(RequestOptions::cached("broken").with_retry(RetryPolicy::no_retry()));

        let result = exec
            .execute(scripted(vec![RequestError::status(500)], calls))
            .await;

        assert!(result.is_err());
        assert!(exec.cache().get::<u32>("broken").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_under_same_key_are_spaced() {
        let cache = CacheManager::new();
        let options = RequestOptions::cached("jobs").with_rate_limit_delay(Duration::from_secs(2));
        let exec = RequestExecutor::new(cache, options);
        let start = Instant::now();

        exec.execute(|| async { Ok::<_, RequestError>(1) }).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        exec.execute(|| async { Ok::<_, RequestError>(2) }).await.unwrap();
        assert_eq!(
            start.elapsed(),
            Duration::from_secs(2),
            "Second request waits out the courtesy delay"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_without_key_are_not_spaced() {
        let exec = executor(RequestOptions::default());
        let start = Instant::now();

        for _ in 0..3 {
            exec.execute(|| async { Ok::<_, RequestError>(()) }).await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_retries_makes_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let options = RequestOptions::default().with_retry(RetryPolicy::no_retry());

        let result = executor(options)
            .execute(scripted(vec![RequestError::status(429)], calls.clone()))
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
