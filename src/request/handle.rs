//! Stateful request handle for UI code
//!
//! A `RequestHandle` wraps a [`RequestExecutor`] and publishes the progress
//! of its current request as a [`RequestState`] that views can poll or
//! subscribe to. Issuing a new request supersedes the previous one: the older
//! future still runs to completion, but its result never reaches the state.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::error::RequestError;
use super::executor::{RequestExecutor, RequestOptions};
use super::messages::Locale;
use crate::cache::CacheManager;

/// Observable progress of the current request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    /// Last successful payload
    pub data: Option<T>,
    /// Whether a request is in flight
    pub loading: bool,
    /// Localized message for the last failure
    pub error: Option<String>,
    /// Retries made so far for the in-flight request
    pub retry_count: u32,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            retry_count: 0,
        }
    }
}

impl<T> RequestState<T> {
    /// True while a request is in flight and has already been retried
    pub fn is_retrying(&self) -> bool {
        self.loading && self.retry_count > 0
    }
}

/// Request wrapper exposing `request`, `retry` and `clear_cache`
///
/// Clones share the same state and generation, so a clone moved into a
/// spawned task supersedes (and is superseded by) the original.
#[derive(Debug)]
pub struct RequestHandle<T> {
    executor: RequestExecutor,
    locale: Locale,
    state: Arc<watch::Sender<RequestState<T>>>,
    generation: Arc<AtomicU64>,
}

impl<T> Clone for RequestHandle<T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            locale: self.locale,
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<T> RequestHandle<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Creates a handle backed by the shared cache
    pub fn new(cache: CacheManager, options: RequestOptions) -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            executor: RequestExecutor::new(cache, options),
            locale: Locale::default(),
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sets the language used for error messages
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn options(&self) -> &RequestOptions {
        self.executor.options()
    }

    /// Returns a snapshot of the current state
    pub fn state(&self) -> RequestState<T> {
        self.state.borrow().clone()
    }

    /// Returns a receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.state.subscribe()
    }

    /// Runs `request_fn` unless a fresh cached value exists
    ///
    /// Returns the payload, or `None` if the request failed (the error is in
    /// [`RequestHandle::state`]) or was superseded by a newer call.
    pub async fn request<F, Fut>(&self, request_fn: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let key = self.executor.options().cache_key.as_deref();

        if let Some(key) = key {
            if let Some(data) = self.executor.cache().get::<T>(key) {
                debug!(key, "serving request from cache");
                let cached = data.clone();
                self.apply(generation, move |state| {
                    state.data = Some(cached);
                    state.loading = false;
                    state.error = None;
                    state.retry_count = 0;
                });
                return Some(data);
            }
        }

        self.apply(generation, |state| {
            state.loading = true;
            state.error = None;
            state.retry_count = 0;
        });

        let result = self
            .executor
            .execute_with(request_fn, |retry| {
                self.apply(generation, |state| state.retry_count = retry);
            })
            .await;

        match result {
            Ok(data) => {
                let published = data.clone();
                let current = self.apply(generation, move |state| {
                    state.data = Some(published);
                    state.loading = false;
                    state.error = None;
                });
                current.then_some(data)
            }
            Err(err) => {
                let message = err.user_message(self.locale);
                let current = self.apply(generation, move |state| {
                    state.data = None;
                    state.loading = false;
                    state.error = Some(message);
                });
                if current {
                    warn!(key, error = %err, "request failed");
                }
                None
            }
        }
    }

    /// Drops this handle's cached entry, then performs a fresh request
    pub async fn retry<F, Fut>(&self, request_fn: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        self.clear_cache();
        self.request(request_fn).await
    }

    /// Drops this handle's cached entry without issuing a request
    pub fn clear_cache(&self) {
        if let Some(key) = self.executor.options().cache_key.as_deref() {
            self.executor.cache().invalidate(key);
        }
    }

    /// Applies `update` if `generation` is still the latest call
    ///
    /// The generation check runs under the channel's write lock, so a
    /// superseded call can never interleave with the newer call's updates.
    fn apply(&self, generation: u64, update: impl FnOnce(&mut RequestState<T>)) -> bool {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            update(state);
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::backoff::RetryPolicy;
    use serde::Deserialize;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        n: u32,
    }

    fn ok(n: u32) -> impl FnMut() -> std::future::Ready<Result<Payload, RequestError>> {
        move || std::future::ready(Ok(Payload { n }))
    }

    #[test]
    fn test_initial_state_is_idle() {
        let handle: RequestHandle<Payload> =
            RequestHandle::new(CacheManager::new(), RequestOptions::default());
        assert_eq!(handle.state(), RequestState::default());
        assert!(!handle.state().is_retrying());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_request_updates_state() {
        let handle = RequestHandle::new(CacheManager::new(), RequestOptions::default());

        let result = handle.request(ok(1)).await;

        assert_eq!(result, Some(Payload { n: 1 }));
        let state = handle.state();
        assert_eq!(state.data, Some(Payload { n: 1 }));
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_request_fn() {
        let cache = CacheManager::new();
        let options = RequestOptions::cached("jobs").with_cache_duration(Duration::from_millis(5000));
        let handle = RequestHandle::new(cache, options);

        assert_eq!(handle.request(ok(1)).await, Some(Payload { n: 1 }));

        tokio::time::advance(Duration::from_millis(100)).await;
        let called = Arc::new(AtomicU32::new(0));
        let counter = called.clone();
        let second = handle
            .request(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok(Payload { n: 2 }))
            })
            .await;

        assert_eq!(second, Some(Payload { n: 1 }));
        assert_eq!(called.load(Ordering::SeqCst), 0, "Cached call must not invoke fn2");
        assert_eq!(handle.state().data, Some(Payload { n: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_bypasses_rate_limit() {
        let options = RequestOptions::cached("credits").with_rate_limit_delay(Duration::from_secs(60));
        let handle = RequestHandle::new(CacheManager::new(), options);
        handle.request(ok(1)).await;

        let start = tokio::time::Instant::now();
        handle.request(ok(2)).await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bypasses_cache() {
        let handle = RequestHandle::new(CacheManager::new(), RequestOptions::cached("jobs"));
        handle.request(ok(1)).await;

        let result = handle.retry(ok(2)).await;

        assert_eq!(result, Some(Payload { n: 2 }));
        assert_eq!(handle.state().data, Some(Payload { n: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_forces_next_request() {
        let cache = CacheManager::new();
        let handle = RequestHandle::new(cache.clone(), RequestOptions::cached("jobs"));
        handle.request(ok(1)).await;

        handle.clear_cache();

        assert!(cache.get::<Payload>("jobs").is_none());
        assert_eq!(handle.request(ok(3)).await, Some(Payload { n: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_sets_localized_error() {
        let handle: RequestHandle<Payload> =
            RequestHandle::new(CacheManager::new(), RequestOptions::default()).with_locale(Locale::Es);

        let result = handle
            .request(|| std::future::ready(Err(RequestError::status(503))))
            .await;

        assert!(result.is_none());
        let state = handle.state();
        assert!(state.data.is_none());
        assert!(!state.loading);
        assert_eq!(state.retry_count, 3);
        assert_eq!(state.error.as_deref(), Some(Locale::Es.messages().server_error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_fails_without_retry_count() {
        let handle: RequestHandle<Payload> =
            RequestHandle::new(CacheManager::new(), RequestOptions::default());

        handle
            .request(|| std::future::ready(Err(RequestError::status(404))))
            .await;

        let state = handle.state();
        assert_eq!(state.retry_count, 0);
        assert!(state.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_count_observed_while_backing_off() {
        let handle = RequestHandle::new(CacheManager::new(), RequestOptions::default());
        let mut rx = handle.subscribe();
        let calls = Arc::new(AtomicU32::new(0));

        let worker = handle.clone();
        let counter = calls.clone();
        let task = tokio::spawn(async move {
            worker
                .request(move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(if n < 2 {
                        Err(RequestError::status(429))
                    } else {
                        Ok(Payload { n: 9 })
                    })
                })
                .await
        });

        let mut max_retry_seen = 0;
        let mut saw_retrying = false;
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            max_retry_seen = max_retry_seen.max(state.retry_count);
            saw_retrying |= state.is_retrying();
            if !state.loading && state.data.is_some() {
                break;
            }
        }

        assert_eq!(task.await.unwrap(), Some(Payload { n: 9 }));
        assert!(saw_retrying);
        assert_eq!(max_retry_seen, 2);
        assert_eq!(handle.state().retry_count, 2);
    }

    #[tokio::test]
    async fn test_superseded_request_is_discarded() {
        let handle: RequestHandle<Payload> = RequestHandle::new(
            CacheManager::new(),
            RequestOptions::default().with_retry(RetryPolicy::no_retry()),
        );
        let (release_first, first_gate) = oneshot::channel::<()>();
        let mut first_gate = Some(first_gate);

        let first_handle = handle.clone();
        let first = tokio::spawn(async move {
            first_handle
                .request(move || {
                    let gate = first_gate.take();
                    async move {
                        if let Some(gate) = gate {
                            let _ = gate.await;
                        }
                        Ok(Payload { n: 1 })
                    }
                })
                .await
        });

        // Wait until the first call is in flight
        let mut rx = handle.subscribe();
        while !rx.borrow_and_update().loading {
            rx.changed().await.unwrap();
        }

        let second = handle.request(ok(2)).await;
        assert_eq!(second, Some(Payload { n: 2 }));

        release_first.send(()).unwrap();
        assert_eq!(first.await.unwrap(), None, "Superseded call yields nothing");

        let state = handle.state();
        assert_eq!(state.data, Some(Payload { n: 2 }));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_superseded_failure_does_not_clobber_state() {
        let handle: RequestHandle<Payload> = RequestHandle::new(
            CacheManager::new(),
            RequestOptions::default().with_retry(RetryPolicy::no_retry()),
        );
        let (release_first, first_gate) = oneshot::channel::<()>();
        let mut first_gate = Some(first_gate);

        let first_handle = handle.clone();
        let first = tokio::spawn(async move {
            first_handle
                .request(move || {
                    let gate = first_gate.take();
                    async move {
                        if let Some(gate) = gate {
                            let _ = gate.await;
                        }
                        Err(RequestError::status(400))
                    }
                })
                .await
        });

        let mut rx = handle.subscribe();
        while !rx.borrow_and_update().loading {
            rx.changed().await.unwrap();
        }

        handle.request(ok(5)).await;
        release_first.send(()).unwrap();
        first.await.unwrap();

        let state = handle.state();
        assert_eq!(state.data, Some(Payload { n: 5 }));
        assert!(state.error.is_none());
    }
}
