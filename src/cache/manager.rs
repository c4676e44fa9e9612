//! Cache manager holding API responses and request timestamps in memory
//!
//! Provides a `CacheManager` that stores serializable responses with a TTL and
//! tracks when the last request under each key was dispatched, so callers can
//! space out requests to the same endpoint.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// A cached response and its validity window
#[derive(Debug, Clone)]
struct CacheEntry {
    /// The cached payload
    data: serde_json::Value,
    /// Monotonic insertion time, used for expiry
    stored_at: Instant,
    /// Wall-clock insertion time, used for display
    cached_at: DateTime<Utc>,
    /// How long the entry stays valid
    ttl: Duration,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.ttl
    }
}

/// Result of reading from cache, including when the data was stored
#[derive(Debug, Clone, PartialEq)]
pub struct CachedData<T> {
    /// The cached data
    pub data: T,
    /// When the data was originally cached
    pub cached_at: DateTime<Utc>,
}

/// Counts of what the cache currently holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of stored responses, including not-yet-evicted stale ones
    pub entries: usize,
    /// Number of keys with a recorded request timestamp
    pub tracked_keys: usize,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Key -> instant of the most recently initiated request
    last_requests: HashMap<String, Instant>,
}

/// Shared response cache and per-key request ledger
///
/// Cloning a `CacheManager` yields another handle to the same underlying
/// maps; construct one at startup and hand clones to every consumer. Expired
/// entries are evicted lazily when read, or in bulk by [`CacheManager::sweep`].
#[derive(Debug, Clone, Default)]
pub struct CacheManager {
    inner: Arc<Mutex<Inner>>,
}

impl CacheManager {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key` if present and unexpired
    ///
    /// A stale entry is removed by this call. An entry that cannot be
    /// deserialized as `T` is treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read(key).map(|cached| cached.data)
    }

    /// Like [`CacheManager::get`], but also returns when the entry was stored
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let entry = inner.entries.get(key)?;
        if !entry.is_valid(now) {
            debug!(key, "cache entry expired");
            inner.entries.remove(key);
            return None;
        }

        let cached_at = entry.cached_at;
        match serde_json::from_value(entry.data.clone()) {
            Ok(data) => {
                trace!(key, "cache hit");
                Some(CachedData { data, cached_at })
            }
            Err(e) => {
                debug!(key, error = %e, "cache entry has unexpected shape");
                None
            }
        }
    }

    /// Returns when the unexpired entry under `key` was stored
    pub fn cached_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .get(key)
            .filter(|entry| entry.is_valid(now))
            .map(|entry| entry.cached_at)
    }

    /// Stores `data` under `key`, replacing any existing entry
    ///
    /// # Errors
    /// Returns an error if `data` cannot be represented as JSON.
    pub fn set<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        ttl: Duration,
    ) -> Result<(), serde_json::Error> {
        let entry = CacheEntry {
            data: serde_json::to_value(data)?,
            stored_at: Instant::now(),
            cached_at: Utc::now(),
            ttl,
        };

        self.inner.lock().entries.insert(key.to_string(), entry);
        trace!(key, ttl_ms = ttl.as_millis() as u64, "cache entry stored");
        Ok(())
    }

    /// Removes the cached response for `key`, leaving its request timestamp
    pub fn invalidate(&self, key: &str) {
        if self.inner.lock().entries.remove(key).is_some() {
            debug!(key, "cache entry invalidated");
        }
    }

    /// Returns true if a request under `key` may be dispatched now
    pub fn can_proceed(&self, key: &str, min_interval: Duration) -> bool {
        self.remaining_wait(key, min_interval).is_zero()
    }

    /// Returns how long a caller must wait before dispatching under `key`
    pub fn remaining_wait(&self, key: &str, min_interval: Duration) -> Duration {
        let inner = self.inner.lock();
        wait_after(inner.last_requests.get(key).copied(), min_interval, Instant::now())
    }

    /// Records that a request under `key` is being dispatched now
    pub fn record_attempt(&self, key: &str) {
        self.inner
            .lock()
            .last_requests
            .insert(key.to_string(), Instant::now());
    }

    /// Reserves the next dispatch slot for `key` and returns how long to wait
    ///
    /// The wait check and the timestamp update happen under one lock: the
    /// recorded instant is `now + wait`, so a concurrent caller reserving the
    /// same key is queued behind this one instead of dispatching alongside it.
    pub fn reserve(&self, key: &str, min_interval: Duration) -> Duration {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let wait = wait_after(inner.last_requests.get(key).copied(), min_interval, now);
        inner.last_requests.insert(key.to_string(), now + wait);

        if !wait.is_zero() {
            debug!(key, wait_ms = wait.as_millis() as u64, "rate limit slot reserved");
        }
        wait
    }

    /// Drops every cached response and every request timestamp
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.last_requests.clear();
        debug!("cache cleared");
    }

    /// Evicts expired responses and request timestamps older than `idle`
    ///
    /// Returns the total number of removed items.
    pub fn sweep(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let before = inner.entries.len() + inner.last_requests.len();
        inner.entries.retain(|_, entry| entry.is_valid(now));
        inner
            .last_requests
            .retain(|_, last| now.saturating_duration_since(*last) < idle);
        let removed = before - (inner.entries.len() + inner.last_requests.len());

        if removed > 0 {
            debug!(removed, "cache sweep evicted items");
        }
        removed
    }

    /// Returns counts of stored entries and tracked keys
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            tracked_keys: inner.last_requests.len(),
        }
    }
}

/// Time left until `last + min_interval`, or zero if nothing was recorded
fn wait_after(last: Option<Instant>, min_interval: Duration, now: Instant) -> Duration {
    match last {
        Some(last) => (last + min_interval).saturating_duration_since(now),
        None => Duration::ZERO,
    }
}
