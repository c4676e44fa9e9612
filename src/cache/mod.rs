//! Cache module for API responses and request pacing
//!
//! This module provides a cache manager that keeps API responses in memory
//! with configurable TTL (time-to-live) values, alongside a ledger of when the
//! last request under each key was dispatched. Nothing is persisted; the
//! cache lives for the lifetime of the process.

mod manager;

pub use manager::{CacheManager, CacheStats, CachedData};
