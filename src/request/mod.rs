//! Resilient request layer
//!
//! Wraps async API calls with a shared response cache, per-key request
//! spacing, and exponential-backoff retry for transient failures:
//!
//! - [`backoff`]: retry policy and delay math
//! - [`executor`]: the attempt loop
//! - [`handle`]: observable state for UI code, with supersede-on-reissue
//!
//! The cache itself lives in [`crate::cache`] and is shared by every handle.

pub mod backoff;
pub mod error;
pub mod executor;
pub mod handle;
pub mod messages;

pub use backoff::{backoff_delay, delay_for, RetryPolicy};
pub use error::{parse_retry_after, RequestError, RetryClass};
pub use executor::{RequestExecutor, RequestOptions};
pub use handle::{RequestHandle, RequestState};
pub use messages::Locale;
