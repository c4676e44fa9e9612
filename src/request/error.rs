//! Request error taxonomy
//!
//! Every failure an API call can produce is a [`RequestError`]. The executor
//! uses [`RequestError::retry_class`] to decide whether to back off and try
//! again, and the stateful handle turns terminal failures into a localized
//! message with [`RequestError::user_message`].

use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use thiserror::Error;

use super::messages::Locale;

/// Raw OS error codes that mean the local machine ran out of sockets/buffers
const RESOURCE_EXHAUSTION_CODES: [i32; 3] = [
    23,  // ENFILE
    24,  // EMFILE
    105, // ENOBUFS
];

/// Errors that can occur while performing an API request
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// The server answered with a non-success status
    #[error("HTTP {status}{}", status_suffix(.message))]
    Status {
        /// HTTP status code
        status: u16,
        /// Server-supplied `Retry-After`, if present and parseable
        retry_after: Option<Duration>,
        /// `message` field of a JSON error body, if any
        message: Option<String>,
    },

    /// The HTTP client gave up waiting for a response
    #[error("request timed out")]
    Timeout,

    /// The local machine could not allocate a connection
    #[error("insufficient local resources: {0}")]
    ResourceExhausted(String),

    /// No response was received (DNS, refused connection, reset, ...)
    #[error("no response from server: {0}")]
    Network(String),

    /// The response body did not have the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// How the executor should treat a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// HTTP 429; may carry a server-requested wait
    RateLimited {
        /// Wait requested via `Retry-After`
        retry_after: Option<Duration>,
    },
    /// Server error, timeout, resource exhaustion or network failure
    Transient,
    /// Not worth retrying
    Fatal,
}

impl RequestError {
    /// Creates a status error with no extra detail
    pub fn status(status: u16) -> Self {
        RequestError::Status {
            status,
            retry_after: None,
            message: None,
        }
    }

    /// Returns the HTTP status code, if the server responded
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classifies the error for retry purposes
    pub fn retry_class(&self) -> RetryClass {
        match self {
            RequestError::Status {
                status: 429,
                retry_after,
                ..
            } => RetryClass::RateLimited {
                retry_after: *retry_after,
            },
            RequestError::Status { status, .. } if *status >= 500 => RetryClass::Transient,
            RequestError::Status { .. } | RequestError::Decode(_) => RetryClass::Fatal,
            RequestError::Timeout
            | RequestError::ResourceExhausted(_)
            | RequestError::Network(_) => RetryClass::Transient,
        }
    }

    /// Returns true if the executor would retry this error
    pub fn is_retryable(&self) -> bool {
        self.retry_class() != RetryClass::Fatal
    }

    /// Returns a human-readable message for end users in the given locale
    ///
    /// The message is chosen by error class; for other client errors the
    /// server-provided message is preferred over the generic fallback.
    pub fn user_message(&self, locale: Locale) -> String {
        let messages = locale.messages();
        match self {
            RequestError::Status { status: 429, .. } => messages.too_many_requests.to_string(),
            RequestError::Status { status, .. } if *status >= 500 => {
                messages.server_error.to_string()
            }
            RequestError::Status {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            RequestError::Timeout => messages.timed_out.to_string(),
            RequestError::Network(_) | RequestError::ResourceExhausted(_) => {
                messages.connection_error.to_string()
            }
            RequestError::Status { .. } | RequestError::Decode(_) => messages.generic.to_string(),
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RequestError::Timeout
        } else if is_resource_exhaustion(&err) {
            RequestError::ResourceExhausted(err.to_string())
        } else if err.is_decode() {
            RequestError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RequestError::status(status.as_u16())
        } else {
            RequestError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        RequestError::Decode(err.to_string())
    }
}

fn status_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

/// Walks the source chain looking for an OS-level allocation failure
fn is_resource_exhaustion(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::OutOfMemory {
                return true;
            }
            if let Some(code) = io_err.raw_os_error() {
                if RESOURCE_EXHAUSTION_CODES.contains(&code) {
                    return true;
                }
            }
        }
        source = current.source();
    }
    false
}

/// Parses a `Retry-After` header value given in whole seconds
///
/// Returns `None` for anything else (HTTP dates, fractions, negative or
/// garbage values) so the caller falls back to its computed backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
