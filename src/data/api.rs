//! HTTP client for the photo-processing REST API
//!
//! Each method performs exactly one HTTP round-trip and maps failures to
//! [`RequestError`]; retrying and caching are layered on top by
//! [`crate::request`].

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, ClientBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Category, CreditBalance, Job};
use crate::request::{parse_retry_after, RequestError};

/// Default base URL of the API
pub const DEFAULT_API_URL: &str = "http://localhost:3001";

/// Default HTTP timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON error body returned by the API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the photo-processing API
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL without trailing slash
    base_url: String,
    /// Bearer token sent with every request
    token: Option<String>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::with_client(Client::new(), DEFAULT_API_URL)
    }
}

impl ApiClient {
    /// Creates a client for `base_url` whose requests time out after `timeout`
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("pixelflow/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http_client, base_url))
    }

    /// Creates a client with a custom HTTP client
    pub fn with_client(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Sets the bearer token used for authentication
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches every job belonging to the user, newest first
    pub async fn list_jobs(&self) -> Result<Vec<Job>, RequestError> {
        let mut jobs: Vec<Job> = self.get_json("/api/jobs").await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    /// Fetches a single job
    pub async fn get_job(&self, job_id: &str) -> Result<Job, RequestError> {
        self.get_json(&format!("/api/jobs/{}", job_id)).await
    }

    /// Fetches the available processing categories
    pub async fn list_categories(&self) -> Result<Vec<Category>, RequestError> {
        self.get_json("/api/categories").await
    }

    /// Fetches the user's credit balance
    pub async fn credit_balance(&self) -> Result<CreditBalance, RequestError> {
        self.get_json("/api/credits").await
    }

    /// Downloads a processed image
    ///
    /// The bearer token is only attached when `url` has the API's origin
    /// (scheme, host and port).
    pub async fn download_image(&self, url: &str) -> Result<Vec<u8>, RequestError> {
        let mut request = self.http_client.get(url);
        if self.is_api_origin(url) {
            if let Some(ref token) = self.token {
                request = request.bearer_auth(token);
            }
        }

        let response = check_status(request.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn is_api_origin(&self, url: &str) -> bool {
        match (Url::parse(url), Url::parse(&self.base_url)) {
            (Ok(target), Ok(base)) => target.origin() == base.origin(),
            _ => false,
        }
    }

    /// GETs `path` relative to the base URL and decodes the JSON body
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");

        let mut request = self.http_client.get(&url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = check_status(request.send().await?).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Turns a non-success response into [`RequestError::Status`]
async fn check_status(response: Response) -> Result<Response, RequestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);

    // The body is best-effort; a failure reading it must not mask the status
    let message = response
        .text()
        .await
        .ok()
        .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
        .and_then(|body| body.message);

    debug!(status = status.as_u16(), ?retry_after, "API returned error status");
    Err(RequestError::Status {
        status: status.as_u16(),
        retry_after,
        message,
    })
}
