//! HTTP client wrapper shared by article downloads, list fetches, and
//! registry lookups.
//!
//! One client instance is created per run and cloned into every stage, so
//! connection pooling works across the whole pipeline. Timeouts are long on
//! the read side: source PDFs can be large and preservation runs prefer slow
//! success over fast failure.

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::error::FetchError;
use crate::user_agent;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes, sized for article PDFs rather than
/// API calls).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// HTTP client for fetching article files and registry responses.
///
/// Designed to be created once and cloned freely; clones share the same
/// connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .timeout(std::time::Duration::from_secs(read_timeout_secs))
            .user_agent(user_agent::default_user_agent())
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches a URL and returns the response body as bytes.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns an error status (4xx, 5xx)
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|error| map_transport_error(url, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(url, error))?;
        debug!(bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }

    /// Fetches a URL and returns the response body as UTF-8 text, replacing
    /// invalid sequences.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`get_bytes`](Self::get_bytes).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Issues a GET request with extra query parameters and returns the body
    /// as bytes. Used by registry clients that need polite-pool parameters.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`get_bytes`](Self::get_bytes).
    #[instrument(skip(self, query), fields(url = %url))]
    pub async fn get_bytes_with_query(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let response = self
            .client
            .get(parsed)
            .query(query)
            .send()
            .await
            .map_err(|error| map_transport_error(url, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(url, error))?;
        Ok(body.to_vec())
    }
}

/// Maps a reqwest transport error onto our error taxonomy.
fn map_transport_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}
