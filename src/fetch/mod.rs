//! Article file fetching with a shared retry policy.
//!
//! This module provides the HTTP plumbing for the whole pipeline:
//!
//! - [`HttpClient`] - reusable client with preservation-sized timeouts
//! - [`RetryPolicy`] - one retry/backoff policy injected everywhere network
//!   I/O happens (list fetches, registry lookups, file downloads)
//! - [`ArticleFetcher`] - downloads the raw materials for one article
//!
//! A file the source says does not exist (404/410) or serves empty is an
//! expected condition in publishing workflows; the fetcher reports it as an
//! absent file rather than an error, and the caller records the article
//! accordingly.

mod client;
mod error;
mod retry;

pub use client::{CONNECT_TIMEOUT_SECS, HttpClient, READ_TIMEOUT_SECS};
pub use error::FetchError;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error,
};

use futures_util::future::join_all;
use tracing::{debug, instrument, warn};

use crate::article::ArticleDescriptor;

/// One fetched image payload, paired with the URL it came from (the URL's
/// file stem is the fallback name when the markup names no graphic).
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Source URL of the image.
    pub url: String,
    /// Undecoded image bytes as served.
    pub bytes: Vec<u8>,
}

/// The raw materials fetched for one article, before validation and
/// conversion.
#[derive(Debug, Default)]
pub struct RawBundle {
    /// PDF bytes; `None` when the source lists no PDF, says it is gone, or
    /// serves an empty file.
    pub pdf: Option<Vec<u8>>,
    /// Structured-markup (JATS XML) bytes, with the same absence rules.
    pub jats: Option<Vec<u8>>,
    /// Images that were fetched successfully.
    pub images: Vec<RawImage>,
    /// How many images the article's list entry advertised. Compared against
    /// `images.len()` to tell "nothing expected" from "everything failed".
    pub images_expected: usize,
}

/// Fetches a URL through the shared retry policy.
///
/// Transient failures (timeouts, 5xx, rate limiting) are retried with
/// backoff; permanent failures return immediately.
///
/// # Errors
///
/// Returns the final `FetchError` once the policy declines to retry.
#[instrument(skip(client, policy), fields(url = %url))]
pub async fn get_with_retry(
    client: &HttpClient,
    policy: &RetryPolicy,
    url: &str,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 1;
    loop {
        match client.get_bytes(url).await {
            Ok(bytes) => return Ok(bytes),
            Err(error) => {
                let failure = classify_error(&error);
                match policy.should_retry(failure, attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "fetch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = next_attempt;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(attempt, %reason, "giving up on fetch");
                        return Err(error);
                    }
                }
            }
        }
    }
}

/// Downloads the raw files for one article.
///
/// Shares its [`HttpClient`] and [`RetryPolicy`] with the rest of the run.
#[derive(Debug, Clone)]
pub struct ArticleFetcher {
    client: HttpClient,
    retry: RetryPolicy,
}

impl ArticleFetcher {
    /// Creates a fetcher over an existing client and retry policy.
    #[must_use]
    pub fn new(client: HttpClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Fetches PDF, markup, and images for one article.
    ///
    /// Absent or empty files come back as `None`/missing entries in the
    /// bundle; only transport failures that survive the retry policy are
    /// errors, and they fail just this article.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` when a download fails for a reason other than
    /// "the source does not have this file" after retries are exhausted.
    #[instrument(skip(self, descriptor), fields(doi = %descriptor.doi))]
    pub async fn fetch(&self, descriptor: &ArticleDescriptor) -> Result<RawBundle, FetchError> {
        let pdf = match descriptor.pdf_url.as_deref() {
            Some(url) if !url.is_empty() => self.fetch_optional(url).await?,
            _ => {
                warn!(doi = %descriptor.doi, "article lists no PDF source");
                None
            }
        };

        let jats = match descriptor.jats_url.as_deref() {
            Some(url) if !url.is_empty() => self.fetch_optional(url).await?,
            _ => {
                warn!(doi = %descriptor.doi, "article lists no markup source");
                None
            }
        };

        let image_urls: Vec<&str> = descriptor
            .image_url
            .as_deref()
            .into_iter()
            .filter(|url| !url.is_empty())
            .collect();
        let images_expected = image_urls.len();

        let fetched = join_all(
            image_urls
                .iter()
                .map(|url| self.fetch_image(url)),
        )
        .await;
        let images = fetched.into_iter().flatten().collect();

        Ok(RawBundle {
            pdf,
            jats,
            images,
            images_expected,
        })
    }

    /// Fetches a file, mapping "not there" and "empty" onto `None`.
    async fn fetch_optional(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        match get_with_retry(&self.client, &self.retry, url).await {
            Ok(bytes) if bytes.is_empty() => {
                warn!(url, "server returned an empty file");
                Ok(None)
            }
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.is_not_found() => {
                warn!(url, "file not available at source");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Fetches one image; any failure degrades the article rather than
    /// aborting it, so errors collapse to `None` here with a warning.
    async fn fetch_image(&self, url: &str) -> Option<RawImage> {
        match self.fetch_optional(url).await {
            Ok(Some(bytes)) => Some(RawImage {
                url: url.to_string(),
                bytes,
            }),
            Ok(None) => None,
            Err(error) => {
                warn!(url, error = %error, "image download failed");
                None
            }
        }
    }
}
