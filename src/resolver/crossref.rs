//! Crossref registry client.
//!
//! Crossref's works API returns the registered metadata as JSON; no
//! embedded XML envelope is involved. The client extracts the fields the
//! archive metadata writer needs from the `message` object.
//!
//! # Polite Pool
//!
//! All requests include a `mailto` query parameter to access Crossref's
//! polite pool, which provides higher rate limits (10 req/s vs 5 req/s).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::fetch::{HttpClient, RetryPolicy, get_with_retry};

use super::{MetadataRecord, MetadataRegistry, RegistryKind, ResolveError};

/// Default Crossref API base URL.
const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

// ==================== Crossref API Response Types ====================

/// Top-level Crossref API response.
#[derive(Debug, Deserialize)]
pub(crate) struct CrossrefResponse {
    pub status: String,
    pub message: CrossrefMessage,
}

/// The `message` field from a Crossref works response.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct CrossrefMessage {
    pub title: Option<Vec<String>>,
    pub author: Option<Vec<CrossrefAuthor>>,
    pub container_title: Option<Vec<String>>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub created: Option<CrossrefCreated>,
    pub published: Option<CrossrefDate>,
    pub published_print: Option<CrossrefDate>,
    pub published_online: Option<CrossrefDate>,
}

/// An author entry from the Crossref response.
#[derive(Debug, Deserialize)]
pub(crate) struct CrossrefAuthor {
    pub given: Option<String>,
    pub family: Option<String>,
}

/// The `created` field, which records DOI registration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct CrossrefCreated {
    pub date_time: Option<String>,
}

/// A date entry from the Crossref response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct CrossrefDate {
    pub date_parts: Option<Vec<Vec<Option<i32>>>>,
}

// ==================== Crossref Client ====================

/// Registry client for Crossref.
#[derive(Debug, Clone)]
pub struct Crossref {
    client: HttpClient,
    retry: RetryPolicy,
    base_url: String,
    mailto: String,
}

impl Crossref {
    /// Creates a client against the production Crossref API, configured for
    /// the polite pool.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when `mailto` contains control characters
    /// that cannot appear in a request.
    pub fn new(
        client: HttpClient,
        retry: RetryPolicy,
        mailto: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        Self::with_base_url(client, retry, mailto, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when `mailto` contains control characters
    /// that cannot appear in a request.
    pub fn with_base_url(
        client: HttpClient,
        retry: RetryPolicy,
        mailto: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        let mailto = mailto.into();
        if mailto.chars().any(|c| c == '\n' || c == '\r' || c == '\0') {
            return Err(ResolveError::configuration(
                "mailto contains invalid control characters",
            ));
        }
        Ok(Self {
            client,
            retry,
            base_url: base_url.into(),
            mailto,
        })
    }
}

#[async_trait]
impl MetadataRegistry for Crossref {
    fn name(&self) -> &'static str {
        "crossref"
    }

    fn kind(&self) -> RegistryKind {
        RegistryKind::Crossref
    }

    #[instrument(skip(self), fields(registry = "crossref"))]
    async fn lookup(&self, doi: &str) -> Result<Option<MetadataRecord>, ResolveError> {
        let url = format!(
            "{}/works/{}?mailto={}",
            self.base_url,
            urlencoding::encode(doi),
            urlencoding::encode(&self.mailto)
        );
        debug!(api_url = %url, "calling Crossref API");

        let bytes = match get_with_retry(&self.client, &self.retry, &url).await {
            Ok(bytes) => bytes,
            Err(error) if error.is_not_found() => {
                debug!(%doi, "DOI not found in Crossref");
                return Ok(None);
            }
            Err(error) => return Err(ResolveError::registry("crossref", doi, error)),
        };

        let response: CrossrefResponse = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(%doi, %error, "unexpected Crossref response format");
                return Ok(None);
            }
        };
        if !response.status.eq_ignore_ascii_case("ok") {
            warn!(%doi, status = %response.status, "Crossref response status was not ok");
            return Ok(None);
        }

        Ok(Some(record_from_message(response.message, doi)))
    }
}

// ==================== Extraction Helpers ====================

/// Builds a metadata record from a Crossref works message.
fn record_from_message(message: CrossrefMessage, doi: &str) -> MetadataRecord {
    let title = message.title.as_ref().and_then(|t| t.first()).cloned();
    let journal = message
        .container_title
        .as_ref()
        .and_then(|t| t.first())
        .cloned()
        .or(message.publisher);

    let creators: Vec<String> = message
        .author
        .unwrap_or_default()
        .iter()
        .map(format_author)
        .filter(|name| !name.is_empty())
        .collect();

    // Year preference follows the registry's own: published, then
    // published-print, then published-online.
    let publication_year = extract_year(message.published.as_ref())
        .or_else(|| extract_year(message.published_print.as_ref()))
        .or_else(|| extract_year(message.published_online.as_ref()));

    MetadataRecord {
        doi: doi.to_string(),
        title,
        creators,
        journal,
        publication_year,
        volume: message.volume,
        registered: message.created.and_then(|c| c.date_time),
    }
}

fn format_author(author: &CrossrefAuthor) -> String {
    match (&author.family, &author.given) {
        (Some(family), Some(given)) => format!("{family}, {given}"),
        (Some(family), None) => family.clone(),
        (None, Some(given)) => given.clone(),
        (None, None) => String::new(),
    }
}

/// Extracts the year from a Crossref date field.
fn extract_year(date: Option<&CrossrefDate>) -> Option<i32> {
    date.and_then(|d| d.date_parts.as_ref())
        .and_then(|parts| parts.first())
        .and_then(|inner| inner.first())
        .copied()
        .flatten()
}
