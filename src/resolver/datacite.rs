//! DataCite registry client.
//!
//! DataCite's REST API wraps each DOI record in JSON whose `attributes.xml`
//! field carries the registered metadata as base64-encoded DataCite resource
//! XML. The client decodes that envelope and extracts the fields the
//! archive metadata writer needs.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::fetch::{HttpClient, RetryPolicy, get_with_retry};

use super::{MetadataRecord, MetadataRegistry, RegistryKind, ResolveError};

/// Default DataCite API base URL.
const DEFAULT_BASE_URL: &str = "https://api.datacite.org";

// ==================== DataCite API Response Types ====================

/// Top-level DataCite REST API response.
#[derive(Debug, Deserialize)]
pub(crate) struct DataciteResponse {
    pub data: DataciteData,
}

/// The `data` member of a DOI response.
#[derive(Debug, Deserialize)]
pub(crate) struct DataciteData {
    pub attributes: DataciteAttributes,
}

/// The attributes we consume from a DOI record.
#[derive(Debug, Deserialize)]
pub(crate) struct DataciteAttributes {
    /// Base64-encoded DataCite resource XML, when deposited.
    pub xml: Option<String>,
    /// Timestamp at which the DOI was registered.
    pub registered: Option<String>,
}

// ==================== DataCite Client ====================

/// Registry client for DataCite.
#[derive(Debug, Clone)]
pub struct DataCite {
    client: HttpClient,
    retry: RetryPolicy,
    base_url: String,
}

impl DataCite {
    /// Creates a client against the production DataCite API.
    #[must_use]
    pub fn new(client: HttpClient, retry: RetryPolicy) -> Self {
        Self::with_base_url(client, retry, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(
        client: HttpClient,
        retry: RetryPolicy,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            retry,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MetadataRegistry for DataCite {
    fn name(&self) -> &'static str {
        "datacite"
    }

    fn kind(&self) -> RegistryKind {
        RegistryKind::DataCite
    }

    #[instrument(skip(self), fields(registry = "datacite"))]
    async fn lookup(&self, doi: &str) -> Result<Option<MetadataRecord>, ResolveError> {
        let url = format!("{}/dois/{}", self.base_url, urlencoding::encode(doi));
        debug!(api_url = %url, "calling DataCite API");

        let bytes = match get_with_retry(&self.client, &self.retry, &url).await {
            Ok(bytes) => bytes,
            Err(error) if error.is_not_found() => {
                debug!(%doi, "DOI not found in DataCite");
                return Ok(None);
            }
            Err(error) => return Err(ResolveError::registry("datacite", doi, error)),
        };

        let response: DataciteResponse = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(%doi, %error, "unexpected DataCite response format");
                return Ok(None);
            }
        };
        let attributes = response.data.attributes;

        let Some(encoded) = attributes.xml else {
            warn!(%doi, "DataCite record carries no metadata XML");
            return Ok(None);
        };
        let decoded = match STANDARD.decode(encoded.trim().as_bytes()) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(%doi, %error, "DataCite metadata XML is not valid base64");
                return Ok(None);
            }
        };
        let xml = String::from_utf8_lossy(&decoded);

        let Some(fields) = parse_resource_xml(&xml) else {
            warn!(%doi, "could not interpret DataCite resource XML");
            return Ok(None);
        };
        Ok(Some(MetadataRecord {
            doi: doi.to_string(),
            title: fields.title,
            creators: fields.creators,
            journal: fields.publisher,
            publication_year: fields.publication_year,
            volume: None,
            registered: attributes.registered,
        }))
    }
}

// ==================== Resource XML Extraction ====================

/// The fields we pull out of a DataCite resource document.
#[derive(Debug, Default, PartialEq, Eq)]
struct ResourceFields {
    title: Option<String>,
    creators: Vec<String>,
    publisher: Option<String>,
    publication_year: Option<i32>,
}

/// Walks a DataCite resource document and collects the first title, all
/// creator names, the publisher, and the publication year.
///
/// Returns `None` when the document is unreadable or its root is not
/// `<resource>`. Namespace prefixes are ignored so records deposited with
/// or without a default namespace read the same.
fn parse_resource_xml(xml: &str) -> Option<ResourceFields> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fields = ResourceFields::default();
    let mut saw_resource = false;
    let mut stack: Vec<Vec<u8>> = Vec::new();
    // Per-element text, merged upward on close so markup nested inside a
    // field does not split its text.
    let mut texts: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.name().local_name().as_ref().to_vec();
                if stack.is_empty() && local == b"resource" {
                    saw_resource = true;
                }
                stack.push(local);
                texts.push(String::new());
            }
            Ok(Event::Text(t)) => {
                if let (Some(slot), Ok(value)) = (texts.last_mut(), t.unescape()) {
                    push_joined(slot, value.trim());
                }
            }
            Ok(Event::End(_)) => {
                let text = texts.pop().unwrap_or_default();
                {
                    let path: Vec<&[u8]> = stack.iter().map(Vec::as_slice).collect();
                    match path.as_slice() {
                        [b"resource", b"titles", b"title"] => {
                            if fields.title.is_none() && !text.is_empty() {
                                fields.title = Some(text.clone());
                            }
                        }
                        [b"resource", b"creators", b"creator", b"creatorName"] => {
                            if !text.is_empty() {
                                fields.creators.push(text.clone());
                            }
                        }
                        [b"resource", b"publisher"] => {
                            if !text.is_empty() {
                                fields.publisher = Some(text.clone());
                            }
                        }
                        [b"resource", b"publicationYear"] => {
                            if fields.publication_year.is_none() {
                                fields.publication_year = text.parse().ok();
                            }
                        }
                        _ => {}
                    }
                }
                stack.pop();
                if let Some(parent) = texts.last_mut() {
                    push_joined(parent, &text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "unreadable DataCite resource XML");
                return None;
            }
        }
    }
    saw_resource.then_some(fields)
}

fn push_joined(dst: &mut String, piece: &str) {
    if piece.is_empty() {
        return;
    }
    if !dst.is_empty() {
        dst.push(' ');
    }
    dst.push_str(piece);
}
