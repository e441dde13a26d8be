//! Metadata resolution: turning a DOI into an authoritative metadata record.
//!
//! Each journal registers its DOIs with one registry (DataCite or Crossref),
//! but records occasionally lag publication or live only in the other
//! registry, so resolution tries the journal's preferred registry first and
//! falls back to the other **only** when the first gives a definitive
//! no-data answer. A network-level failure is never grounds for fallback;
//! it surfaces as an error for that article after retries.
//!
//! Registry implementations report "no record" as `Ok(None)`. Malformed
//! registry payloads are logged and also reported as `Ok(None)`, since a
//! response we cannot interpret gives us no data to archive.
//!
//! # Architecture
//!
//! - [`MetadataRegistry`] - Async trait each registry client implements
//! - [`MetadataResolver`] - Preference-ordered lookup loop with fallback
//! - [`MetadataRecord`] - The resolved metadata handed to the assembler
//! - [`DataCite`] - Registry client for api.datacite.org
//! - [`Crossref`] - Registry client for api.crossref.org
//!
//! # Example
//!
//! ```no_run
//! use pubarchiver_core::fetch::{HttpClient, RetryPolicy};
//! use pubarchiver_core::resolver::{Crossref, DataCite, MetadataResolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let retry = RetryPolicy::default();
//! let resolver = MetadataResolver::new(vec![
//!     Box::new(DataCite::new(client.clone(), retry.clone())),
//!     Box::new(Crossref::new(client, retry, "archiving@example.com")?),
//! ]);
//! let record = resolver.resolve("10.17912/micropub.biology.000102").await?;
//! println!("Resolved: {record:?}");
//! # Ok(())
//! # }
//! ```

mod crossref;
mod datacite;
mod error;

pub use crossref::Crossref;
pub use datacite::DataCite;
pub use error::ResolveError;

use async_trait::async_trait;
use tracing::{debug, instrument};

/// The registries the supported journals publish their DOIs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    /// DataCite (api.datacite.org).
    DataCite,
    /// Crossref (api.crossref.org).
    Crossref,
}

impl RegistryKind {
    /// Lowercase registry name, for logs and report detail text.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::DataCite => "datacite",
            Self::Crossref => "crossref",
        }
    }
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Authoritative metadata for one article, as recorded by a registry.
///
/// Fields a registry did not supply stay `None`/empty; the archive metadata
/// writer fills journal-level gaps (ISSN, derived volume) from the journal
/// connector, never by guessing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    /// The DOI the record describes.
    pub doi: String,
    /// Article title as registered.
    pub title: Option<String>,
    /// Creator names as registered, one string per person.
    pub creators: Vec<String>,
    /// Publication name as registered.
    pub journal: Option<String>,
    /// Year of publication.
    pub publication_year: Option<i32>,
    /// Volume, when the registry supplies one.
    pub volume: Option<String>,
    /// Timestamp at which the DOI was registered.
    pub registered: Option<String>,
}

/// One metadata registry's lookup capability.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via
/// `Box<dyn MetadataRegistry>`. Rust 2024 native async traits are not
/// object-safe, so `async_trait` is required for ordering registries at
/// runtime.
#[async_trait]
pub trait MetadataRegistry: Send + Sync {
    /// Registry name, for logs and report detail text.
    fn name(&self) -> &'static str;

    /// Which registry this is.
    fn kind(&self) -> RegistryKind;

    /// Looks up one DOI.
    ///
    /// Returns `Ok(None)` when the registry definitively has no usable
    /// record for the DOI: not found, or a payload that cannot be
    /// interpreted.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the registry cannot be reached at the
    /// network level after retries.
    async fn lookup(&self, doi: &str) -> Result<Option<MetadataRecord>, ResolveError>;
}

/// Preference-ordered DOI resolution over the available registries.
pub struct MetadataResolver {
    registries: Vec<Box<dyn MetadataRegistry>>,
}

impl MetadataResolver {
    /// Creates a resolver trying `registries` in the given order.
    #[must_use]
    pub fn new(registries: Vec<Box<dyn MetadataRegistry>>) -> Self {
        Self { registries }
    }

    /// Resolves one DOI, falling back to later registries only on a
    /// definitive no-data answer.
    ///
    /// Returns `Ok(None)` when no registry has a record.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when a registry cannot be reached at the
    /// network level; later registries are not consulted in that case.
    #[instrument(skip(self))]
    pub async fn resolve(&self, doi: &str) -> Result<Option<MetadataRecord>, ResolveError> {
        for registry in &self.registries {
            match registry.lookup(doi).await? {
                Some(record) => {
                    debug!(registry = registry.name(), %doi, "registry has a record");
                    return Ok(Some(record));
                }
                None => {
                    debug!(registry = registry.name(), %doi, "registry has no record");
                }
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.registries.iter().map(|r| r.name()).collect();
        f.debug_struct("MetadataResolver")
            .field("registries", &names)
            .finish()
    }
}
