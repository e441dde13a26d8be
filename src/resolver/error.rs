//! Error types for metadata registry lookups.

use thiserror::Error;

use crate::fetch::FetchError;

/// Errors that can occur while resolving a DOI against the registries.
///
/// A registry answering "no such DOI" is not an error; lookups report that
/// as `Ok(None)` so the resolver can fall back to the next registry. Only
/// transport-level failures (after retries) and bad configuration surface
/// here.
///
/// Note on `From` trait implementations: conversions are deliberately not
/// implemented as `From` because each variant needs context (which registry,
/// which DOI) that a bare source error does not carry. Use the constructor
/// helpers instead.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The registry could not be reached at the network level. Retries are
    /// already exhausted by the time this surfaces.
    #[error("{registry} request for {doi} failed")]
    Registry {
        /// Registry name (for logs and report detail).
        registry: &'static str,
        /// The DOI being looked up.
        doi: String,
        /// The underlying transport failure.
        #[source]
        source: FetchError,
    },

    /// A registry client could not be built from its options.
    #[error("invalid registry configuration: {reason}")]
    Configuration {
        /// What was wrong with the options.
        reason: String,
    },
}

impl ResolveError {
    /// Creates a [`ResolveError::Registry`] for a transport failure.
    pub fn registry(
        registry: &'static str,
        doi: impl Into<String>,
        source: FetchError,
    ) -> Self {
        Self::Registry {
            registry,
            doi: doi.into(),
            source,
        }
    }

    /// Creates a [`ResolveError::Configuration`].
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display_names_registry_and_doi() {
        let error = ResolveError::registry(
            "datacite",
            "10.17912/micropub.biology.000102",
            FetchError::timeout("https://api.datacite.org/dois/x"),
        );
        let message = error.to_string();
        assert!(message.contains("datacite"));
        assert!(message.contains("10.17912/micropub.biology.000102"));
    }

    #[test]
    fn test_registry_error_preserves_source() {
        let error = ResolveError::registry(
            "crossref",
            "10.31719/x",
            FetchError::http_status("https://api.crossref.org/works/x", 503),
        );
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_configuration_error_display() {
        let error = ResolveError::configuration("mailto contains control characters");
        assert!(error.to_string().contains("control characters"));
    }
}
