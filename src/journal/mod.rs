//! Journal connectors: the per-source components that know how to list
//! articles and where their files live.
//!
//! Supported journals form a closed set resolved at configuration time, not
//! discovered at runtime: every journal is a [`Journal`] tag mapped to one
//! [`JournalConnector`] implementation by [`connector_for`]. An unknown tag
//! never reaches this module; option validation rejects it before any
//! network access.
//!
//! Both current journals are hosted on the same portal platform and share
//! its article-list export format (see [`portal`]), differing in constants:
//! ISSN, DOI prefix, site URLs, archive basename, and preferred metadata
//! registry.

mod micropublication;
pub(crate) mod portal;
mod prompt;

pub use micropublication::Micropublication;
pub use prompt::Prompt;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::article::ArticleDescriptor;
use crate::fetch::{FetchError, HttpClient, RetryPolicy};
use crate::resolver::RegistryKind;

/// Tags for the supported journals. `Journal` is what configuration
/// carries; the connector is built from it once options are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Journal {
    /// microPublication (micropublication.org).
    Micropublication,
    /// Prompt (thepromptjournal.com).
    Prompt,
}

impl Journal {
    /// Parses a journal tag as given on the command line (case-insensitive).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "micropublication" => Some(Self::Micropublication),
            "prompt" => Some(Self::Prompt),
            _ => None,
        }
    }

    /// The canonical tag for this journal.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Micropublication => "micropublication",
            Self::Prompt => "prompt",
        }
    }

    /// Tags of every supported journal, for error messages and help text.
    #[must_use]
    pub fn supported_tags() -> &'static [&'static str] {
        &["micropublication", "prompt"]
    }
}

impl std::fmt::Display for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Source URLs for one article's files, as advertised by the journal site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrls {
    /// URL of the article PDF, when the site lists one.
    pub pdf_url: Option<String>,
    /// URL of the structured-markup file.
    pub markup_url: Option<String>,
}

/// Capability interface every journal connector implements.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via
/// `Box<dyn JournalConnector>`. Rust 2024 native async traits are not
/// object-safe, so `async_trait` is required for the tag-to-connector
/// dispatch.
#[async_trait]
pub trait JournalConnector: Send + Sync {
    /// The publication name, used in file comments and report titles.
    fn name(&self) -> &'static str;

    /// The journal's ISSN (with dash).
    fn issn(&self) -> &'static str;

    /// The DOI prefix this journal registers under.
    fn doi_prefix(&self) -> &'static str;

    /// Base file name for the archives created for this journal; also the
    /// directory rooting all assembled output.
    fn archive_basename(&self) -> &'static str;

    /// Which metadata registry to try first for this journal's DOIs.
    fn preferred_registry(&self) -> RegistryKind;

    /// Journal-specific volume numbering, derived from the publication
    /// year, for registries that do not supply a volume.
    fn volume_for_year(&self, year: i32) -> Option<i32> {
        let _ = year;
        None
    }

    /// Returns the raw article-list payload exactly as the site serves it.
    ///
    /// A site that answers 404/410 has no list to give; that comes back as
    /// an empty string, not an error.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport failure after retries.
    async fn article_index(&self) -> Result<String, FetchError>;

    /// Enumerates the journal's articles, oldest first, optionally keeping
    /// only those published strictly after `after`.
    ///
    /// Each call re-fetches the list from scratch; there is no cursor.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport failure after retries.
    async fn list_articles(
        &self,
        after: Option<NaiveDate>,
    ) -> Result<Vec<ArticleDescriptor>, FetchError>;

    /// Looks up the file URLs for one identifier via the article list.
    ///
    /// Returns `None` when the journal does not list the identifier.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport failure after retries.
    async fn source_urls(&self, doi: &str) -> Result<Option<SourceUrls>, FetchError>;

    /// Parses a saved article-list payload in this journal's native
    /// format, as previously captured from [`JournalConnector::article_index`].
    /// Used when a run reads its article list from a file instead of the
    /// network.
    fn parse_article_index(&self, xml: &str) -> Vec<ArticleDescriptor>;
}

/// Builds the connector for a journal tag.
///
/// The client and retry policy are shared with the rest of the run so every
/// network stage pools connections and backs off the same way.
#[must_use]
pub fn connector_for(
    journal: Journal,
    client: &HttpClient,
    retry: &RetryPolicy,
) -> Box<dyn JournalConnector> {
    match journal {
        Journal::Micropublication => {
            Box::new(Micropublication::new(client.clone(), retry.clone()))
        }
        Journal::Prompt => Box::new(Prompt::new(client.clone(), retry.clone())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tag_known_journals() {
        assert_eq!(
            Journal::from_tag("micropublication"),
            Some(Journal::Micropublication)
        );
        assert_eq!(Journal::from_tag("prompt"), Some(Journal::Prompt));
    }

    #[test]
    fn test_from_tag_is_case_insensitive_and_trims() {
        assert_eq!(
            Journal::from_tag("  MicroPublication "),
            Some(Journal::Micropublication)
        );
        assert_eq!(Journal::from_tag("PROMPT"), Some(Journal::Prompt));
    }

    #[test]
    fn test_from_tag_unknown_is_none() {
        assert_eq!(Journal::from_tag("unknown-journal"), None);
        assert_eq!(Journal::from_tag(""), None);
    }

    #[test]
    fn test_tag_round_trips() {
        for tag in Journal::supported_tags() {
            let journal = Journal::from_tag(tag).unwrap();
            assert_eq!(journal.tag(), *tag);
        }
    }

    #[test]
    fn test_connector_constants_match_journal() {
        let client = HttpClient::new();
        let retry = RetryPolicy::default();

        let micropub = connector_for(Journal::Micropublication, &client, &retry);
        assert_eq!(micropub.name(), "microPublication");
        assert_eq!(micropub.issn(), "2578-9430");
        assert_eq!(micropub.doi_prefix(), "10.17912");
        assert_eq!(micropub.archive_basename(), "micropublication-org");
        assert_eq!(micropub.preferred_registry(), RegistryKind::DataCite);

        let prompt = connector_for(Journal::Prompt, &client, &retry);
        assert_eq!(prompt.name(), "Prompt");
        assert_eq!(prompt.issn(), "2476-0943");
        assert_eq!(prompt.doi_prefix(), "10.31719");
        assert_eq!(prompt.archive_basename(), "thepromptjournal-com");
        assert_eq!(prompt.preferred_registry(), RegistryKind::Crossref);
    }

    #[test]
    fn test_micropublication_volume_rule() {
        let client = HttpClient::new();
        let retry = RetryPolicy::default();
        let connector = connector_for(Journal::Micropublication, &client, &retry);
        // Volume 1 was 2015.
        assert_eq!(connector.volume_for_year(2015), Some(1));
        assert_eq!(connector.volume_for_year(2019), Some(5));
    }

    #[test]
    fn test_prompt_has_no_volume_rule() {
        let client = HttpClient::new();
        let retry = RetryPolicy::default();
        let connector = connector_for(Journal::Prompt, &client, &retry);
        assert_eq!(connector.volume_for_year(2020), None);
    }
}
