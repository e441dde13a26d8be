//! Connector for Prompt (thepromptjournal.com).

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::instrument;

use crate::article::ArticleDescriptor;
use crate::fetch::{FetchError, HttpClient, RetryPolicy};
use crate::journal::portal::PortalSite;
use crate::journal::{JournalConnector, SourceUrls};
use crate::resolver::RegistryKind;

/// The journal's ISSN.
const ISSN: &str = "2476-0943";

/// DOI prefix all Prompt articles register under.
const DOI_PREFIX: &str = "10.31719";

/// Portal endpoint serving the full article list.
const ARTICLE_LIST_URL: &str = "https://portal.thepromptjournal.com/api/export/archives.xml";

/// Base name for archive files and the output directory.
const ARCHIVE_BASENAME: &str = "thepromptjournal-com";

/// Prompt publishes academic writing assignments through the same portal
/// platform as microPublication, but registers its DOIs with Crossref and
/// does not number volumes by year.
#[derive(Debug, Clone)]
pub struct Prompt {
    site: PortalSite,
}

impl Prompt {
    /// Creates a connector against the production portal.
    #[must_use]
    pub fn new(client: HttpClient, retry: RetryPolicy) -> Self {
        Self::with_list_url(client, retry, ARTICLE_LIST_URL)
    }

    /// Creates a connector reading the article list from a different
    /// endpoint. Primarily useful for testing with a local mock server.
    #[must_use]
    pub fn with_list_url(
        client: HttpClient,
        retry: RetryPolicy,
        list_url: impl Into<String>,
    ) -> Self {
        Self {
            site: PortalSite::new(client, retry, list_url),
        }
    }
}

#[async_trait]
impl JournalConnector for Prompt {
    fn name(&self) -> &'static str {
        "Prompt"
    }

    fn issn(&self) -> &'static str {
        ISSN
    }

    fn doi_prefix(&self) -> &'static str {
        DOI_PREFIX
    }

    fn archive_basename(&self) -> &'static str {
        ARCHIVE_BASENAME
    }

    fn preferred_registry(&self) -> RegistryKind {
        RegistryKind::Crossref
    }

    #[instrument(skip(self))]
    async fn article_index(&self) -> Result<String, FetchError> {
        self.site.index().await
    }

    #[instrument(skip(self))]
    async fn list_articles(
        &self,
        after: Option<NaiveDate>,
    ) -> Result<Vec<ArticleDescriptor>, FetchError> {
        self.site.articles(after).await
    }

    #[instrument(skip(self))]
    async fn source_urls(&self, doi: &str) -> Result<Option<SourceUrls>, FetchError> {
        self.site.source_urls(doi).await
    }

    fn parse_article_index(&self, xml: &str) -> Vec<ArticleDescriptor> {
        crate::journal::portal::parse_article_list(xml)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40), 2.0)
    }

    #[test]
    fn test_volume_rule_defaults_to_none() {
        let connector = Prompt::new(HttpClient::new(), fast_policy());
        assert_eq!(connector.volume_for_year(2020), None);
    }

    #[tokio::test]
    async fn test_missing_list_yields_no_articles() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let connector = Prompt::with_list_url(HttpClient::new(), fast_policy(), server.uri());
        let articles = connector.list_articles(None).await.unwrap();
        assert!(articles.is_empty());
    }
}
