//! Connector for microPublication (micropublication.org).

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::instrument;

use crate::article::ArticleDescriptor;
use crate::fetch::{FetchError, HttpClient, RetryPolicy};
use crate::journal::portal::PortalSite;
use crate::journal::{JournalConnector, SourceUrls};
use crate::resolver::RegistryKind;

/// The journal's ISSN.
const ISSN: &str = "2578-9430";

/// DOI prefix all microPublication articles register under.
const DOI_PREFIX: &str = "10.17912";

/// Portal endpoint serving the full article list.
const ARTICLE_LIST_URL: &str = "https://portal.micropublication.org/api/export/archives.xml";

/// Base name for archive files and the output directory.
const ARCHIVE_BASENAME: &str = "micropublication-org";

/// Volume numbering offset: volume 1 covers 2015.
const VOLUME_YEAR_OFFSET: i32 = 2014;

/// microPublication publishes single-finding biology articles through the
/// shared portal platform and registers its DOIs with DataCite.
#[derive(Debug, Clone)]
pub struct Micropublication {
    site: PortalSite,
}

impl Micropublication {
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
impl JournalConnector for Micropublication {
    fn name(&self) -> &'static str {
        "microPublication"
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
        RegistryKind::DataCite
    }

    fn volume_for_year(&self, year: i32) -> Option<i32> {
        let volume = year - VOLUME_YEAR_OFFSET;
        (volume >= 1).then_some(volume)
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
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40), 2.0)
    }

    #[test]
    fn test_volume_starts_at_one_in_2015() {
        let connector = Micropublication::new(HttpClient::new(), fast_policy());
        assert_eq!(connector.volume_for_year(2015), Some(1));
        assert_eq!(connector.volume_for_year(2021), Some(7));
    }

    #[test]
    fn test_no_volume_before_first_year() {
        let connector = Micropublication::new(HttpClient::new(), fast_policy());
        assert_eq!(connector.volume_for_year(2014), None);
    }

    #[tokio::test]
    async fn test_list_articles_via_mock_portal() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        let xml = r#"<articles>
          <article>
            <doi>10.17912/micropub.biology.000102</doi>
            <article-title>Courtship defects</article-title>
            <pdf-url>https://portal.example.org/pdf/102.pdf</pdf-url>
            <jats-url>https://portal.example.org/jats/102.xml</jats-url>
            <date-published><year>2019</year><month>5</month><day>21</day></date-published>
          </article>
        </articles>"#;
        Mock::given(method("GET"))
            .and(path("/api/export/archives.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(xml))
            .mount(&server)
            .await;

        let connector = Micropublication::with_list_url(
            HttpClient::new(),
            fast_policy(),
            format!("{}/api/export/archives.xml", server.uri()),
        );
        let articles = connector.list_articles(None).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].doi, "10.17912/micropub.biology.000102");
        assert!(articles[0].is_complete());
    }
}
