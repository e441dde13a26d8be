//! Shared article-list handling for the portal platform hosting the
//! supported journals.
//!
//! The portal exports one XML document listing every published article.
//! Parsing is tolerant at the entry level: an entry missing fields still
//! produces a descriptor (flagged incomplete downstream) so it can be
//! reported instead of vanishing. Only an entry with no DOI at all is
//! dropped, since nothing downstream could name it.

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, warn};

use crate::article::ArticleDescriptor;
use crate::fetch::{FetchError, HttpClient, RetryPolicy, get_with_retry};
use crate::journal::SourceUrls;

/// One portal-hosted journal site: the list URL plus the shared network
/// machinery. Connectors embed this and delegate their list operations.
#[derive(Debug, Clone)]
pub(crate) struct PortalSite {
    client: HttpClient,
    retry: RetryPolicy,
    list_url: String,
}

impl PortalSite {
    pub(crate) fn new(
        client: HttpClient,
        retry: RetryPolicy,
        list_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            retry,
            list_url: list_url.into(),
        }
    }

    /// Fetches the raw article-list document.
    ///
    /// A 404/410 answer means the site has no list to give; that comes back
    /// as an empty string so the run proceeds with zero articles.
    pub(crate) async fn index(&self) -> Result<String, FetchError> {
        match get_with_retry(&self.client, &self.retry, &self.list_url).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(error) if error.is_not_found() => {
                warn!(url = %self.list_url, "server has no article list");
                Ok(String::new())
            }
            Err(error) => Err(error),
        }
    }

    /// Fetches and parses the article list, oldest first, keeping only
    /// articles published strictly after `after` when a cutoff is given.
    pub(crate) async fn articles(
        &self,
        after: Option<NaiveDate>,
    ) -> Result<Vec<ArticleDescriptor>, FetchError> {
        let xml = self.index().await?;
        if xml.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut articles = parse_article_list(&xml);
        if let Some(cutoff) = after {
            articles.retain(|article| published_after(article, cutoff));
        }
        Ok(articles)
    }

    /// Looks up the file URLs the list advertises for one DOI.
    pub(crate) async fn source_urls(&self, doi: &str) -> Result<Option<SourceUrls>, FetchError> {
        let found = self
            .articles(None)
            .await?
            .into_iter()
            .find(|article| article.doi == doi);
        Ok(found.map(|article| SourceUrls {
            pdf_url: article.pdf_url,
            markup_url: article.jats_url,
        }))
    }
}

/// True when the article's date parses and falls strictly after `cutoff`.
///
/// An entry without a parseable date cannot be shown to satisfy the cutoff,
/// so it is excluded from date-filtered runs.
pub(crate) fn published_after(article: &ArticleDescriptor, cutoff: NaiveDate) -> bool {
    match NaiveDate::parse_from_str(&article.date, "%Y-%m-%d") {
        Ok(date) => date > cutoff,
        Err(_) => {
            warn!(
                doi = %article.doi,
                date = %article.date,
                "skipping article without a parseable date in a date-filtered run"
            );
            false
        }
    }
}

/// Fields of one `<article>` entry, accumulated while walking the list.
#[derive(Debug, Default)]
struct ListEntry {
    doi: String,
    title: String,
    pdf_url: String,
    jats_url: String,
    image_url: String,
    year: String,
    month: String,
    day: String,
}

impl ListEntry {
    /// Normalizes the entry into a descriptor. The date is rebuilt as
    /// `YYYY-MM-DD` with zero-padded month and day; a missing year leaves
    /// the date empty rather than inventing one.
    fn into_descriptor(self) -> ArticleDescriptor {
        let date = if self.year.is_empty() {
            String::new()
        } else {
            format!("{}-{:0>2}-{:0>2}", self.year, self.month, self.day)
        };
        ArticleDescriptor::new(
            self.doi,
            self.title,
            date,
            non_empty(self.pdf_url),
            non_empty(self.jats_url),
            non_empty(self.image_url),
        )
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Collapses runs of whitespace to single spaces and trims the ends, the
/// way titles arrive with embedded newlines from the portal's templating.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses the portal's article-list XML into descriptors sorted by
/// publication date, oldest first.
///
/// A document that is not well-formed XML yields an empty list: the server
/// answered with something other than the list (an error page, usually),
/// and no partial result from it can be trusted.
pub(crate) fn parse_article_list(xml: &str) -> Vec<ArticleDescriptor> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut articles: Vec<ArticleDescriptor> = Vec::new();
    let mut entry: Option<ListEntry> = None;
    let mut field: Option<Field> = None;
    // Markup nested inside a field element (italics in titles, mostly)
    // must not end the field; text on both sides of it belongs together.
    let mut field_depth = 0usize;
    let mut in_date = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                _ if field.is_some() => field_depth += 1,
                b"article" => {
                    entry = Some(ListEntry::default());
                }
                b"date-published" => in_date = true,
                name if entry.is_some() => {
                    field = Field::from_tag(name, in_date);
                    field_depth = 0;
                }
                _ => {}
            },
            Ok(Event::Text(text)) => {
                if let (Some(entry), Some(field)) = (entry.as_mut(), field) {
                    let value = match text.unescape() {
                        Ok(value) => collapse_whitespace(&value),
                        Err(error) => {
                            warn!(%error, "unreadable text in article list entry");
                            continue;
                        }
                    };
                    field.append_to(entry, &value);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                _ if field.is_some() && field_depth > 0 => field_depth -= 1,
                b"article" => {
                    if let Some(entry) = entry.take() {
                        if entry.doi.is_empty() {
                            warn!(title = %entry.title, "ignoring article list entry without a DOI");
                        } else {
                            articles.push(entry.into_descriptor());
                        }
                    }
                    field = None;
                }
                b"date-published" => in_date = false,
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(error) => {
                warn!(
                    %error,
                    position = reader.buffer_position(),
                    "badly formed XML in article list; treating the list as empty"
                );
                return Vec::new();
            }
        }
    }

    debug!(count = articles.len(), "parsed article list");
    articles.sort_by(|a, b| a.date.cmp(&b.date));
    articles
}

/// The list-entry fields we read; everything else in an entry is ignored.
#[derive(Debug, Clone, Copy)]
enum Field {
    Doi,
    Title,
    PdfUrl,
    JatsUrl,
    ImageUrl,
    Year,
    Month,
    Day,
}

impl Field {
    fn from_tag(name: &[u8], in_date: bool) -> Option<Self> {
        match name {
            b"doi" => Some(Self::Doi),
            b"article-title" => Some(Self::Title),
            b"pdf-url" => Some(Self::PdfUrl),
            b"jats-url" => Some(Self::JatsUrl),
            b"image-url" => Some(Self::ImageUrl),
            b"year" if in_date => Some(Self::Year),
            b"month" if in_date => Some(Self::Month),
            b"day" if in_date => Some(Self::Day),
            _ => None,
        }
    }

    /// Appends `value` to the matching entry field. Text may arrive in
    /// several events when entities are involved, so appending keeps the
    /// pieces together.
    fn append_to(self, entry: &mut ListEntry, value: &str) {
        let slot = match self {
            Self::Doi => &mut entry.doi,
            Self::Title => &mut entry.title,
            Self::PdfUrl => &mut entry.pdf_url,
            Self::JatsUrl => &mut entry.jats_url,
            Self::ImageUrl => &mut entry.image_url,
            Self::Year => &mut entry.year,
            Self::Month => &mut entry.month,
            Self::Day => &mut entry.day,
        };
        if !slot.is_empty() && !value.is_empty() {
            slot.push(' ');
        }
        slot.push_str(value);
    }
}

// ==================== Tests ====================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fetch::RetryPolicy;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn sample_list() -> &'static str {
        r#"<?xml version="1.0" encoding="UTF-8"?>
<articles>
  <article>
    <article-title>Loss of male courtship behavior</article-title>
    <doi>10.17912/micropub.biology.000102</doi>
    <pdf-url>https://portal.example.org/pdf/102.pdf</pdf-url>
    <jats-url>https://portal.example.org/jats/102.xml</jats-url>
    <image-url>https://portal.example.org/img/102.png</image-url>
    <date-published>
      <year>2019</year>
      <month>5</month>
      <day>21</day>
    </date-published>
  </article>
  <article>
    <article-title>A second
        finding, wrapped by the template</article-title>
    <doi>10.17912/micropub.biology.000088</doi>
    <pdf-url>https://portal.example.org/pdf/88.pdf</pdf-url>
    <jats-url>https://portal.example.org/jats/88.xml</jats-url>
    <date-published>
      <year>2018</year>
      <month>11</month>
      <day>2</day>
    </date-published>
  </article>
</articles>"#
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn test_parses_all_entries() {
        let articles = parse_article_list(sample_list());
        assert_eq!(articles.len(), 2);
    }

    #[test]
    fn test_dates_are_zero_padded() {
        let articles = parse_article_list(sample_list());
        assert_eq!(articles[0].date, "2018-11-02");
        assert_eq!(articles[1].date, "2019-05-21");
    }

    #[test]
    fn test_sorted_oldest_first() {
        let articles = parse_article_list(sample_list());
        assert_eq!(articles[0].doi, "10.17912/micropub.biology.000088");
        assert_eq!(articles[1].doi, "10.17912/micropub.biology.000102");
    }

    #[test]
    fn test_title_whitespace_is_collapsed() {
        let articles = parse_article_list(sample_list());
        assert_eq!(articles[0].title, "A second finding, wrapped by the template");
    }

    #[test]
    fn test_missing_image_url_is_none() {
        let articles = parse_article_list(sample_list());
        assert!(articles[0].image_url.is_none());
        assert!(articles[1].image_url.is_some());
    }

    #[test]
    fn test_entry_without_pdf_is_kept_but_incomplete() {
        let xml = r#"<articles>
          <article>
            <article-title>No files yet</article-title>
            <doi>10.17912/micropub.biology.000200</doi>
            <date-published><year>2020</year><month>1</month><day>3</day></date-published>
          </article>
        </articles>"#;
        let articles = parse_article_list(xml);
        assert_eq!(articles.len(), 1);
        assert!(!articles[0].is_complete());
        assert_eq!(articles[0].date, "2020-01-03");
    }

    #[test]
    fn test_entry_without_doi_is_dropped() {
        let xml = r#"<articles>
          <article>
            <article-title>Orphan entry</article-title>
            <pdf-url>https://portal.example.org/pdf/x.pdf</pdf-url>
          </article>
          <article>
            <article-title>Named entry</article-title>
            <doi>10.17912/micropub.biology.000300</doi>
          </article>
        </articles>"#;
        let articles = parse_article_list(xml);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].doi, "10.17912/micropub.biology.000300");
    }

    #[test]
    fn test_entry_without_date_gets_empty_date() {
        let xml = r#"<articles>
          <article>
            <doi>10.17912/micropub.biology.000400</doi>
            <article-title>Dateless</article-title>
          </article>
        </articles>"#;
        let articles = parse_article_list(xml);
        assert_eq!(articles[0].date, "");
    }

    #[test]
    fn test_malformed_xml_yields_empty_list() {
        let xml = "<articles><article><doi>10.17912/x</doi></artic";
        assert!(parse_article_list(xml).is_empty());
    }

    #[test]
    fn test_non_xml_yields_empty_list() {
        assert!(parse_article_list("<!DOCTYPE html><html>Maintenance</html>").is_empty());
    }

    #[test]
    fn test_markup_inside_title_keeps_surrounding_text() {
        let xml = r#"<articles>
          <article>
            <doi>10.17912/micropub.biology.000600</doi>
            <article-title>Loss of <i>fru</i> function in males</article-title>
          </article>
        </articles>"#;
        let articles = parse_article_list(xml);
        assert_eq!(articles[0].title, "Loss of fru function in males");
    }

    #[test]
    fn test_entities_in_title_are_unescaped() {
        let xml = r#"<articles>
          <article>
            <doi>10.17912/micropub.biology.000500</doi>
            <article-title>Salt &amp; light responses</article-title>
          </article>
        </articles>"#;
        let articles = parse_article_list(xml);
        assert_eq!(articles[0].title, "Salt & light responses");
    }

    // ==================== Date Filter Tests ====================

    #[test]
    fn test_published_after_is_strict() {
        let cutoff = NaiveDate::from_ymd_opt(2019, 5, 21).unwrap();
        let on_cutoff = ArticleDescriptor::new("10.1/a", "t", "2019-05-21", None, None, None);
        let later = ArticleDescriptor::new("10.1/b", "t", "2019-05-22", None, None, None);
        assert!(!published_after(&on_cutoff, cutoff));
        assert!(published_after(&later, cutoff));
    }

    #[test]
    fn test_published_after_drops_unparseable_dates() {
        let cutoff = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let dateless = ArticleDescriptor::new("10.1/c", "t", "", None, None, None);
        assert!(!published_after(&dateless, cutoff));
    }

    // ==================== PortalSite Tests ====================

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40), 2.0)
    }

    #[tokio::test]
    async fn test_index_returns_payload() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/api/export/archives.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sample_list()))
            .mount(&server)
            .await;

        let site = PortalSite::new(
            HttpClient::new(),
            fast_policy(),
            format!("{}/api/export/archives.xml", server.uri()),
        );
        let xml = site.index().await.unwrap();
        assert!(xml.contains("micropub.biology.000102"));
    }

    #[tokio::test]
    async fn test_index_missing_list_is_empty_not_error() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let site = PortalSite::new(
            HttpClient::new(),
            fast_policy(),
            format!("{}/api/export/archives.xml", server.uri()),
        );
        assert_eq!(site.index().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_articles_applies_cutoff() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sample_list()))
            .mount(&server)
            .await;

        let site = PortalSite::new(HttpClient::new(), fast_policy(), server.uri());
        let cutoff = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let articles = site.articles(Some(cutoff)).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].doi, "10.17912/micropub.biology.000102");
    }

    #[tokio::test]
    async fn test_source_urls_finds_listed_doi() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sample_list()))
            .mount(&server)
            .await;

        let site = PortalSite::new(HttpClient::new(), fast_policy(), server.uri());
        let urls = site
            .source_urls("10.17912/micropub.biology.000102")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            urls.pdf_url.as_deref(),
            Some("https://portal.example.org/pdf/102.pdf")
        );
        assert_eq!(
            urls.markup_url.as_deref(),
            Some("https://portal.example.org/jats/102.xml")
        );
    }

    #[tokio::test]
    async fn test_source_urls_unknown_doi_is_none() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sample_list()))
            .mount(&server)
            .await;

        let site = PortalSite::new(HttpClient::new(), fast_policy(), server.uri());
        assert!(site.source_urls("10.17912/nope").await.unwrap().is_none());
    }
}
