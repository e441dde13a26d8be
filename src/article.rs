//! Types describing one journal article as advertised by its source site.

use std::fmt;

use serde::Serialize;

/// One article as listed by a journal site.
///
/// Produced by a journal connector from the site's article list and never
/// mutated afterward. Missing list fields are `None`/empty rather than
/// invented; [`ArticleDescriptor::is_complete`] reports whether the entry
/// carries everything archiving needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleDescriptor {
    /// Article DOI, e.g. `10.17912/micropub.biology.000102`.
    pub doi: String,
    /// Article title, whitespace-normalized.
    pub title: String,
    /// Publication date as `YYYY-MM-DD`; empty when the list omitted it.
    pub date: String,
    /// URL of the article PDF, when the list provides one.
    pub pdf_url: Option<String>,
    /// URL of the structured-markup (JATS XML) file.
    pub jats_url: Option<String>,
    /// URL of the article's figure image, when one exists.
    pub image_url: Option<String>,
}

impl ArticleDescriptor {
    /// Creates a descriptor with all fields supplied.
    #[must_use]
    pub fn new(
        doi: impl Into<String>,
        title: impl Into<String>,
        date: impl Into<String>,
        pdf_url: Option<String>,
        jats_url: Option<String>,
        image_url: Option<String>,
    ) -> Self {
        Self {
            doi: doi.into(),
            title: title.into(),
            date: date.into(),
            pdf_url,
            jats_url,
            image_url,
        }
    }

    /// True when the list entry carries DOI, title, date, PDF URL, and
    /// markup URL. Incomplete entries are reported, not silently dropped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.doi.is_empty()
            && !self.title.is_empty()
            && !self.date.is_empty()
            && self.pdf_url.is_some()
            && self.jats_url.is_some()
    }

    /// The DOI tail used to name per-article directories and files.
    #[must_use]
    pub fn doi_tail(&self) -> &str {
        doi_tail(&self.doi)
    }
}

impl fmt::Display for ArticleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.doi, self.date)
    }
}

/// Returns the portion of a DOI after its last `/`.
///
/// A DOI without a slash is returned whole, so the result is always usable
/// as a file name component.
#[must_use]
pub fn doi_tail(doi: &str) -> &str {
    match doi.rfind('/') {
        Some(idx) => &doi[idx + 1..],
        None => doi,
    }
}
