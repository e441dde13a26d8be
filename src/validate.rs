//! Structural validation of JATS article markup.
//!
//! Archive destinations ingest the markup against the JATS Archiving 1.2
//! tag set, so problems are cheapest to catch here, before packaging. The
//! checks are structural: the document must be well-formed XML and must
//! carry the JATS skeleton (front matter, journal and article metadata, a
//! DOI article-id, a body). Malformed XML is reported separately from
//! profile violations because it usually means a damaged upload rather
//! than an authoring mistake, and the two get triaged differently.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, instrument};

/// The tag set the structural checks target.
pub const JATS_PROFILE: &str = "JATS Archiving 1.2";

/// Result of validating one markup payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    /// Well-formed and structurally complete.
    Valid,
    /// Zero-length (or whitespace-only) payload; nothing to check.
    Empty,
    /// Not well-formed XML.
    Malformed {
        /// Parser diagnostic, including the byte position.
        detail: String,
    },
    /// Well-formed XML missing required JATS structure.
    Invalid {
        /// One entry per missing or wrong element.
        violations: Vec<String>,
    },
}

impl Validity {
    /// True for payloads that passed every check.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// One-line description for report detail text.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Valid => "valid".to_string(),
            Self::Empty => "markup payload is empty".to_string(),
            Self::Malformed { detail } => format!("malformed XML: {detail}"),
            Self::Invalid { violations } => format!(
                "{} violation(s) against {JATS_PROFILE}: {}",
                violations.len(),
                violations.join("; ")
            ),
        }
    }
}

/// Checks markup payloads against the JATS structural profile.
///
/// The validator is stateless; whether validation runs at all for a run is
/// decided by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupValidator;

impl MarkupValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validates one markup payload.
    #[instrument(skip_all, fields(len = markup.len()))]
    #[must_use]
    pub fn validate(&self, markup: &[u8]) -> Validity {
        if markup.iter().all(u8::is_ascii_whitespace) {
            debug!("markup payload is empty");
            return Validity::Empty;
        }

        let mut reader = Reader::from_reader(markup);
        reader.config_mut().trim_text(true);

        let mut structure = JatsStructure::default();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    structure.observe(&stack, &e);
                    stack.push(e.name().as_ref().to_vec());
                }
                Ok(Event::Empty(e)) => {
                    structure.observe(&stack, &e);
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(error) => {
                    return Validity::Malformed {
                        detail: format!(
                            "{error} at byte {position}",
                            position = reader.buffer_position()
                        ),
                    };
                }
            }
        }

        match structure.violations() {
            violations if violations.is_empty() => Validity::Valid,
            violations => Validity::Invalid { violations },
        }
    }
}

/// Presence flags for the required JATS skeleton.
#[derive(Debug, Default)]
struct JatsStructure {
    root: Option<Vec<u8>>,
    front: bool,
    journal_meta: bool,
    article_meta: bool,
    title_group: bool,
    doi_article_id: bool,
    body: bool,
}

impl JatsStructure {
    /// Records one observed element, given the path of its open ancestors.
    fn observe(&mut self, stack: &[Vec<u8>], element: &BytesStart<'_>) {
        let name = element.name().as_ref().to_vec();
        if stack.is_empty() && self.root.is_none() {
            self.root = Some(name.clone());
        }

        let path: Vec<&[u8]> = stack
            .iter()
            .map(Vec::as_slice)
            .chain(std::iter::once(name.as_slice()))
            .collect();
        match path.as_slice() {
            [b"article", b"front"] => self.front = true,
            [b"article", b"front", b"journal-meta"] => self.journal_meta = true,
            [b"article", b"front", b"article-meta"] => self.article_meta = true,
            [b"article", b"front", b"article-meta", b"title-group"] => self.title_group = true,
            [b"article", b"front", b"article-meta", b"article-id"] => {
                if let Ok(Some(attribute)) = element.try_get_attribute("pub-id-type") {
                    if let Ok(value) = attribute.unescape_value() {
                        if value.as_ref() == "doi" {
                            self.doi_article_id = true;
                        }
                    }
                }
            }
            [b"article", b"body"] => self.body = true,
            _ => {}
        }
    }

    /// The list of structural problems, empty when the skeleton is complete.
    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        match &self.root {
            None => {
                violations.push("document has no root element".to_string());
                return violations;
            }
            Some(root) if root.as_slice() != b"article" => {
                violations.push(format!(
                    "document root is <{}>, not <article>",
                    String::from_utf8_lossy(root)
                ));
                return violations;
            }
            Some(_) => {}
        }
        if !self.front {
            violations.push("missing <front> element".to_string());
        }
        if !self.journal_meta {
            violations.push("missing <journal-meta> in <front>".to_string());
        }
        if !self.article_meta {
            violations.push("missing <article-meta> in <front>".to_string());
        }
        if !self.title_group {
            violations.push("missing <title-group> in <article-meta>".to_string());
        }
        if !self.doi_article_id {
            violations.push("missing <article-id pub-id-type=\"doi\"> in <article-meta>".to_string());
        }
        if !self.body {
            violations.push("missing <body> element".to_string());
        }
        violations
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn minimal_valid_jats() -> &'static str {
        r#"<?xml version="1.0" encoding="utf-8"?>
<article xmlns:xlink="http://www.w3.org/1999/xlink" article-type="research-article">
  <front>
    <journal-meta>
      <journal-id journal-id-type="publisher">microPublication Biology</journal-id>
      <issn pub-type="epub">2578-9430</issn>
    </journal-meta>
    <article-meta>
      <article-id pub-id-type="doi">10.17912/micropub.biology.000102</article-id>
      <title-group>
        <article-title>Loss of courtship behavior in males</article-title>
      </title-group>
    </article-meta>
  </front>
  <body>
    <p>Finding text.</p>
    <fig id="f1">
      <graphic xlink:href="10.17912_micropub.biology.000102"/>
    </fig>
  </body>
</article>"#
    }

    // ==================== Well-Formed Document Tests ====================

    #[test]
    fn test_minimal_jats_is_valid() {
        let validator = MarkupValidator::new();
        assert_eq!(validator.validate(minimal_valid_jats().as_bytes()), Validity::Valid);
    }

    #[test]
    fn test_empty_payload_is_empty_not_error() {
        let validator = MarkupValidator::new();
        assert_eq!(validator.validate(b""), Validity::Empty);
        assert_eq!(validator.validate(b"  \n\t "), Validity::Empty);
    }

    #[test]
    fn test_self_closing_body_counts() {
        let xml = r#"<article><front><journal-meta/><article-meta>
            <article-id pub-id-type="doi">10.17912/x</article-id>
            <title-group/></article-meta></front><body/></article>"#;
        let validator = MarkupValidator::new();
        assert_eq!(validator.validate(xml.as_bytes()), Validity::Valid);
    }

    // ==================== Malformed Document Tests ====================

    #[test]
    fn test_truncated_document_is_malformed() {
        let validator = MarkupValidator::new();
        let result = validator.validate(b"<article><front><journal-me");
        match result {
            Validity::Malformed { detail } => {
                assert!(detail.contains("byte"), "detail should locate the error: {detail}");
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_tags_are_malformed() {
        let validator = MarkupValidator::new();
        let result = validator.validate(b"<article><front></article></front>");
        assert!(matches!(result, Validity::Malformed { .. }));
    }

    #[test]
    fn test_plain_text_has_no_root() {
        let validator = MarkupValidator::new();
        let result = validator.validate(b"server maintenance page");
        match result {
            Validity::Invalid { violations } => {
                assert_eq!(violations, vec!["document has no root element"]);
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    // ==================== Profile Violation Tests ====================

    #[test]
    fn test_wrong_root_is_single_violation() {
        let validator = MarkupValidator::new();
        let result = validator.validate(b"<html><body>nope</body></html>");
        match result {
            Validity::Invalid { violations } => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].contains("<html>"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_body_is_reported() {
        let xml = minimal_valid_jats().replace("<body>", "<back>").replace("</body>", "</back>");
        let validator = MarkupValidator::new();
        match validator.validate(xml.as_bytes()) {
            Validity::Invalid { violations } => {
                assert_eq!(violations, vec!["missing <body> element"]);
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_article_id_without_doi_type_is_reported() {
        let xml = minimal_valid_jats().replace("pub-id-type=\"doi\"", "pub-id-type=\"publisher-id\"");
        let validator = MarkupValidator::new();
        match validator.validate(xml.as_bytes()) {
            Validity::Invalid { violations } => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].contains("pub-id-type"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_article_lists_every_missing_piece() {
        let validator = MarkupValidator::new();
        match validator.validate(b"<article></article>") {
            Validity::Invalid { violations } => {
                assert_eq!(violations.len(), 6);
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    // ==================== Description Tests ====================

    #[test]
    fn test_describe_names_the_profile() {
        let validator = MarkupValidator::new();
        let result = validator.validate(b"<article></article>");
        assert!(result.describe().contains(JATS_PROFILE));
    }

    #[test]
    fn test_describe_valid_and_empty() {
        assert_eq!(Validity::Valid.describe(), "valid");
        assert!(Validity::Empty.describe().contains("empty"));
    }
}
