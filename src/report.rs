//! Run reporting: per-article outcomes, rendered report files, exit codes.
//!
//! Every processed identifier ends up as exactly one [`ArticleOutcome`].
//! The collected outcomes drive two things scripts depend on: the report
//! file (CSV and/or HTML) and the process exit code. The code is `0` only
//! when every article archived cleanly; otherwise `100 + n` where `n`
//! counts the articles that did not, whatever the reason. Run-level aborts
//! (no network, interruption, fatal faults) never reach this module; they
//! map to small fixed codes without a report.

use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use quick_xml::escape::escape;
use thiserror::Error;
use tracing::error;

use crate::article::ArticleDescriptor;

/// How processing one article ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// The article was fetched, converted, and assembled.
    Success,
    /// A needed input was absent: registry record, PDF, or markup.
    MissingFile,
    /// The markup was malformed or failed structural validation.
    ValidationError,
    /// The article's figure could not be converted.
    ConversionError,
    /// A network fetch failed after retries.
    FetchError,
}

impl OutcomeKind {
    /// The label used in report rows.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::MissingFile => "missing-file",
            Self::ValidationError => "validation-error",
            Self::ConversionError => "conversion-error",
            Self::FetchError => "fetch-error",
        }
    }

    /// True only for [`OutcomeKind::Success`].
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One report row: what happened to one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleOutcome {
    /// The article's DOI.
    pub doi: String,
    /// How processing ended.
    pub kind: OutcomeKind,
    /// Free-text detail, e.g. which file was missing or what failed.
    pub detail: String,
    /// Publication date from the article list; empty when unknown.
    pub date: String,
    /// The article's PDF URL; empty when the list had none.
    pub url: String,
}

impl ArticleOutcome {
    /// Creates an outcome with no listing context (date and URL empty).
    #[must_use]
    pub fn new(doi: impl Into<String>, kind: OutcomeKind, detail: impl Into<String>) -> Self {
        Self {
            doi: doi.into(),
            kind,
            detail: detail.into(),
            date: String::new(),
            url: String::new(),
        }
    }

    /// Attaches the article list's date and PDF URL for the report row.
    #[must_use]
    pub fn with_listing(mut self, descriptor: &ArticleDescriptor) -> Self {
        self.date = descriptor.date.clone();
        self.url = descriptor.pdf_url.clone().unwrap_or_default();
        self
    }
}

/// Collects per-article outcomes during a run.
///
/// Recording is append-only and once-per-identifier; the pipeline records
/// outcomes in enumeration order, and that order is preserved into the
/// report.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    outcomes: Vec<ArticleOutcome>,
    seen: HashSet<String>,
}

impl ReportAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one article's outcome.
    ///
    /// Returns `false` and keeps the first record when the identifier was
    /// already recorded; a second record for the same identifier is a
    /// caller bug, logged rather than propagated.
    pub fn record(&mut self, outcome: ArticleOutcome) -> bool {
        if !self.seen.insert(outcome.doi.clone()) {
            error!(doi = %outcome.doi, "duplicate outcome for identifier ignored");
            return false;
        }
        self.outcomes.push(outcome);
        true
    }

    /// Number of outcomes recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Closes the run and produces the report.
    #[must_use]
    pub fn finalize(self) -> RunReport {
        RunReport {
            outcomes: self.outcomes,
        }
    }
}

/// The completed run: every outcome, render methods, and the exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    outcomes: Vec<ArticleOutcome>,
}

impl RunReport {
    /// All recorded outcomes in enumeration order.
    #[must_use]
    pub fn outcomes(&self) -> &[ArticleOutcome] {
        &self.outcomes
    }

    /// Count of outcomes that are not [`OutcomeKind::Success`].
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.kind.is_success())
            .count()
    }

    /// The process exit code for a completed run: `0` when every outcome
    /// is a success (or nothing was processed), otherwise `100` plus the
    /// failure count.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.failure_count() {
            0 => 0,
            failures => 100_i32.saturating_add(i32::try_from(failures).unwrap_or(i32::MAX)),
        }
    }

    /// Renders the report as CSV with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Render`] if the CSV writer fails, which for
    /// an in-memory buffer indicates malformed row data.
    pub fn render_csv(&self) -> Result<String, ReportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["Status", "DOI", "Date", "URL", "Detail"])
            .map_err(ReportError::render)?;
        for outcome in &self.outcomes {
            writer
                .write_record([
                    outcome.kind.label(),
                    &outcome.doi,
                    &outcome.date,
                    &outcome.url,
                    &outcome.detail,
                ])
                .map_err(ReportError::render)?;
        }
        let bytes = writer.into_inner().map_err(ReportError::render)?;
        String::from_utf8(bytes).map_err(ReportError::render)
    }

    /// Renders the report as a standalone HTML page.
    ///
    /// `title` defaults to `Report for <local timestamp>` when not given.
    #[must_use]
    pub fn render_html(&self, title: Option<&str>) -> String {
        let title = title.map_or_else(
            || format!("Report for {}", Local::now().format("%b %d %Y %H:%M:%S")),
            str::to_string,
        );

        let mut html = String::from(HTML_TOP);
        let _ = writeln!(html, "    <h1>{}</h1>", escape(&title));
        html.push_str(HTML_TABLE_HEAD);
        for outcome in &self.outcomes {
            let _ = writeln!(
                html,
                "        <tr><td>{}</td><td>{}</td><td>{}</td>\
                 <td><a href=\"{}\">{}</a></td><td>{}</td></tr>",
                outcome.kind.label(),
                escape(&outcome.doi),
                escape(&outcome.date),
                escape(&outcome.url),
                escape(&outcome.url),
                escape(&outcome.detail),
            );
        }
        html.push_str(HTML_BOTTOM);
        html
    }
}

const HTML_TOP: &str = r#"<html>
    <style>
      html  { font-family: "Helvetica", sans-serif     }
      h1    { font-size: 14pt; text-align: center      }
      table { width: 100%                              }
      thead { background-color: #eee                   }
      th    { text-align: left; padding: 6px 6px 0 6px }
      td    { padding: 6px 10px                        }
    </style>
  <body>
"#;

const HTML_TABLE_HEAD: &str = r#"    <table>
      <thead>
        <tr>
          <th width="10%">Status</th>
          <th width="25%">DOI</th>
          <th width="10%">Date</th>
          <th>URL</th>
          <th width="25%">Detail</th>
        </tr>
      </thead>
      <tbody>
"#;

const HTML_BOTTOM: &str = r#"      </tbody>
    </table>
  </body>
</html>
"#;

/// Report formats selectable for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// Standalone HTML page.
    Html,
}

impl ReportFormat {
    /// Parses a format tag as given on the command line (case-insensitive).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "html" => Some(Self::Html),
            _ => None,
        }
    }

    /// The canonical tag, also the report file extension.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Html => "html",
        }
    }

    /// Tags of every supported format, for error messages and help text.
    #[must_use]
    pub fn supported_tags() -> &'static [&'static str] {
        &["csv", "html"]
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Errors from rendering or writing report files.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A report body could not be rendered.
    #[error("could not render report: {detail}")]
    Render {
        /// Renderer diagnostic.
        detail: String,
    },

    /// A report file could not be written.
    #[error("could not write report file {path}")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ReportError {
    fn render(detail: impl ToString) -> Self {
        Self::Render {
            detail: detail.to_string(),
        }
    }
}

/// Writes the report in each requested format, deriving file names from
/// `base` by swapping its extension. Returns the paths written.
///
/// # Errors
///
/// Returns [`ReportError`] when rendering or writing fails.
pub fn write_reports(
    base: &Path,
    formats: &[ReportFormat],
    title: Option<&str>,
    report: &RunReport,
) -> Result<Vec<PathBuf>, ReportError> {
    let mut written = Vec::new();
    for format in formats {
        let path = base.with_extension(format.tag());
        let body = match format {
            ReportFormat::Csv => report.render_csv()?,
            ReportFormat::Html => report.render_html(title),
        };
        fs::write(&path, body).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }
    Ok(written)
}

/// Formats the article list as the fixed-width table shown by preview
/// mode, flagging entries too incomplete to archive.
#[must_use]
pub fn preview_table(articles: &[ArticleDescriptor]) -> String {
    let rule = "-".repeat(89);
    let mut table = String::new();
    let _ = writeln!(table, "{rule}");
    let _ = writeln!(table, "{:3}  {:<32}  {:10}  {}", "?", "DOI", "Date", "URL");
    let _ = writeln!(table, "{rule}");
    for article in articles {
        let flag = if article.is_complete() { "OK" } else { "err" };
        let doi = if article.doi.is_empty() {
            "missing DOI"
        } else {
            &article.doi
        };
        let date = if article.date.is_empty() {
            "missing date"
        } else {
            &article.date
        };
        let url = article.pdf_url.as_deref().unwrap_or("missing URL");
        let _ = writeln!(table, "{flag:3}  {doi:<32}  {date:10}  {url}");
    }
    let _ = writeln!(table, "{rule}");
    table
}
