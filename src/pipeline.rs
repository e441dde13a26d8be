//! The per-article archiving pipeline and its run-level orchestration.
//!
//! A run enumerates a journal's articles (live from the connector, or from
//! an article file), filters them, and drives each one through
//! resolve → fetch → validate → convert → assemble, recording exactly one
//! [`ArticleOutcome`] per identifier. Failures inside one article never
//! touch the others; only three conditions abort the whole run: no network
//! at startup, user interruption, and an internal fault. After processing,
//! the assembled tree is packaged unless packaging is disabled.
//!
//! Articles are independent units of work, so processing runs on a
//! semaphore-bounded pool of spawned tasks (width 1 by default, which is
//! the sequential reference behavior). Report ordering is restored from
//! the enumeration index before the report is finalized.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::article::ArticleDescriptor;
use crate::assemble::{
    ArchiveAssembler, ArticleBundle, AssembleError, Destination, delivery_basename,
};
use crate::convert::{ConvertedImage, ImageConverter, graphic_name, tiff_description};
use crate::fetch::{ArticleFetcher, FetchError, HttpClient, RawImage, RetryPolicy};
use crate::journal::{Journal, JournalConnector, connector_for};
use crate::package::{ArchivePackager, PackageError};
use crate::report::{ArticleOutcome, OutcomeKind, ReportAggregator, RunReport};
use crate::resolver::{Crossref, DataCite, MetadataResolver, RegistryKind};
use crate::validate::{MarkupValidator, Validity};

/// Contact address sent to the Crossref polite pool when the caller does
/// not supply one.
pub const DEFAULT_MAILTO: &str = "helpdesk@library.caltech.edu";

/// Widest worker pool a run may request.
pub const MAX_JOBS: usize = 16;

/// Host resolved by the startup connectivity probe.
const PREFLIGHT_HOST: &str = "www.google.com:443";

/// How long the connectivity probe may take before the run is declared
/// offline.
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

/// DOI syntax accepted in plain identifier-list files.
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    Regex::new(r"^10\.\d{4,9}/\S+$").unwrap()
});

/// Everything a run needs to know, validated before any network work.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Which journal to archive.
    pub journal: Journal,
    /// Which destination's layout and packaging rules to follow.
    pub destination: Destination,
    /// Directory under which the journal's archive basename is rooted.
    pub output_dir: PathBuf,
    /// Publication-date cutoff; only articles strictly after it are kept.
    pub after: Option<NaiveDate>,
    /// Optional file naming the articles to archive (plain DOI list or the
    /// journal's article-list XML).
    pub article_file: Option<PathBuf>,
    /// Whether to run JATS validation.
    pub validate: bool,
    /// Whether to package assembled output into ZIP archives.
    pub package: bool,
    /// Width of the article worker pool.
    pub jobs: usize,
    /// Crossref polite-pool contact address.
    pub mailto: String,
    /// Whether to probe network connectivity before starting. Disabled in
    /// tests that run entirely against a local mock server.
    pub preflight: bool,
}

impl RunOptions {
    /// Creates options with the reference defaults: output in the current
    /// directory, full article list, validation and packaging on, one
    /// worker.
    #[must_use]
    pub fn new(journal: Journal, destination: Destination) -> Self {
        Self {
            journal,
            destination,
            output_dir: PathBuf::from("."),
            after: None,
            article_file: None,
            validate: true,
            package: true,
            jobs: 1,
            mailto: DEFAULT_MAILTO.to_string(),
            preflight: true,
        }
    }
}

/// Run-level failures. Everything here aborts the run; per-article
/// conditions never surface as `RunError`.
#[derive(Debug, Error)]
pub enum RunError {
    /// The startup connectivity probe failed.
    #[error("no network connection detected")]
    Offline,

    /// The user interrupted the run.
    #[error("run interrupted")]
    Interrupted,

    /// The article list could not be obtained from the journal site.
    #[error("could not obtain the article list")]
    List {
        /// Underlying transport failure.
        #[source]
        source: FetchError,
    },

    /// The article file could not be read.
    #[error("could not read article file {path}")]
    ArticleFile {
        /// The file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Packaging the assembled output failed after all articles were
    /// processed.
    #[error("packaging failed")]
    Package {
        /// Underlying packaging error.
        #[source]
        source: PackageError,
    },

    /// An internal fault: a worker panicked, or a component could not be
    /// built from its options.
    #[error("{reason}")]
    Fatal {
        /// What went wrong.
        reason: String,
    },
}

impl RunError {
    fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// The process exit code for this failure: 1 for no network, 2 for
    /// interruption, 3 for everything else. Completed runs use
    /// [`RunReport::exit_code`] instead.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Offline => 1,
            Self::Interrupted => 2,
            _ => 3,
        }
    }
}

/// One article's files on disk after assembly, kept for the packaging
/// step.
#[derive(Debug)]
struct AssembledArticle {
    basename: String,
    files: Vec<PathBuf>,
    success: bool,
}

/// What processing one article produced.
struct ProcessResult {
    outcome: ArticleOutcome,
    assembled: Option<AssembledArticle>,
}

/// The assembled per-article pipeline for one run.
///
/// Cheap to clone: shared components sit behind `Arc`, so each worker task
/// carries its own handle.
#[derive(Clone)]
pub struct Pipeline {
    connector: Arc<dyn JournalConnector>,
    resolver: Arc<MetadataResolver>,
    fetcher: ArticleFetcher,
    validator: Option<MarkupValidator>,
    converter: ImageConverter,
    destination: Destination,
    output_dir: PathBuf,
    article_file: Option<PathBuf>,
    after: Option<NaiveDate>,
    package: bool,
    jobs: usize,
    preflight: bool,
}

impl Pipeline {
    /// Builds the production pipeline: live connector, registries ordered
    /// by the journal's preference, one shared client and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Fatal`] when a component cannot be built from
    /// its options (an invalid Crossref mailto, in practice).
    pub fn from_options(options: &RunOptions) -> Result<Self, RunError> {
        let client = HttpClient::new();
        let retry = RetryPolicy::default();
        let connector = connector_for(options.journal, &client, &retry);

        let datacite: Box<dyn crate::resolver::MetadataRegistry> =
            Box::new(DataCite::new(client.clone(), retry.clone()));
        let crossref: Box<dyn crate::resolver::MetadataRegistry> = Box::new(
            Crossref::new(client.clone(), retry.clone(), options.mailto.clone())
                .map_err(|error| RunError::fatal(error.to_string()))?,
        );
        let registries = match connector.preferred_registry() {
            RegistryKind::DataCite => vec![datacite, crossref],
            RegistryKind::Crossref => vec![crossref, datacite],
        };

        let fetcher = ArticleFetcher::new(client, retry);
        Ok(Self::with_parts(
            connector,
            MetadataResolver::new(registries),
            fetcher,
            options,
        ))
    }

    /// Builds a pipeline from pre-built components. This is how tests
    /// point the pipeline at mock servers; production runs go through
    /// [`Pipeline::from_options`].
    #[must_use]
    pub fn with_parts(
        connector: Box<dyn JournalConnector>,
        resolver: MetadataResolver,
        fetcher: ArticleFetcher,
        options: &RunOptions,
    ) -> Self {
        Self {
            connector: Arc::from(connector),
            resolver: Arc::new(resolver),
            fetcher,
            validator: options.validate.then(MarkupValidator::new),
            converter: ImageConverter::new(),
            destination: options.destination,
            output_dir: options.output_dir.clone(),
            article_file: options.article_file.clone(),
            after: options.after,
            package: options.package,
            jobs: options.jobs.clamp(1, MAX_JOBS),
            preflight: options.preflight,
        }
    }

    /// The journal connector this run uses. Preview and index modes work
    /// through it directly.
    #[must_use]
    pub fn connector(&self) -> &dyn JournalConnector {
        self.connector.as_ref()
    }

    /// The directory that roots all assembled output for this run.
    #[must_use]
    pub fn output_root(&self) -> PathBuf {
        self.output_dir.join(self.connector.archive_basename())
    }

    /// Enumerates the articles this run would process: the article file or
    /// the live list, with the date filter and identifier filter applied
    /// as a conjunction.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::List`] when the live list cannot be fetched and
    /// [`RunError::ArticleFile`] when the article file cannot be read.
    #[instrument(skip(self))]
    pub async fn enumerate(&self) -> Result<Vec<ArticleDescriptor>, RunError> {
        let articles = match &self.article_file {
            None => self
                .connector
                .list_articles(self.after)
                .await
                .map_err(|source| RunError::List { source })?,
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| {
                    RunError::ArticleFile {
                        path: path.clone(),
                        source,
                    }
                })?;
                let mut articles = if is_article_list_xml(&text) {
                    self.connector.parse_article_index(&text)
                } else {
                    self.articles_for_dois(&doi_lines(&text)).await?
                };
                // The date filter composes with the file filter; it is
                // applied after the list is obtained, never instead of it.
                if let Some(cutoff) = self.after {
                    articles
                        .retain(|article| crate::journal::portal::published_after(article, cutoff));
                }
                articles
            }
        };
        info!(count = articles.len(), "enumerated articles");
        Ok(articles)
    }

    /// Matches a plain DOI list against the live article list. A requested
    /// DOI the journal does not list still yields a (bare) descriptor so
    /// the run reports it instead of silently dropping it.
    async fn articles_for_dois(
        &self,
        dois: &[String],
    ) -> Result<Vec<ArticleDescriptor>, RunError> {
        let listed = self
            .connector
            .list_articles(None)
            .await
            .map_err(|source| RunError::List { source })?;
        Ok(dois
            .iter()
            .map(|doi| {
                listed
                    .iter()
                    .find(|article| &article.doi == doi)
                    .cloned()
                    .unwrap_or_else(|| {
                        warn!(%doi, "requested DOI is not in the journal's article list");
                        ArticleDescriptor::new(doi.clone(), "", "", None, None, None)
                    })
            })
            .collect())
    }

    /// Runs the whole pipeline and returns the completed report.
    ///
    /// `cancel` is polled before each article is dispatched; once set, no
    /// new work starts and the run aborts with [`RunError::Interrupted`]
    /// instead of producing a report.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] for the run-level conditions of the error
    /// taxonomy; per-article failures are recorded in the report instead.
    #[instrument(skip_all, fields(journal = self.connector.name(), destination = %self.destination))]
    pub async fn run(&self, cancel: &Arc<AtomicBool>) -> Result<RunReport, RunError> {
        if self.preflight && !network_available().await {
            return Err(RunError::Offline);
        }

        let articles = self.enumerate().await?;
        if articles.is_empty() {
            info!("nothing to archive; no output will be written");
            return Ok(ReportAggregator::new().finalize());
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.jobs));
        let mut handles: Vec<tokio::task::JoinHandle<_>> = Vec::with_capacity(articles.len());
        for (index, descriptor) in articles.into_iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                for handle in &handles {
                    handle.abort();
                }
                return Err(RunError::Interrupted);
            }
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| RunError::fatal("article worker pool closed unexpectedly"))?;
            let pipeline = self.clone();
            handles.push(tokio::spawn(async move {
                let result = pipeline.process_article(&descriptor).await;
                drop(permit);
                (index, result)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(pair) => results.push(pair),
                Err(error) if error.is_cancelled() => return Err(RunError::Interrupted),
                Err(error) => {
                    return Err(RunError::fatal(format!("article worker panicked: {error}")));
                }
            }
        }
        if cancel.load(Ordering::SeqCst) {
            return Err(RunError::Interrupted);
        }

        // Exit-code computation and packaging wait for every worker; the
        // report is restored to enumeration order first.
        results.sort_by_key(|(index, _)| *index);
        let mut aggregator = ReportAggregator::new();
        let mut assembled = Vec::new();
        for (_, result) in results {
            aggregator.record(result.outcome);
            if let Some(article) = result.assembled {
                assembled.push(article);
            }
        }

        if self.package && !assembled.is_empty() {
            self.package_assembled(&assembled)?;
        }

        Ok(aggregator.finalize())
    }

    /// Drives one article through every stage, translating each failure
    /// into the article's single outcome. Nothing escapes this boundary.
    async fn process_article(&self, descriptor: &ArticleDescriptor) -> ProcessResult {
        let fail = |kind: OutcomeKind, detail: String| ProcessResult {
            outcome: ArticleOutcome::new(&descriptor.doi, kind, detail).with_listing(descriptor),
            assembled: None,
        };

        let metadata = match self.resolver.resolve(&descriptor.doi).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return fail(
                    OutcomeKind::MissingFile,
                    "no registry has a record for this DOI".to_string(),
                );
            }
            Err(error) => {
                return fail(
                    OutcomeKind::FetchError,
                    format!("registry lookup failed: {error}"),
                );
            }
        };

        let raw = match self.fetcher.fetch(descriptor).await {
            Ok(raw) => raw,
            Err(error) => {
                return fail(OutcomeKind::FetchError, format!("download failed: {error}"));
            }
        };
        let Some(pdf) = raw.pdf else {
            return fail(
                OutcomeKind::MissingFile,
                "PDF is not available at the source".to_string(),
            );
        };
        let Some(markup) = raw.jats else {
            return fail(
                OutcomeKind::MissingFile,
                "markup is not available at the source".to_string(),
            );
        };

        // A failed stage from here on degrades the article: its directory
        // is still assembled, with the broken piece recorded in the report
        // and missing files simply absent.
        let mut degraded: Option<(OutcomeKind, String)> = None;
        if let Some(validator) = &self.validator {
            match validator.validate(&markup) {
                Validity::Valid => {}
                Validity::Empty => {
                    warn!(doi = %descriptor.doi, "markup payload is empty");
                }
                invalid => degraded = Some((OutcomeKind::ValidationError, invalid.describe())),
            }
        }

        let images = self.convert_images(descriptor, &markup, &raw.images);
        if raw.images_expected > 0 && images.is_empty() && degraded.is_none() {
            degraded = Some((
                OutcomeKind::ConversionError,
                "no figure image could be converted".to_string(),
            ));
        }

        let bundle = ArticleBundle {
            descriptor: descriptor.clone(),
            metadata,
            pdf,
            markup,
            images,
        };
        let assembler = ArchiveAssembler::new(self.connector.as_ref());
        let files = match assembler.assemble(&self.output_root(), &bundle, self.destination) {
            Ok(files) => files,
            Err(AssembleError::MissingDate { .. }) => {
                return fail(
                    OutcomeKind::MissingFile,
                    "article list gives no usable publication date".to_string(),
                );
            }
            Err(error) => {
                return fail(
                    OutcomeKind::MissingFile,
                    format!("could not write article files: {error}"),
                );
            }
        };

        let (kind, detail) = degraded.unwrap_or_else(|| {
            (
                OutcomeKind::Success,
                format!("archived {} file(s)", files.len()),
            )
        });
        let basename = match self.destination {
            Destination::DarkArchive => descriptor.doi_tail().to_string(),
            Destination::DeliveryService => delivery_basename(self.connector.issn(), descriptor)
                .map_or_else(|_| descriptor.doi_tail().to_string(), |name| name),
        };
        ProcessResult {
            outcome: ArticleOutcome::new(&descriptor.doi, kind, detail).with_listing(descriptor),
            assembled: Some(AssembledArticle {
                basename,
                files,
                success: kind.is_success(),
            }),
        }
    }

    /// Converts each fetched image, naming the output after the markup's
    /// `<graphic>` reference (or the image URL's stem when the markup
    /// names none). One bad image warns; the caller decides whether the
    /// article degrades.
    fn convert_images(
        &self,
        descriptor: &ArticleDescriptor,
        markup: &[u8],
        raws: &[RawImage],
    ) -> Vec<ConvertedImage> {
        let today = Local::now().date_naive();
        let mut converted = Vec::new();
        for raw in raws {
            let name = graphic_name(markup)
                .map_or_else(|| url_file_stem(&raw.url), |href| image_basename(&href));
            let description = tiff_description(
                &raw.url,
                today,
                &descriptor.title,
                &descriptor.doi,
                &descriptor.date,
                self.connector.name(),
            );
            match self.converter.convert(&raw.bytes, &description) {
                Ok(bytes) => converted.push(ConvertedImage {
                    name: format!("{name}.tif"),
                    bytes,
                }),
                Err(error) => {
                    warn!(doi = %descriptor.doi, url = %raw.url, %error, "image conversion failed");
                }
            }
        }
        converted
    }

    /// Packages the assembled output: one combined archive for the dark
    /// archive, one archive per successful article for the delivery
    /// service.
    fn package_assembled(&self, assembled: &[AssembledArticle]) -> Result<(), RunError> {
        let packager = ArchivePackager::new(self.connector.name());
        match self.destination {
            Destination::DarkArchive => {
                let zip = packager
                    .package_tree(
                        &self.output_dir,
                        self.connector.archive_basename(),
                        assembled.len(),
                    )
                    .map_err(|source| RunError::Package { source })?;
                info!(archive = %zip.display(), articles = assembled.len(), "wrote combined archive");
            }
            Destination::DeliveryService => {
                let output_root = self.output_root();
                for article in assembled.iter().filter(|article| article.success) {
                    let zip = packager
                        .package_article(&output_root, &article.basename, &article.files)
                        .map_err(|source| RunError::Package { source })?;
                    debug!(archive = %zip.display(), "wrote per-article archive");
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("journal", &self.connector.name())
            .field("destination", &self.destination)
            .field("output_dir", &self.output_dir)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

/// Startup connectivity probe: can a well-known host name be resolved at
/// all? This catches the "laptop is offline" case before the run produces
/// a report full of identical fetch failures.
pub async fn network_available() -> bool {
    matches!(
        tokio::time::timeout(PREFLIGHT_TIMEOUT, tokio::net::lookup_host(PREFLIGHT_HOST)).await,
        Ok(Ok(_))
    )
}

/// True when an article file holds the journal's native list XML rather
/// than a plain DOI list.
fn is_article_list_xml(text: &str) -> bool {
    text.trim_start().starts_with("<?xml")
}

/// Extracts the DOIs from a plain identifier-list file, one per line.
/// Blank lines and `#` comments are ignored; a line that is not DOI
/// syntax is skipped with a warning.
fn doi_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| {
            if DOI_PATTERN.is_match(line) {
                true
            } else {
                warn!(line, "ignoring article-file line that is not a DOI");
                false
            }
        })
        .map(str::to_string)
        .collect()
}

/// File stem of a URL's last path segment, for naming a converted image
/// when the markup names no graphic.
fn url_file_stem(raw_url: &str) -> String {
    let segment = url::Url::parse(raw_url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| "image".to_string());
    image_basename(&segment)
}

/// Extensions removed when deriving a converted image's base name.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "tif", "tiff", "bmp", "webp"];

/// Removes a trailing image-file extension, and only that. Graphic names
/// are frequently DOI tails full of dots, so a generic stem operation
/// would eat part of the name.
fn image_basename(name: &str) -> String {
    if let Some((stem, extension)) = name.rsplit_once('.') {
        if IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()) {
            return stem.to_string();
        }
    }
    name.to_string()
}
