//! Laying out one article's materials as archive-ready files.
//!
//! Each destination service dictates its own directory shape and file
//! naming, so assembly is driven by a two-variant [`Destination`] strategy
//! passed in explicitly. The dark-archive layout nests everything for one
//! article under a directory named by its DOI tail; the delivery-service
//! layout writes flat files named to the receiving service's convention and
//! is packaged per article rather than collectively.
//!
//! Assembly is all-or-nothing at the directory level: a degraded article
//! (validation or image conversion failed upstream) still gets its
//! directory, with the missing pieces simply absent rather than stubbed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::article::ArticleDescriptor;
use crate::convert::ConvertedImage;
use crate::journal::JournalConnector;
use crate::resolver::MetadataRecord;

/// Rights statement recorded in every article's metadata file.
const RIGHTS_TEXT: &str = "Creative Commons Attribution 4.0";
const RIGHTS_URL: &str = "https://creativecommons.org/licenses/by/4.0/legalcode";

/// Name of the markup subdirectory in the dark-archive layout.
const MARKUP_SUBDIR: &str = "jats";

/// Where the assembled articles are headed.
///
/// Selects both the on-disk layout rules here and the packaging granularity
/// in [`crate::package`]: a dark archive takes one combined archive, a
/// delivery service takes one archive per article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Preservation (dark) archive, Portico-style: nested per-article
    /// directories, packaged collectively.
    DarkArchive,
    /// Active delivery service, PMC-style: flat per-article files named to
    /// the service's convention, packaged one archive per article.
    DeliveryService,
}

impl Destination {
    /// Parses a destination tag as given on the command line
    /// (case-insensitive).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "portico" => Some(Self::DarkArchive),
            "pmc" => Some(Self::DeliveryService),
            _ => None,
        }
    }

    /// The canonical tag for this destination.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::DarkArchive => "portico",
            Self::DeliveryService => "pmc",
        }
    }

    /// Tags of every supported destination, for error messages and help
    /// text.
    #[must_use]
    pub fn supported_tags() -> &'static [&'static str] {
        &["portico", "pmc"]
    }

    /// True when this destination wants one archive per article instead of
    /// one combined archive.
    #[must_use]
    pub fn packages_per_article(self) -> bool {
        matches!(self, Self::DeliveryService)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The materials for one article, held together for assembly.
///
/// Owned exclusively by the unit of work processing the article; nothing
/// here is shared across concurrent articles.
#[derive(Debug, Clone)]
pub struct ArticleBundle {
    /// The article as listed by the journal site.
    pub descriptor: ArticleDescriptor,
    /// The registry metadata record resolved for the article.
    pub metadata: MetadataRecord,
    /// Raw PDF bytes.
    pub pdf: Vec<u8>,
    /// Raw structured-markup bytes, written as fetched.
    pub markup: Vec<u8>,
    /// Figure images already converted to archival TIFF. Empty when the
    /// article has no figure or conversion failed.
    pub images: Vec<ConvertedImage>,
}

/// Errors from assembling one article's directory.
///
/// Note on `From` trait implementations: conversions are deliberately not
/// implemented as `From` so call sites attach the article and path context
/// explicitly.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// The article list gave no parseable publication date, so the
    /// year-bearing file names cannot be formed.
    #[error("article {doi} has no usable publication date")]
    MissingDate {
        /// The article's DOI.
        doi: String,
    },

    /// The metadata document could not be rendered.
    #[error("could not render metadata for {doi}: {detail}")]
    Render {
        /// The article's DOI.
        doi: String,
        /// Renderer diagnostic.
        detail: String,
    },

    /// A file or directory could not be written.
    #[error("could not write {path}")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl AssembleError {
    fn missing_date(doi: &str) -> Self {
        Self::MissingDate {
            doi: doi.to_string(),
        }
    }

    fn render(doi: &str, detail: String) -> Self {
        Self::Render {
            doi: doi.to_string(),
            detail,
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Lays out assembled articles under a destination directory.
pub struct ArchiveAssembler<'a> {
    connector: &'a dyn JournalConnector,
}

impl<'a> ArchiveAssembler<'a> {
    /// Creates an assembler for one journal's articles.
    #[must_use]
    pub fn new(connector: &'a dyn JournalConnector) -> Self {
        Self { connector }
    }

    /// Writes one article's files under `dest_dir` in the layout the
    /// destination wants, returning the paths written.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError`] when a file cannot be written or the
    /// metadata document cannot be formed.
    #[instrument(skip(self, bundle), fields(doi = %bundle.descriptor.doi, destination = %destination))]
    pub fn assemble(
        &self,
        dest_dir: &Path,
        bundle: &ArticleBundle,
        destination: Destination,
    ) -> Result<Vec<PathBuf>, AssembleError> {
        match destination {
            Destination::DarkArchive => self.assemble_dark_archive(dest_dir, bundle),
            Destination::DeliveryService => self.assemble_delivery(dest_dir, bundle),
        }
    }

    /// Dark-archive layout: `<tail>/<tail>.xml`, `<tail>/<tail>.pdf`, and a
    /// `jats/` subdirectory holding the markup (renamed to the
    /// ISSN-year-DOI pattern) plus converted images.
    fn assemble_dark_archive(
        &self,
        dest_dir: &Path,
        bundle: &ArticleBundle,
    ) -> Result<Vec<PathBuf>, AssembleError> {
        let descriptor = &bundle.descriptor;
        let tail = descriptor.doi_tail();
        let article_dir = dest_dir.join(tail);
        let markup_dir = article_dir.join(MARKUP_SUBDIR);
        fs::create_dir_all(&markup_dir).map_err(|error| AssembleError::io(&markup_dir, error))?;

        let mut written = Vec::new();

        let metadata_file = article_dir.join(format!("{tail}.xml"));
        let metadata = self.metadata_xml(bundle)?;
        write_file(&metadata_file, &metadata)?;
        written.push(metadata_file);

        let pdf_file = article_dir.join(format!("{tail}.pdf"));
        write_file(&pdf_file, &bundle.pdf)?;
        written.push(pdf_file);

        let basename = delivery_basename(self.connector.issn(), descriptor)?;
        let markup_file = markup_dir.join(format!("{basename}.xml"));
        write_file(&markup_file, &bundle.markup)?;
        written.push(markup_file);

        for image in &bundle.images {
            let image_file = markup_dir.join(&image.name);
            write_file(&image_file, &image.bytes)?;
            written.push(image_file);
        }

        debug!(files = written.len(), "assembled article directory");
        Ok(written)
    }

    /// Delivery-service layout: flat `<issn><year>-<tail>.pdf` and `.xml`
    /// plus converted images, all directly under `dest_dir`.
    fn assemble_delivery(
        &self,
        dest_dir: &Path,
        bundle: &ArticleBundle,
    ) -> Result<Vec<PathBuf>, AssembleError> {
        let descriptor = &bundle.descriptor;
        fs::create_dir_all(dest_dir).map_err(|error| AssembleError::io(dest_dir, error))?;
        let basename = delivery_basename(self.connector.issn(), descriptor)?;

        let mut written = Vec::new();

        let pdf_file = dest_dir.join(format!("{basename}.pdf"));
        write_file(&pdf_file, &bundle.pdf)?;
        written.push(pdf_file);

        let markup_file = dest_dir.join(format!("{basename}.xml"));
        write_file(&markup_file, &bundle.markup)?;
        written.push(markup_file);

        for image in &bundle.images {
            let image_file = dest_dir.join(&image.name);
            write_file(&image_file, &image.bytes)?;
            written.push(image_file);
        }

        debug!(files = written.len(), "assembled article files");
        Ok(written)
    }

    /// Renders the per-article metadata document from the resolved registry
    /// record plus journal constants.
    fn metadata_xml(&self, bundle: &ArticleBundle) -> Result<Vec<u8>, AssembleError> {
        let descriptor = &bundle.descriptor;
        let record = &bundle.metadata;
        let doi = &descriptor.doi;

        let year = record
            .publication_year
            .or_else(|| publication_year(&descriptor.date));
        let volume = year
            .and_then(|year| self.connector.volume_for_year(year))
            .map(|volume| volume.to_string())
            .or_else(|| record.volume.clone());
        let journal = record
            .journal
            .clone()
            .unwrap_or_else(|| self.connector.name().to_string());
        let date = record
            .registered
            .clone()
            .filter(|registered| !registered.is_empty())
            .unwrap_or_else(|| descriptor.date.clone());

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        render_resource(
            &mut writer,
            &Resource {
                doi,
                title: record.title.as_deref(),
                creators: &record.creators,
                journal: &journal,
                year,
                volume: volume.as_deref(),
                issn: self.connector.issn(),
                date: &date,
                file: format!("{}.pdf", descriptor.doi_tail()),
            },
        )
        .map_err(|detail| AssembleError::render(doi, detail))?;
        Ok(writer.into_inner())
    }
}

impl fmt::Debug for ArchiveAssembler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveAssembler")
            .field("journal", &self.connector.name())
            .finish_non_exhaustive()
    }
}

/// The delivery-service base file name, `{issn}{year}-{doi tail}` with the
/// ISSN dash removed. Also names the markup file inside the dark-archive
/// layout.
///
/// # Errors
///
/// Returns [`AssembleError::MissingDate`] when the descriptor's date does
/// not parse, since the year segment comes from it.
pub fn delivery_basename(
    issn: &str,
    descriptor: &ArticleDescriptor,
) -> Result<String, AssembleError> {
    let year = publication_year(&descriptor.date)
        .ok_or_else(|| AssembleError::missing_date(&descriptor.doi))?;
    Ok(format!(
        "{}-{}-{}",
        issn.replace('-', ""),
        year,
        descriptor.doi_tail()
    ))
}

/// Year of a `YYYY-MM-DD` date string, if it parses.
fn publication_year(date: &str) -> Option<i32> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .ok()
        .map(|date| date.year())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), AssembleError> {
    fs::write(path, bytes).map_err(|error| AssembleError::io(path, error))
}

/// Fields of the rendered metadata document, gathered before writing.
struct Resource<'a> {
    doi: &'a str,
    title: Option<&'a str>,
    creators: &'a [String],
    journal: &'a str,
    year: Option<i32>,
    volume: Option<&'a str>,
    issn: &'a str,
    date: &'a str,
    file: String,
}

type MetadataWriter = Writer<Vec<u8>>;

fn render_resource(writer: &mut MetadataWriter, resource: &Resource<'_>) -> Result<(), String> {
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(|error| error.to_string())?;
    start(writer, "resource")?;

    start_with_attribute(writer, "identifier", "identifierType", "DOI")?;
    text(writer, resource.doi)?;
    end(writer, "identifier")?;

    if !resource.creators.is_empty() {
        start(writer, "creators")?;
        for creator in resource.creators {
            start(writer, "creator")?;
            text_element(writer, "creatorName", creator)?;
            end(writer, "creator")?;
        }
        end(writer, "creators")?;
    }

    if let Some(title) = resource.title {
        start(writer, "titles")?;
        text_element(writer, "title", title)?;
        end(writer, "titles")?;
    }

    text_element(writer, "journal", resource.journal)?;
    if let Some(year) = resource.year {
        text_element(writer, "publicationYear", &year.to_string())?;
    }
    if let Some(volume) = resource.volume {
        text_element(writer, "volume", volume)?;
    }
    text_element(writer, "e-issn", resource.issn)?;

    if !resource.date.is_empty() {
        start(writer, "dates")?;
        text_element(writer, "date", resource.date)?;
        end(writer, "dates")?;
    }

    text_element(writer, "file", &resource.file)?;

    start(writer, "rightsList")?;
    text_element(writer, "rights", RIGHTS_TEXT)?;
    text_element(writer, "rightsURI", RIGHTS_URL)?;
    end(writer, "rightsList")?;

    end(writer, "resource")
}

fn start(writer: &mut MetadataWriter, name: &str) -> Result<(), String> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|error| error.to_string())
}

fn start_with_attribute(
    writer: &mut MetadataWriter,
    name: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    let element = BytesStart::new(name).with_attributes([(key, value)]);
    writer
        .write_event(Event::Start(element))
        .map_err(|error| error.to_string())
}

fn end(writer: &mut MetadataWriter, name: &str) -> Result<(), String> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|error| error.to_string())
}

fn text(writer: &mut MetadataWriter, value: &str) -> Result<(), String> {
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|error| error.to_string())
}

fn text_element(writer: &mut MetadataWriter, name: &str, value: &str) -> Result<(), String> {
    start(writer, name)?;
    text(writer, value)?;
    end(writer, name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fetch::{HttpClient, RetryPolicy};
    use crate::journal::{Journal, connector_for};

    fn descriptor() -> ArticleDescriptor {
        ArticleDescriptor::new(
            "10.17912/micropub.biology.000102",
            "Loss of courtship behavior",
            "2019-05-21",
            Some("https://example.org/a.pdf".to_string()),
            Some("https://example.org/a.xml".to_string()),
            Some("https://example.org/a.png".to_string()),
        )
    }

    fn record() -> MetadataRecord {
        MetadataRecord {
            doi: "10.17912/micropub.biology.000102".to_string(),
            title: Some("Loss of courtship behavior".to_string()),
            creators: vec!["Chen, Yong".to_string(), "Seto, Elena".to_string()],
            journal: Some("microPublication Biology".to_string()),
            publication_year: Some(2019),
            volume: None,
            registered: Some("2019-05-21T14:02:11Z".to_string()),
        }
    }

    fn bundle() -> ArticleBundle {
        ArticleBundle {
            descriptor: descriptor(),
            metadata: record(),
            pdf: b"%PDF-1.4 fake".to_vec(),
            markup: b"<article><body/></article>".to_vec(),
            images: vec![ConvertedImage {
                name: "25789430-2019-micropub.biology.000102.tif".to_string(),
                bytes: vec![0x49, 0x49, 0x2a, 0x00],
            }],
        }
    }

    fn micropub() -> Box<dyn JournalConnector> {
        connector_for(
            Journal::Micropublication,
            &HttpClient::new(),
            &RetryPolicy::default(),
        )
    }

    // ==================== Destination Tests ====================

    #[test]
    fn test_destination_from_tag() {
        assert_eq!(Destination::from_tag("portico"), Some(Destination::DarkArchive));
        assert_eq!(Destination::from_tag("PMC"), Some(Destination::DeliveryService));
        assert_eq!(Destination::from_tag(" Portico "), Some(Destination::DarkArchive));
        assert_eq!(Destination::from_tag("ftp"), None);
    }

    #[test]
    fn test_destination_packaging_granularity() {
        assert!(!Destination::DarkArchive.packages_per_article());
        assert!(Destination::DeliveryService.packages_per_article());
    }

    #[test]
    fn test_destination_tag_round_trips() {
        for tag in Destination::supported_tags() {
            assert_eq!(Destination::from_tag(tag).unwrap().tag(), *tag);
        }
    }

    // ==================== Basename Tests ====================

    #[test]
    fn test_delivery_basename_format() {
        let name = delivery_basename("2578-9430", &descriptor()).unwrap();
        assert_eq!(name, "25789430-2019-micropub.biology.000102");
    }

    #[test]
    fn test_delivery_basename_rejects_missing_date() {
        let mut undated = descriptor();
        undated.date = String::new();
        let error = delivery_basename("2578-9430", &undated).unwrap_err();
        assert!(matches!(error, AssembleError::MissingDate { .. }));
    }

    // ==================== Dark Archive Layout Tests ====================

    #[test]
    fn test_dark_archive_layout() {
        let dir = tempfile::tempdir().unwrap();
        let connector = micropub();
        let assembler = ArchiveAssembler::new(connector.as_ref());

        let written = assembler
            .assemble(dir.path(), &bundle(), Destination::DarkArchive)
            .unwrap();

        let article_dir = dir.path().join("micropub.biology.000102");
        assert!(article_dir.join("micropub.biology.000102.xml").is_file());
        assert!(article_dir.join("micropub.biology.000102.pdf").is_file());
        assert!(
            article_dir
                .join("jats/25789430-2019-micropub.biology.000102.xml")
                .is_file()
        );
        assert!(
            article_dir
                .join("jats/25789430-2019-micropub.biology.000102.tif")
                .is_file()
        );
        assert_eq!(written.len(), 4);
        for path in &written {
            assert!(path.is_file(), "reported path missing: {}", path.display());
        }
    }

    #[test]
    fn test_dark_archive_without_images_omits_them() {
        let dir = tempfile::tempdir().unwrap();
        let connector = micropub();
        let assembler = ArchiveAssembler::new(connector.as_ref());
        let mut degraded = bundle();
        degraded.images.clear();

        let written = assembler
            .assemble(dir.path(), &degraded, Destination::DarkArchive)
            .unwrap();

        assert_eq!(written.len(), 3);
        let markup_dir = dir.path().join("micropub.biology.000102/jats");
        let entries: Vec<_> = fs::read_dir(&markup_dir).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the markup file should be present");
    }

    // ==================== Delivery Layout Tests ====================

    #[test]
    fn test_delivery_layout_is_flat() {
        let dir = tempfile::tempdir().unwrap();
        let connector = micropub();
        let assembler = ArchiveAssembler::new(connector.as_ref());

        let written = assembler
            .assemble(dir.path(), &bundle(), Destination::DeliveryService)
            .unwrap();

        assert!(
            dir.path()
                .join("25789430-2019-micropub.biology.000102.pdf")
                .is_file()
        );
        assert!(
            dir.path()
                .join("25789430-2019-micropub.biology.000102.xml")
                .is_file()
        );
        assert!(
            dir.path()
                .join("25789430-2019-micropub.biology.000102.tif")
                .is_file()
        );
        assert_eq!(written.len(), 3);
    }

    // ==================== Metadata Rendering Tests ====================

    fn rendered_metadata(bundle: &ArticleBundle) -> String {
        let connector = micropub();
        let assembler = ArchiveAssembler::new(connector.as_ref());
        String::from_utf8(assembler.metadata_xml(bundle).unwrap()).unwrap()
    }

    #[test]
    fn test_metadata_document_content() {
        let xml = rendered_metadata(&bundle());

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains(
            "<identifier identifierType=\"DOI\">10.17912/micropub.biology.000102</identifier>"
        ));
        assert!(xml.contains("<creatorName>Chen, Yong</creatorName>"));
        assert!(xml.contains("<creatorName>Seto, Elena</creatorName>"));
        assert!(xml.contains("<title>Loss of courtship behavior</title>"));
        assert!(xml.contains("<journal>microPublication Biology</journal>"));
        assert!(xml.contains("<publicationYear>2019</publicationYear>"));
        assert!(xml.contains("<e-issn>2578-9430</e-issn>"));
        assert!(xml.contains("<date>2019-05-21T14:02:11Z</date>"));
        assert!(xml.contains("<file>micropub.biology.000102.pdf</file>"));
        assert!(xml.contains("<rights>Creative Commons Attribution 4.0</rights>"));
        assert!(xml.contains(
            "<rightsURI>https://creativecommons.org/licenses/by/4.0/legalcode</rightsURI>"
        ));
    }

    #[test]
    fn test_metadata_volume_follows_journal_rule() {
        // microPublication's volume 5 covers 2019.
        let xml = rendered_metadata(&bundle());
        assert!(xml.contains("<volume>5</volume>"));
    }

    #[test]
    fn test_metadata_volume_falls_back_to_record() {
        let connector = connector_for(
            Journal::Prompt,
            &HttpClient::new(),
            &RetryPolicy::default(),
        );
        let assembler = ArchiveAssembler::new(connector.as_ref());
        let mut with_volume = bundle();
        with_volume.metadata.volume = Some("7".to_string());
        let xml = String::from_utf8(assembler.metadata_xml(&with_volume).unwrap()).unwrap();
        assert!(xml.contains("<volume>7</volume>"));
    }

    #[test]
    fn test_metadata_date_falls_back_to_list_date() {
        let mut unregistered = bundle();
        unregistered.metadata.registered = None;
        let xml = rendered_metadata(&unregistered);
        assert!(xml.contains("<date>2019-05-21</date>"));
    }

    #[test]
    fn test_metadata_year_falls_back_to_list_date() {
        let mut yearless = bundle();
        yearless.metadata.publication_year = None;
        let xml = rendered_metadata(&yearless);
        // The list date supplies 2019, and the volume rule still applies.
        assert!(xml.contains("<publicationYear>2019</publicationYear>"));
        assert!(xml.contains("<volume>5</volume>"));
    }

    #[test]
    fn test_metadata_omits_missing_title() {
        let mut untitled = bundle();
        untitled.metadata.title = None;
        let xml = rendered_metadata(&untitled);
        assert!(!xml.contains("<titles>"));
    }

    #[test]
    fn test_metadata_escapes_reserved_characters() {
        let mut spicy = bundle();
        spicy.metadata.title = Some("Expression of <i>lin-4</i> & friends".to_string());
        let xml = rendered_metadata(&spicy);
        assert!(xml.contains("Expression of &lt;i&gt;lin-4&lt;/i&gt; &amp; friends"));
    }

    #[test]
    fn test_metadata_journal_falls_back_to_connector_name() {
        let mut unnamed = bundle();
        unnamed.metadata.journal = None;
        let xml = rendered_metadata(&unnamed);
        assert!(xml.contains("<journal>microPublication</journal>"));
    }
}
