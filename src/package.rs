//! ZIP packaging of assembled article trees.
//!
//! Archives are written uncompressed (stored): the contents are already
//! compressed formats (PDF, TIFF) and preservation services prefer
//! directly inspectable members. Every archive carries a comment block
//! recording the journal, creation date, article count, and the software
//! that produced it, so an archive pulled off a shelf years later explains
//! itself.
//!
//! After writing, each archive is re-opened and its listing compared
//! against the files that went in. A listing mismatch fails the packaging
//! step, not any single article.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::{debug, instrument};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Errors from writing or verifying an archive.
///
/// Note on `From` trait implementations: conversions are deliberately not
/// implemented as `From` so call sites attach the failing path explicitly.
#[derive(Debug, Error)]
pub enum PackageError {
    /// A file or directory could not be read or removed.
    #[error("could not access {path}")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive itself could not be written or re-opened.
    #[error("could not write archive {path}")]
    Archive {
        /// The archive path.
        path: PathBuf,
        /// Underlying ZIP error.
        #[source]
        source: ZipError,
    },

    /// The re-opened archive does not list exactly the files written.
    #[error("archive {path} lists {found} entries where {expected} were written")]
    Listing {
        /// The archive path.
        path: PathBuf,
        /// Number of files written.
        expected: usize,
        /// Number of entries the archive reports.
        found: usize,
    },
}

impl PackageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn archive(path: &Path, source: ZipError) -> Self {
        Self::Archive {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Packages assembled article files into ZIP archives.
#[derive(Debug, Clone, Copy)]
pub struct ArchivePackager {
    journal_name: &'static str,
}

impl ArchivePackager {
    /// Creates a packager for one journal's archives.
    #[must_use]
    pub fn new(journal_name: &'static str) -> Self {
        Self { journal_name }
    }

    /// Packages a whole assembled tree into one combined archive.
    ///
    /// The archive lands at `parent/<basename>.zip`, with every entry
    /// prefixed by `basename/` so unpacking recreates the tree. The
    /// source tree is removed once the archive verifies.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError`] when the tree cannot be read, the archive
    /// cannot be written, or the re-read listing does not match.
    #[instrument(skip(self), fields(journal = self.journal_name))]
    pub fn package_tree(
        &self,
        parent: &Path,
        basename: &str,
        article_count: usize,
    ) -> Result<PathBuf, PackageError> {
        let tree = parent.join(basename);
        let zip_path = parent.join(format!("{basename}.zip"));

        let mut entries = Vec::new();
        collect_entries(&tree, basename, &mut entries)
            .map_err(|error| PackageError::io(&tree, error))?;

        self.write_archive(&zip_path, &entries, article_count)?;
        verify_listing(&zip_path, &entries)?;

        fs::remove_dir_all(&tree).map_err(|error| PackageError::io(&tree, error))?;
        debug!(archive = %zip_path.display(), entries = entries.len(), "packaged tree");
        Ok(zip_path)
    }

    /// Packages one article's flat files into `dest_dir/<basename>.zip`,
    /// entries named by file name only. The input files are removed once
    /// the archive verifies.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError`] when an input cannot be read, the archive
    /// cannot be written, or the re-read listing does not match.
    #[instrument(skip(self, files), fields(journal = self.journal_name, files = files.len()))]
    pub fn package_article(
        &self,
        dest_dir: &Path,
        basename: &str,
        files: &[PathBuf],
    ) -> Result<PathBuf, PackageError> {
        let zip_path = dest_dir.join(format!("{basename}.zip"));

        let entries: Vec<(String, PathBuf)> = files
            .iter()
            .map(|path| {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (name, path.clone())
            })
            .collect();

        self.write_archive(&zip_path, &entries, 1)?;
        verify_listing(&zip_path, &entries)?;

        for file in files {
            fs::remove_file(file).map_err(|error| PackageError::io(file, error))?;
        }
        debug!(archive = %zip_path.display(), entries = entries.len(), "packaged article");
        Ok(zip_path)
    }

    fn write_archive(
        &self,
        zip_path: &Path,
        entries: &[(String, PathBuf)],
        article_count: usize,
    ) -> Result<(), PackageError> {
        let file =
            fs::File::create(zip_path).map_err(|error| PackageError::io(zip_path, error))?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for (name, path) in entries {
            let bytes = fs::read(path).map_err(|error| PackageError::io(path, error))?;
            writer
                .start_file(name.as_str(), options)
                .map_err(|error| PackageError::archive(zip_path, error))?;
            writer
                .write_all(&bytes)
                .map_err(|error| PackageError::io(zip_path, error))?;
        }

        writer.set_comment(zip_comment(
            self.journal_name,
            article_count,
            Local::now().date_naive(),
        ));
        writer
            .finish()
            .map_err(|error| PackageError::archive(zip_path, error))?;
        Ok(())
    }
}

/// The comment block embedded in every archive.
#[must_use]
pub fn zip_comment(journal_name: &str, article_count: usize, today: NaiveDate) -> String {
    let border = "~ ".repeat(35);
    let (verb, plural) = if article_count == 1 {
        ("is", "")
    } else {
        ("are", "s")
    };
    format!(
        "{border}\n\
         About this ZIP archive file:\n\
         \n\
         This archive contains articles from {journal_name}\n\
         created on {today}. There {verb} {article_count} article{plural} in this archive.\n\
         \n\
         The software used to create this archive file was {software}\n\
         version {version} <{url}>\n\
         {border}\n",
        software = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        url = env!("CARGO_PKG_REPOSITORY"),
    )
}

/// Collects `(entry name, path)` pairs for every file under `dir`,
/// depth-first with sorted siblings, entry names rooted at `prefix`.
fn collect_entries(
    dir: &Path,
    prefix: &str,
    entries: &mut Vec<(String, PathBuf)>,
) -> std::io::Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    children.sort_by_key(std::fs::DirEntry::file_name);
    for child in children {
        let name = child.file_name().to_string_lossy().into_owned();
        let entry_name = format!("{prefix}/{name}");
        let path = child.path();
        if path.is_dir() {
            collect_entries(&path, &entry_name, entries)?;
        } else {
            entries.push((entry_name, path));
        }
    }
    Ok(())
}

/// Re-opens the archive and checks its listing names exactly the entries
/// written.
fn verify_listing(zip_path: &Path, entries: &[(String, PathBuf)]) -> Result<(), PackageError> {
    let file = fs::File::open(zip_path).map_err(|error| PackageError::io(zip_path, error))?;
    let archive = ZipArchive::new(file).map_err(|error| PackageError::archive(zip_path, error))?;

    let mut found: Vec<String> = archive.file_names().map(str::to_string).collect();
    found.sort();
    let mut expected: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();
    expected.sort();

    if found != expected {
        return Err(PackageError::Listing {
            path: zip_path.to_path_buf(),
            expected: expected.len(),
            found: found.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }

    // ==================== Combined Archive Tests ====================

    #[test]
    fn test_package_tree_round_trips_listing() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("micropublication-org");
        write(&tree.join("a/a.pdf"), b"pdf a");
        write(&tree.join("a/a.xml"), b"<resource/>");
        write(&tree.join("a/jats/a-markup.xml"), b"<article/>");
        write(&tree.join("b/b.pdf"), b"pdf b");

        let packager = ArchivePackager::new("microPublication");
        let zip_path = packager
            .package_tree(dir.path(), "micropublication-org", 2)
            .unwrap();

        assert_eq!(zip_path, dir.path().join("micropublication-org.zip"));
        assert!(!tree.exists(), "source tree should be removed");

        let mut archive = ZipArchive::new(fs::File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "micropublication-org/a/a.pdf",
                "micropublication-org/a/a.xml",
                "micropublication-org/a/jats/a-markup.xml",
                "micropublication-org/b/b.pdf",
            ]
        );

        let mut content = String::new();
        std::io::Read::read_to_string(
            &mut archive.by_name("micropublication-org/a/a.pdf").unwrap(),
            &mut content,
        )
        .unwrap();
        assert_eq!(content, "pdf a");
    }

    #[test]
    fn test_package_tree_stores_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("archive");
        write(&tree.join("file.pdf"), b"bytes");

        let packager = ArchivePackager::new("microPublication");
        let zip_path = packager.package_tree(dir.path(), "archive", 1).unwrap();

        let mut archive = ZipArchive::new(fs::File::open(&zip_path).unwrap()).unwrap();
        let entry = archive.by_index(0).unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn test_package_tree_records_article_count_in_comment() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("archive");
        write(&tree.join("file.pdf"), b"bytes");

        let packager = ArchivePackager::new("microPublication");
        let zip_path = packager.package_tree(dir.path(), "archive", 3).unwrap();

        let archive = ZipArchive::new(fs::File::open(&zip_path).unwrap()).unwrap();
        let comment = String::from_utf8(archive.comment().to_vec()).unwrap();
        assert!(comment.contains("There are 3 articles in this archive."));
        assert!(comment.contains("articles from microPublication"));
    }

    // ==================== Per-Article Archive Tests ====================

    #[test]
    fn test_package_article_flat_names_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("25789430-2019-a.pdf");
        let xml = dir.path().join("25789430-2019-a.xml");
        write(&pdf, b"pdf");
        write(&xml, b"<article/>");

        let packager = ArchivePackager::new("microPublication");
        let zip_path = packager
            .package_article(dir.path(), "25789430-2019-a", &[pdf.clone(), xml.clone()])
            .unwrap();

        assert_eq!(zip_path, dir.path().join("25789430-2019-a.zip"));
        assert!(!pdf.exists(), "inputs should be removed after packaging");
        assert!(!xml.exists());

        let archive = ZipArchive::new(fs::File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["25789430-2019-a.pdf", "25789430-2019-a.xml"]);

        let comment = String::from_utf8(archive.comment().to_vec()).unwrap();
        assert!(comment.contains("There is 1 article in this archive."));
    }

    // ==================== Comment Tests ====================

    #[test]
    fn test_zip_comment_pluralization() {
        let today = NaiveDate::from_ymd_opt(2021, 3, 15).unwrap();
        let one = zip_comment("microPublication", 1, today);
        assert!(one.contains("There is 1 article in this archive."));
        let many = zip_comment("microPublication", 12, today);
        assert!(many.contains("There are 12 articles in this archive."));
    }

    #[test]
    fn test_zip_comment_shape() {
        let today = NaiveDate::from_ymd_opt(2021, 3, 15).unwrap();
        let comment = zip_comment("Prompt", 2, today);
        assert!(comment.starts_with("~ "));
        assert!(comment.ends_with("~ \n"));
        assert!(comment.contains("About this ZIP archive file:"));
        assert!(comment.contains("created on 2021-03-15."));
        assert!(comment.contains(concat!("version ", env!("CARGO_PKG_VERSION"))));
    }
}
