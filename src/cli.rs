//! CLI argument definitions using clap derive macros, and their
//! validation into run options.
//!
//! Validation happens entirely before any network work: an unsupported
//! journal or destination tag, an unparseable date, or an unusable path is
//! a configuration error that fails fast with exit code 3 and no partial
//! output.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use pubarchiver_core::{
    DEFAULT_MAILTO, Destination, Journal, ReportFormat, RunOptions, parse_flexible_date,
};

/// Archive scholarly-journal articles for preservation services.
///
/// Pubarchiver pulls article metadata and files from a journal site and the
/// bibliographic registries, validates and converts them, and packages
/// destination-ready archives for Portico-style or PMC-style ingestion.
#[derive(Parser, Debug)]
#[command(name = "pubarchiver")]
#[command(author, version, about)]
pub struct Args {
    /// Journal to archive
    #[arg(short = 'j', long, value_name = "JOURNAL")]
    pub journal: String,

    /// Destination structure: "portico" or "pmc"
    #[arg(short = 's', long, default_value = "portico", value_name = "DEST")]
    pub structure: String,

    /// Directory where output is written
    #[arg(short = 'o', long, default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Only archive articles published after this date (absolute like
    /// "2021-01-01" or relative like "2 weeks ago")
    #[arg(short = 'd', long, value_name = "DATE")]
    pub after_date: Option<String>,

    /// File naming the articles to archive: a plain DOI list (one per
    /// line) or the journal's article-list XML
    #[arg(short = 'a', long, value_name = "FILE")]
    pub article_file: Option<PathBuf>,

    /// Write the report to this file (default: print to the terminal)
    #[arg(short = 'r', long, value_name = "FILE")]
    pub report_file: Option<PathBuf>,

    /// Report format: "csv", "html", or a comma-separated list of both
    #[arg(short = 'f', long, default_value = "csv", value_name = "FMT")]
    pub report_format: String,

    /// Title to put in the report
    #[arg(short = 't', long, value_name = "TITLE")]
    pub report_title: Option<String>,

    /// Preview what would be archived without downloading anything
    #[arg(short = 'p', long)]
    pub preview: bool,

    /// Print the journal's raw article-list XML and exit
    #[arg(short = 'g', long)]
    pub get_index: bool,

    /// Skip JATS validation
    #[arg(short = 'X', long)]
    pub no_validate: bool,

    /// Leave the assembled directory tree unpackaged
    #[arg(short = 'Z', long)]
    pub no_zip: bool,

    /// Concurrent article workers (1-16)
    #[arg(short = 'w', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub jobs: u8,

    /// Email address identifying this client to the Crossref polite pool
    #[arg(long, default_value = DEFAULT_MAILTO, value_name = "EMAIL")]
    pub mailto: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// A command line that does not describe a runnable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The journal tag is not one of the supported journals.
    #[error("unsupported journal {tag:?}; supported journals: {supported}")]
    Journal {
        /// The tag given.
        tag: String,
        /// Comma-separated supported tags.
        supported: String,
    },

    /// The destination tag is not one of the supported destinations.
    #[error("unsupported destination {tag:?}; supported destinations: {supported}")]
    Destination {
        /// The tag given.
        tag: String,
        /// Comma-separated supported tags.
        supported: String,
    },

    /// The date filter could not be parsed.
    #[error("unable to parse date {input:?}")]
    Date {
        /// The input given.
        input: String,
    },

    /// A report format tag is not supported.
    #[error("unsupported report format {tag:?}; supported formats: {supported}")]
    Format {
        /// The tag given.
        tag: String,
        /// Comma-separated supported tags.
        supported: String,
    },

    /// The article file does not exist or is not a file.
    #[error("article file is not readable: {path}")]
    ArticleFile {
        /// The path given.
        path: PathBuf,
    },

    /// The output directory does not exist or is not a directory.
    #[error("output directory does not exist: {path}")]
    OutputDir {
        /// The path given.
        path: PathBuf,
    },
}

/// The validated run configuration: pipeline options plus the reporting
/// and mode switches the binary handles itself.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Options handed to the pipeline.
    pub options: RunOptions,
    /// Where to write the report; `None` prints it to the terminal.
    pub report_file: Option<PathBuf>,
    /// Formats to render the report in.
    pub report_formats: Vec<ReportFormat>,
    /// Title for the report; defaults to journal and destination.
    pub report_title: Option<String>,
    /// Preview mode: enumerate and print, archive nothing.
    pub preview: bool,
    /// Index mode: print the raw article list, archive nothing.
    pub get_index: bool,
}

impl Args {
    /// Validates the arguments into a run configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first unusable argument.
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        let journal = Journal::from_tag(&self.journal).ok_or_else(|| ConfigError::Journal {
            tag: self.journal.clone(),
            supported: Journal::supported_tags().join(", "),
        })?;
        let destination =
            Destination::from_tag(&self.structure).ok_or_else(|| ConfigError::Destination {
                tag: self.structure.clone(),
                supported: Destination::supported_tags().join(", "),
            })?;

        let after = match &self.after_date {
            None => None,
            Some(input) => Some(parse_flexible_date(input).ok_or_else(|| ConfigError::Date {
                input: input.clone(),
            })?),
        };

        let mut report_formats = Vec::new();
        for tag in self.report_format.split(',') {
            let format = ReportFormat::from_tag(tag).ok_or_else(|| ConfigError::Format {
                tag: tag.trim().to_string(),
                supported: ReportFormat::supported_tags().join(", "),
            })?;
            if !report_formats.contains(&format) {
                report_formats.push(format);
            }
        }

        if let Some(path) = &self.article_file {
            if !path.is_file() {
                return Err(ConfigError::ArticleFile { path: path.clone() });
            }
        }
        if !self.output_dir.is_dir() {
            return Err(ConfigError::OutputDir {
                path: self.output_dir.clone(),
            });
        }

        let mut options = RunOptions::new(journal, destination);
        options.output_dir = self.output_dir;
        options.after = after;
        options.article_file = self.article_file;
        options.validate = !self.no_validate;
        options.package = !self.no_zip;
        options.jobs = usize::from(self.jobs);
        options.mailto = self.mailto;

        Ok(RunConfig {
            options,
            report_file: self.report_file,
            report_formats,
            report_title: self.report_title,
            preview: self.preview,
            get_index: self.get_index,
        })
    }
}
