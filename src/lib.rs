//! Pubarchiver Core Library
//!
//! This library builds preservation-ready archives of scholarly-journal
//! articles: it pulls per-article metadata and files from journal sites and
//! bibliographic registries, validates and normalizes them, and assembles
//! destination-specific output bundles for a dark archive (Portico-style)
//! or a delivery service (PMC-style).
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`journal`] - Journal connectors: article enumeration and source URLs
//! - [`resolver`] - DOI metadata resolution against DataCite and Crossref
//! - [`fetch`] - HTTP client, shared retry policy, article file downloads
//! - [`validate`] - Structural JATS markup validation
//! - [`convert`] - Figure conversion to archival TIFF
//! - [`assemble`] - Destination-specific directory layout
//! - [`package`] - ZIP packaging with structural verification
//! - [`report`] - Per-article outcomes, report rendering, exit codes
//! - [`pipeline`] - The run orchestration tying the stages together
//! - [`article`] - The article descriptor shared by every stage
//! - [`dates`] - Flexible date parsing for the publication-date filter

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod article;
pub mod assemble;
pub mod convert;
pub mod dates;
pub mod fetch;
pub mod journal;
pub mod package;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub(crate) mod user_agent;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use article::{ArticleDescriptor, doi_tail};
pub use assemble::{ArchiveAssembler, ArticleBundle, AssembleError, Destination};
pub use convert::{ConvertError, ConvertedImage, ImageConverter};
pub use dates::parse_flexible_date;
pub use fetch::{ArticleFetcher, FetchError, HttpClient, RetryPolicy};
pub use journal::{Journal, JournalConnector, SourceUrls, connector_for};
pub use package::{ArchivePackager, PackageError};
pub use pipeline::{DEFAULT_MAILTO, MAX_JOBS, Pipeline, RunError, RunOptions};
pub use report::{
    ArticleOutcome, OutcomeKind, ReportAggregator, ReportError, ReportFormat, RunReport,
    preview_table, write_reports,
};
pub use resolver::{Crossref, DataCite, MetadataRecord, MetadataResolver, ResolveError};
pub use validate::{MarkupValidator, Validity};
