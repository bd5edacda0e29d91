//! bibshelf-core: library for a personal bibliography manager
//!
//! This library provides:
//! - A JSON metadata store of bibliographic works with managed PDF files
//! - A tantivy full-text index over per-page document text
//! - A PDF import pipeline with DOI-based metadata resolution
//! - Field-scoped lookup and ranked full-text reporting

pub mod cache;
pub mod domain;
pub mod error;
pub mod filename;
pub mod identifiers;
pub mod import;
pub mod report;
pub mod search;
pub mod store;

// Re-export main types for convenience
pub use cache::RequestCache;
pub use domain::{AttachedFile, EntryKind, Person, Work, WorkFields};
pub use error::{Error, Result};
pub use import::{import, reindex, BibRecord, MetadataResolver, MetadataSource, TextExtractor};
pub use report::{full_text_report, lookup, ReportEntry};
pub use search::{Fragment, HighlightStyle, TextIndex, WorkHits};
pub use store::{FileLock, Store};
