//! Full-text search over per-page document text.
//!
//! One tantivy document per page, tagged with the owning work's cite key;
//! queries aggregate page hits into per-work results with highlighted
//! fragments.

mod highlight;
mod index;
mod schema;

pub use highlight::HighlightStyle;
pub use index::{Fragment, NoteHit, SearchIndexError, TextIndex, WorkHits};
pub use schema::{build_schema, configure_tokenizers};
