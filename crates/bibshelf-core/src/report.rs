//! Query layer joining search hits with stored metadata.

use crate::domain::Work;
use crate::error::Result;
use crate::search::{Fragment, HighlightStyle, TextIndex};
use crate::store::Store;
use tracing::warn;

/// One work's full-text result: the stored record plus its ranked hits.
#[derive(Clone, Debug)]
pub struct ReportEntry {
    pub work: Work,
    /// Aggregate relevance score across the work's matching pages.
    pub score: f32,
    /// Highlighted excerpts in ascending page order.
    pub fragments: Vec<Fragment>,
}

/// Run a full-text query and join the per-work hits with store records,
/// preserving the index's ranking. Hits whose cite key no longer exists in
/// the store are dropped with a warning; they indicate a stale index.
pub fn full_text_report(
    store: &Store,
    index: &TextIndex,
    query: &str,
    style: HighlightStyle,
) -> Result<Vec<ReportEntry>> {
    let hits = index.search(query, style)?;

    let mut entries = Vec::with_capacity(hits.len());
    for hit in hits {
        match store.find_by_key(&hit.key) {
            Some(work) => entries.push(ReportEntry {
                work: work.clone(),
                score: hit.score,
                fragments: hit.fragments,
            }),
            None => warn!(
                key = %hit.key,
                "indexed pages reference a key missing from the store"
            ),
        }
    }
    Ok(entries)
}

/// Field-scoped metadata lookup, ordered by cite key.
pub fn lookup(store: &Store, field: &str, pattern: &str) -> Result<Vec<Work>> {
    store.lookup(field, pattern)
}
