//! Managed filename derivation.
//!
//! Attached files are stored under names derived from bibliographic fields so
//! the managed directory stays human-readable: `Author-Year-Title`, folded to
//! a safe ASCII charset and bounded in length. Supplementary files get an
//! `_SInnnn` suffix; the source file's extension is preserved.

use crate::domain::Work;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Maximum length of the derived stem, before suffix and extension.
const MAX_STEM_LEN: usize = 192;

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9\-]").unwrap();
}

/// Derive the managed filename for the `index`-th attachment of a work.
/// Index 0 is the primary PDF; higher indices are supplementary files.
pub fn managed_filename(work: &Work, source: &Path, index: usize) -> String {
    let author = work
        .lead_family_name()
        .unwrap_or("Unknown")
        .split(',')
        .next()
        .unwrap_or("Unknown");

    let title = work.display_title().unwrap_or("Untitled");
    let year = work
        .fields
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "0".to_string());

    let raw = format!("{}-{}-{}", author, year, title.replace(' ', "-"));
    let mut stem = sanitize(&raw);
    if stem.len() > MAX_STEM_LEN {
        stem.truncate(MAX_STEM_LEN);
    }

    if index > 0 {
        stem = format!("{}_SI{:04}", stem, index);
    }

    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Fold to ASCII via NFKD decomposition, then drop everything outside the
/// safe charset.
fn sanitize(input: &str) -> String {
    let folded: String = input.nfkd().filter(char::is_ascii).collect();
    UNSAFE_CHARS.replace_all(&folded, "").to_string()
}
