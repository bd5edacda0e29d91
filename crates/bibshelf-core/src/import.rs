//! PDF import pipeline.
//!
//! Orchestrates one document's way into the repository: duplicate check,
//! text extraction, metadata resolution, cite-key derivation, store commit,
//! then indexing. The PDF reader and the metadata service sit behind traits
//! so the pipeline stays testable without either.

use crate::domain::{EntryKind, Person, Work, WorkFields};
use crate::error::{Error, Result};
use crate::identifiers::{derive_cite_key, extract_dois};
use crate::search::TextIndex;
use crate::store::{hash_file, Store};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Extracts per-page plain text from a PDF.
pub trait TextExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>>;
}

/// Resolves a DOI to bibliographic metadata. Interactive implementations
/// may return [`Error::Cancelled`] when the user declines a candidate.
pub trait MetadataResolver {
    fn resolve(&self, doi: &str) -> Result<Option<BibRecord>>;
}

/// Resolved bibliographic metadata, not yet committed to the store.
#[derive(Clone, Debug, Default)]
pub struct BibRecord {
    pub kind: Option<EntryKind>,
    pub fields: WorkFields,
    pub authors: Vec<Person>,
    pub editors: Vec<Person>,
    pub citation: Option<String>,
}

impl BibRecord {
    /// Whether the named schema field carries a value.
    fn has_field(&self, name: &str) -> bool {
        match name {
            "author" => !self.authors.is_empty(),
            "editor" => !self.editors.is_empty(),
            "author_or_editor" => !self.authors.is_empty() || !self.editors.is_empty(),
            "title" => self.fields.title.is_some(),
            "year" => self.fields.year.is_some(),
            "month" => self.fields.month.is_some(),
            "journal" => self.fields.journal.is_some(),
            "booktitle" => self.fields.booktitle.is_some(),
            "publisher" => self.fields.publisher.is_some(),
            "institution" => self.fields.institution.is_some(),
            "school" => self.fields.school.is_some(),
            "organization" => self.fields.organization.is_some(),
            "volume" => self.fields.volume.is_some(),
            "number" => self.fields.number.is_some(),
            "pages" => self.fields.pages.is_some(),
            "series" => self.fields.series.is_some(),
            "address" => self.fields.address.is_some(),
            "edition" => self.fields.edition.is_some(),
            "doi" => self.fields.doi.is_some(),
            "note" => self.fields.note.is_some(),
            _ => false,
        }
    }

    /// Convert into a [`Work`] under the given cite key. Missing required
    /// fields are tolerated but logged: a sparse record is better than none.
    pub fn into_work(self, cite_key: String) -> Work {
        let kind = self.kind.unwrap_or(EntryKind::Misc);
        for name in kind.field_spec().required {
            if !self.has_field(name) {
                warn!(
                    field = name,
                    kind = kind.as_str(),
                    key = %cite_key,
                    "resolved metadata is missing a required field"
                );
            }
        }
        let mut work = Work::new(cite_key, kind, self.fields);
        work.authors = self.authors;
        work.editors = self.editors;
        work.citation = self.citation;
        work
    }

    fn lead_family_name(&self) -> &str {
        self.authors
            .first()
            .or_else(|| self.editors.first())
            .map(|p| p.family_name.as_str())
            .unwrap_or("Anon")
    }

    fn display_title(&self) -> &str {
        self.fields
            .title
            .as_deref()
            .or(self.fields.booktitle.as_deref())
            .unwrap_or("")
    }
}

/// Where the import gets its metadata from.
pub enum MetadataSource {
    /// Caller supplies fully resolved metadata.
    Resolved(BibRecord),
    /// Resolve this DOI.
    Doi(String),
    /// Scan the extracted page text for DOIs and resolve the first one the
    /// resolver accepts.
    ScanText,
}

/// Import one PDF with optional supplementary files. Returns the final
/// cite key.
///
/// Steps run in a fixed order so failures leave nothing behind: the
/// duplicate check happens before any extraction work, metadata resolution
/// before any file is copied, and indexing only after the store commit.
pub fn import(
    store: &mut Store,
    index: &TextIndex,
    pdf: &Path,
    supplementary: &[PathBuf],
    tags: &[String],
    source: MetadataSource,
    extractor: &dyn TextExtractor,
    resolver: &dyn MetadataResolver,
) -> Result<String> {
    let hash = hash_file(pdf)?;
    if let Some(existing) = store.find_by_hash(&hash) {
        return Err(Error::DuplicateEntry(format!(
            "{} already exists in the repository with key {}",
            pdf.display(),
            existing.cite_key
        )));
    }

    let pages = extractor.extract_pages(pdf)?;

    let record = match source {
        MetadataSource::Resolved(record) => record,
        MetadataSource::Doi(doi) => resolver
            .resolve(&doi)?
            .ok_or_else(|| Error::NotFound(format!("DOI {} could not be resolved", doi)))?,
        MetadataSource::ScanText => resolve_from_text(&pages, resolver)?,
    };

    let proposed = derive_cite_key(
        record.lead_family_name(),
        record.fields.year,
        record.display_title(),
    );
    let work = record.into_work(proposed);

    let final_key = store.add(work, pdf, supplementary, tags)?;
    index.add_pages(&final_key, &pages)?;
    info!(key = %final_key, pages = pages.len(), "imported document");
    Ok(final_key)
}

/// Scan the extracted text for DOI candidates, in order of appearance, and
/// take the first the resolver answers for.
fn resolve_from_text(pages: &[String], resolver: &dyn MetadataResolver) -> Result<BibRecord> {
    let text = pages.join("\n");
    let candidates = extract_dois(&text);
    if candidates.is_empty() {
        return Err(Error::Parse(
            "no DOI found in the document text".to_string(),
        ));
    }

    for doi in &candidates {
        match resolver.resolve(doi)? {
            Some(record) => return Ok(record),
            None => warn!(doi = %doi, "candidate DOI did not resolve"),
        }
    }
    Err(Error::NotFound(format!(
        "none of {} candidate DOIs resolved",
        candidates.len()
    )))
}

/// Rebuild the text index from the managed files: every work's pages are
/// re-extracted and re-added. Returns the number of works reindexed; works
/// whose primary file fails to extract are skipped with a warning.
pub fn reindex(store: &Store, index: &TextIndex, extractor: &dyn TextExtractor) -> Result<usize> {
    let mut repaired = 0;
    for work in store.works() {
        let Some(primary) = work.primary_file() else {
            warn!(key = %work.cite_key, "work has no primary file, skipping");
            continue;
        };
        let path = store.data_dir().join(&primary.filename);
        let pages = match extractor.extract_pages(&path) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(key = %work.cite_key, error = %e, "extraction failed, skipping");
                continue;
            }
        };
        index.delete_pages(&work.cite_key)?;
        index.add_pages(&work.cite_key, &pages)?;
        repaired += 1;
    }
    info!(works = repaired, "reindex complete");
    Ok(repaired)
}
