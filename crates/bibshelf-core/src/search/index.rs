//! Text index management: page documents, ranked search, per-work
//! aggregation.

use super::highlight::{self, HighlightStyle};
use super::schema::{build_schema, configure_tokenizers, fields, kinds};
use std::collections::BTreeMap;
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    query::{QueryParser, TermQuery},
    schema::{Field, IndexRecordOption, Value},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};
use thiserror::Error;

/// Writer heap size; the corpus is small, this is plenty.
const WRITER_HEAP: usize = 50_000_000;

/// Default bound on fragment context length, in characters.
const DEFAULT_FRAGMENT_CHARS: usize = 300;

#[derive(Error, Debug)]
pub enum SearchIndexError {
    #[error("Index error: {0}")]
    IndexError(String),
    #[error("Query error: {0}")]
    QueryError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for SearchIndexError {
    fn from(e: std::io::Error) -> Self {
        SearchIndexError::IoError(e.to_string())
    }
}

impl From<tantivy::TantivyError> for SearchIndexError {
    fn from(e: tantivy::TantivyError) -> Self {
        SearchIndexError::IndexError(e.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for SearchIndexError {
    fn from(e: tantivy::query::QueryParserError) -> Self {
        SearchIndexError::QueryError(e.to_string())
    }
}

impl From<SearchIndexError> for crate::Error {
    fn from(e: SearchIndexError) -> Self {
        match e {
            SearchIndexError::QueryError(m) => crate::Error::QuerySyntax(m),
            SearchIndexError::IndexError(m) | SearchIndexError::IoError(m) => {
                crate::Error::Storage(m)
            }
        }
    }
}

/// A highlighted excerpt from one page of a work.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    /// 1-based page number.
    pub page: u64,
    pub excerpt: String,
}

/// All page hits for one work, aggregated.
#[derive(Clone, Debug)]
pub struct WorkHits {
    pub key: String,
    /// Sum of the per-page relevance scores.
    pub score: f32,
    /// Fragments in ascending page order.
    pub fragments: Vec<Fragment>,
}

/// A hit against a work's note document.
#[derive(Clone, Debug)]
pub struct NoteHit {
    pub key: String,
    pub score: f32,
    pub excerpt: String,
}

/// Inverted full-text index over per-page text, tagged with the owning
/// work's cite key.
pub struct TextIndex {
    index: Index,
    reader: IndexReader,
    key_field: Field,
    page_field: Field,
    kind_field: Field,
    text_field: Field,
    fragment_chars: usize,
}

impl TextIndex {
    /// Create an empty index at `path`. Fails if the location already holds
    /// anything.
    pub fn create(path: &Path) -> Result<Self, SearchIndexError> {
        if path.exists() {
            if !path.is_dir() || path.read_dir()?.next().is_some() {
                return Err(SearchIndexError::IoError(format!(
                    "index location {} already exists and is not empty",
                    path.display()
                )));
            }
        } else {
            std::fs::create_dir_all(path)?;
        }

        let schema = build_schema();
        let index = Index::create_in_dir(path, schema)?;
        Self::from_index(index, ReloadPolicy::OnCommitWithDelay)
    }

    /// Open an existing index.
    pub fn open(path: &Path) -> Result<Self, SearchIndexError> {
        let index = Index::open_in_dir(path)?;
        Self::from_index(index, ReloadPolicy::OnCommitWithDelay)
    }

    /// Create an in-memory index (for tests).
    pub fn in_memory() -> Result<Self, SearchIndexError> {
        let index = Index::create_in_ram(build_schema());
        Self::from_index(index, ReloadPolicy::Manual)
    }

    fn from_index(index: Index, policy: ReloadPolicy) -> Result<Self, SearchIndexError> {
        configure_tokenizers(&index);
        let schema = index.schema();
        let reader = index.reader_builder().reload_policy(policy).try_into()?;

        Ok(Self {
            key_field: schema.get_field(fields::KEY)?,
            page_field: schema.get_field(fields::PAGE)?,
            kind_field: schema.get_field(fields::KIND)?,
            text_field: schema.get_field(fields::TEXT)?,
            index,
            reader,
            fragment_chars: DEFAULT_FRAGMENT_CHARS,
        })
    }

    /// Override the fragment context bound.
    pub fn with_fragment_chars(mut self, chars: usize) -> Self {
        self.fragment_chars = chars;
        self
    }

    /// Append one indexed document per page, tagged with `key` and the page's
    /// 0-based position. Durably committed before returning.
    ///
    /// No uniqueness check is performed: re-adding pages for a key that
    /// already has them grows the index. Callers must delete first.
    pub fn add_pages(&self, key: &str, pages: &[String]) -> Result<(), SearchIndexError> {
        let mut writer: IndexWriter = self.index.writer(WRITER_HEAP)?;
        for (i, text) in pages.iter().enumerate() {
            writer.add_document(self.page_doc(key, i as u64, kinds::PAGE, text))?;
        }
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Attach (or replace) the single note document for `key`.
    pub fn add_note(&self, key: &str, text: &str) -> Result<(), SearchIndexError> {
        // Work keys are immutable per document, so replacing the note means
        // rewriting every document for the key.
        let mut docs = self.collect_for_key(key)?;
        docs.retain(|(_, kind, _)| kind != kinds::NOTE);

        let mut writer: IndexWriter = self.index.writer(WRITER_HEAP)?;
        writer.delete_term(Term::from_field_text(self.key_field, key));
        for (page, kind, body) in &docs {
            writer.add_document(self.page_doc(key, *page, kind, body))?;
        }
        writer.add_document(self.page_doc(key, 0, kinds::NOTE, text))?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Remove every document owned by `key`. No-op when none exist.
    pub fn delete_pages(&self, key: &str) -> Result<(), SearchIndexError> {
        let mut writer: IndexWriter = self.index.writer(WRITER_HEAP)?;
        writer.delete_term(Term::from_field_text(self.key_field, key));
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Relabel every document for `old_key` to `new_key`, preserving page
    /// order, kind, and text exactly. Single commit.
    pub fn rename_key(&self, old_key: &str, new_key: &str) -> Result<(), SearchIndexError> {
        let docs = self.collect_for_key(old_key)?;
        if docs.is_empty() {
            return Ok(());
        }

        let mut writer: IndexWriter = self.index.writer(WRITER_HEAP)?;
        writer.delete_term(Term::from_field_text(self.key_field, old_key));
        for (page, kind, body) in &docs {
            writer.add_document(self.page_doc(new_key, *page, kind, body))?;
        }
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Number of page documents indexed for `key` (notes excluded).
    pub fn page_count(&self, key: &str) -> Result<usize, SearchIndexError> {
        Ok(self
            .collect_for_key(key)?
            .iter()
            .filter(|(_, kind, _)| kind == kinds::PAGE)
            .count())
    }

    /// Run a full-text query over page documents and aggregate hits by work.
    ///
    /// Works are ordered by descending aggregate score (sum of page scores),
    /// ties broken by ascending cite key; fragments within a work are ordered
    /// by ascending 1-based page number.
    pub fn search(
        &self,
        query_str: &str,
        style: HighlightStyle,
    ) -> Result<Vec<WorkHits>, SearchIndexError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let query = query_parser.parse_query(query_str)?;

        let limit = searcher.num_docs().max(1) as usize;
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
        let terms = highlight::query_terms(query_str);

        let mut grouped: BTreeMap<String, Vec<(u64, f32, String)>> = BTreeMap::new();
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;

            let kind = doc
                .get_first(self.kind_field)
                .and_then(|v| v.as_str())
                .unwrap_or(kinds::PAGE);
            if kind != kinds::PAGE {
                continue;
            }

            let key = doc
                .get_first(self.key_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let page = doc
                .get_first(self.page_field)
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let text = doc
                .get_first(self.text_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            grouped.entry(key).or_default().push((page, score, text));
        }

        let mut hits: Vec<WorkHits> = grouped
            .into_iter()
            .map(|(key, mut pages)| {
                pages.sort_by_key(|(page, _, _)| *page);
                let score = pages.iter().map(|(_, s, _)| s).sum();
                let fragments = pages
                    .into_iter()
                    .map(|(page, _, text)| Fragment {
                        page: page + 1,
                        excerpt: highlight::highlighted_fragment(
                            &text,
                            &terms,
                            self.fragment_chars,
                            style,
                        ),
                    })
                    .collect();
                WorkHits {
                    key,
                    score,
                    fragments,
                }
            })
            .collect();

        // BTreeMap iteration yields keys in ascending order, so a stable sort
        // by score alone keeps the tie-break deterministic.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(hits)
    }

    /// Ranked, ungrouped search over note documents: at most one hit per
    /// work.
    pub fn search_notes(
        &self,
        query_str: &str,
        style: HighlightStyle,
    ) -> Result<Vec<NoteHit>, SearchIndexError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let query = query_parser.parse_query(query_str)?;

        let limit = searcher.num_docs().max(1) as usize;
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
        let terms = highlight::query_terms(query_str);

        let mut hits = Vec::new();
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let kind = doc
                .get_first(self.kind_field)
                .and_then(|v| v.as_str())
                .unwrap_or(kinds::PAGE);
            if kind != kinds::NOTE {
                continue;
            }
            let key = doc
                .get_first(self.key_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let text = doc
                .get_first(self.text_field)
                .and_then(|v| v.as_str())
                .unwrap_or("");
            hits.push(NoteHit {
                key,
                score,
                excerpt: highlight::highlighted_fragment(
                    text,
                    &terms,
                    self.fragment_chars,
                    style,
                ),
            });
        }
        Ok(hits)
    }

    fn page_doc(&self, key: &str, page: u64, kind: &str, text: &str) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        doc.add_text(self.key_field, key);
        doc.add_text(self.kind_field, kind);
        doc.add_u64(self.page_field, page);
        doc.add_text(self.text_field, text);
        doc
    }

    /// Read back every stored document for a key, sorted by page.
    fn collect_for_key(&self, key: &str) -> Result<Vec<(u64, String, String)>, SearchIndexError> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.key_field, key),
            IndexRecordOption::Basic,
        );
        let limit = searcher.num_docs().max(1) as usize;
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut docs = Vec::new();
        for (_score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let page = doc
                .get_first(self.page_field)
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let kind = doc
                .get_first(self.kind_field)
                .and_then(|v| v.as_str())
                .unwrap_or(kinds::PAGE)
                .to_string();
            let text = doc
                .get_first(self.text_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            docs.push((page, kind, text));
        }
        docs.sort_by_key(|(page, _, _)| *page);
        Ok(docs)
    }
}
