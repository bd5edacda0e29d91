//! Work domain model

use super::{EntryKind, Person};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file attached to a work, copied into the managed directory.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachedFile {
    /// Managed filename, relative to the data directory.
    pub filename: String,
    /// Display label; the primary file always carries the label "PDF".
    pub label: String,
    /// SHA-256 content hash, hex encoded.
    pub sha256: String,
}

/// Structured bibliographic fields. Sparse: which fields are meaningful
/// depends on the entry kind's [`super::FieldSpec`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkFields {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub month: Option<String>,
    pub journal: Option<String>,
    pub booktitle: Option<String>,
    pub publisher: Option<String>,
    pub institution: Option<String>,
    pub school: Option<String>,
    pub organization: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub pages: Option<String>,
    pub series: Option<String>,
    pub address: Option<String>,
    pub edition: Option<String>,
    pub doi: Option<String>,
    pub note: Option<String>,
}

/// One bibliographic entry tracked by the store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Work {
    /// Unique, case-sensitive cite key. This is the work's identity across
    /// the store, the text index, and the managed file directory.
    pub cite_key: String,
    pub kind: EntryKind,
    pub fields: WorkFields,
    pub authors: Vec<Person>,
    pub editors: Vec<Person>,
    pub tags: Vec<String>,
    /// Ordered attachments; the first entry is the canonical PDF.
    pub files: Vec<AttachedFile>,
    /// Pre-rendered citation text, stored opaquely.
    pub citation: Option<String>,
    pub imported_at: DateTime<Utc>,
}

impl Work {
    pub fn new(cite_key: impl Into<String>, kind: EntryKind, fields: WorkFields) -> Self {
        Self {
            cite_key: cite_key.into(),
            kind,
            fields,
            authors: Vec::new(),
            editors: Vec::new(),
            tags: Vec::new(),
            files: Vec::new(),
            citation: None,
            imported_at: Utc::now(),
        }
    }

    /// The canonical PDF attachment, if any files are attached.
    pub fn primary_file(&self) -> Option<&AttachedFile> {
        self.files.first()
    }

    /// Whether any attachment carries the given content hash.
    pub fn has_hash(&self, sha256: &str) -> bool {
        self.files.iter().any(|f| f.sha256 == sha256)
    }

    /// First author's family name, falling back to the first editor.
    pub fn lead_family_name(&self) -> Option<&str> {
        self.authors
            .first()
            .or_else(|| self.editors.first())
            .map(|p| p.family_name.as_str())
    }

    /// Title, falling back to the book title.
    pub fn display_title(&self) -> Option<&str> {
        self.fields
            .title
            .as_deref()
            .or(self.fields.booktitle.as_deref())
    }

    /// Denormalized author list, "Family, Given and Family, Given".
    pub fn authors_string(&self) -> String {
        join_people(&self.authors)
    }

    /// Denormalized editor list.
    pub fn editors_string(&self) -> String {
        join_people(&self.editors)
    }

    /// Add tags with case-insensitive dedup, preserving original casing of
    /// the first occurrence.
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            if !self
                .tags
                .iter()
                .any(|t| t.eq_ignore_ascii_case(tag.as_str()))
            {
                self.tags.push(tag);
            }
        }
        self.tags.sort();
    }

    /// Remove tags, matching case-insensitively.
    pub fn remove_tags<'a, I>(&mut self, tags: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let doomed: Vec<String> = tags.into_iter().map(|t| t.to_lowercase()).collect();
        self.tags.retain(|t| !doomed.contains(&t.to_lowercase()));
    }

    /// Whether the work carries the tag, case-insensitively.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

fn join_people(people: &[Person]) -> String {
    people
        .iter()
        .map(|p| p.citation_name())
        .collect::<Vec<_>>()
        .join(" and ")
}
