//! Entry kinds with static field schemas.
//!
//! Each kind carries a fixed table of required and optional fields, checked
//! when converting resolver metadata into a [`super::Work`]. This replaces
//! per-type runtime field synthesis with a compile-time table.

use serde::{Deserialize, Serialize};

/// Kind of bibliographic entry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Article,
    Book,
    InProceedings,
    InCollection,
    TechReport,
    PhdThesis,
    Misc,
}

/// Static field schema for one entry kind.
pub struct FieldSpec {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Article => "article",
            EntryKind::Book => "book",
            EntryKind::InProceedings => "inproceedings",
            EntryKind::InCollection => "incollection",
            EntryKind::TechReport => "techreport",
            EntryKind::PhdThesis => "phdthesis",
            EntryKind::Misc => "misc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "article" => Some(EntryKind::Article),
            "book" => Some(EntryKind::Book),
            "inproceedings" => Some(EntryKind::InProceedings),
            "incollection" => Some(EntryKind::InCollection),
            "techreport" => Some(EntryKind::TechReport),
            "phdthesis" => Some(EntryKind::PhdThesis),
            "misc" => Some(EntryKind::Misc),
            _ => None,
        }
    }

    /// Map a Crossref work type to an entry kind.
    pub fn from_crossref_type(tp: &str) -> Option<Self> {
        match tp {
            "journal-article" | "reference-entry" | "posted-content" => Some(EntryKind::Article),
            "book" | "reference-book" => Some(EntryKind::Book),
            "proceedings-article" => Some(EntryKind::InProceedings),
            "book-chapter" => Some(EntryKind::InCollection),
            "report" => Some(EntryKind::TechReport),
            "dissertation" => Some(EntryKind::PhdThesis),
            _ => None,
        }
    }

    /// The fixed required/optional field table for this kind.
    pub fn field_spec(&self) -> FieldSpec {
        match self {
            EntryKind::Article => FieldSpec {
                required: &["doi", "author", "title", "journal", "year", "volume"],
                optional: &["number", "pages", "month"],
            },
            EntryKind::Book => FieldSpec {
                required: &["doi", "author_or_editor", "title", "publisher", "year"],
                optional: &["volume", "number", "series", "address", "edition", "month"],
            },
            EntryKind::InProceedings => FieldSpec {
                required: &["doi", "author", "title", "booktitle", "year"],
                optional: &[
                    "editor",
                    "volume",
                    "number",
                    "series",
                    "pages",
                    "address",
                    "month",
                    "organization",
                    "publisher",
                ],
            },
            EntryKind::InCollection => FieldSpec {
                required: &["doi", "author", "title", "booktitle", "publisher", "year"],
                optional: &[
                    "editor", "volume", "number", "series", "chapter", "pages", "address",
                    "edition", "month",
                ],
            },
            EntryKind::TechReport => FieldSpec {
                required: &["doi", "author", "title", "institution", "year"],
                optional: &["number", "address", "month"],
            },
            EntryKind::PhdThesis => FieldSpec {
                required: &["doi", "author", "title", "school", "year"],
                optional: &["address", "month"],
            },
            EntryKind::Misc => FieldSpec {
                required: &["title"],
                optional: &["author", "year", "doi", "month", "note"],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_names() {
        for kind in [
            EntryKind::Article,
            EntryKind::Book,
            EntryKind::InProceedings,
            EntryKind::InCollection,
            EntryKind::TechReport,
            EntryKind::PhdThesis,
            EntryKind::Misc,
        ] {
            assert_eq!(EntryKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_crossref_mapping() {
        assert_eq!(
            EntryKind::from_crossref_type("journal-article"),
            Some(EntryKind::Article)
        );
        assert_eq!(
            EntryKind::from_crossref_type("dissertation"),
            Some(EntryKind::PhdThesis)
        );
        assert_eq!(EntryKind::from_crossref_type("dataset"), None);
    }

    #[test]
    fn test_article_requires_journal() {
        let spec = EntryKind::Article.field_spec();
        assert!(spec.required.contains(&"journal"));
        assert!(spec.optional.contains(&"pages"));
    }
}
