//! Crossref DOI resolution.
//!
//! API docs: https://api.crossref.org/swagger-ui/index.html
//! Responses go through the persistent request cache, so a DOI is fetched
//! at most once per repository.

use bibshelf_core::{
    BibRecord, EntryKind, Error, MetadataResolver, Person, RequestCache, Result, WorkFields,
};
use serde::Deserialize;
use std::cell::RefCell;
use std::io::{BufRead, Write};
use tracing::{debug, warn};

const CROSSREF_API: &str = "https://api.crossref.org/works";

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefWork,
}

#[derive(Debug, Deserialize)]
struct CrossrefWork {
    #[serde(rename = "type")]
    work_type: Option<String>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
    title: Option<Vec<String>>,
    author: Option<Vec<CrossrefPerson>>,
    editor: Option<Vec<CrossrefPerson>>,
    #[serde(rename = "container-title")]
    container_title: Option<Vec<String>>,
    publisher: Option<String>,
    volume: Option<String>,
    issue: Option<String>,
    page: Option<String>,
    issued: Option<CrossrefDate>,
    #[serde(rename = "published-print")]
    published_print: Option<CrossrefDate>,
    #[serde(rename = "published-online")]
    published_online: Option<CrossrefDate>,
}

#[derive(Debug, Deserialize)]
struct CrossrefPerson {
    given: Option<String>,
    family: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefDate {
    #[serde(rename = "date-parts")]
    date_parts: Option<Vec<Vec<i32>>>,
}

impl CrossrefWork {
    fn year(&self) -> Option<i32> {
        [&self.issued, &self.published_print, &self.published_online]
            .into_iter()
            .flatten()
            .find_map(|d| {
                d.date_parts
                    .as_ref()
                    .and_then(|parts| parts.first())
                    .and_then(|ymd| ymd.first())
                    .copied()
            })
    }

    fn into_record(self) -> BibRecord {
        let kind = self.work_type.as_deref().and_then(EntryKind::from_crossref_type);
        if kind.is_none() {
            warn!(
                work_type = self.work_type.as_deref().unwrap_or("absent"),
                "unmapped Crossref work type, treating as misc"
            );
        }

        let year = self.year();
        let container = self
            .container_title
            .and_then(|t| t.into_iter().next())
            .filter(|t| !t.is_empty());
        let (journal, booktitle) = match kind {
            Some(EntryKind::InProceedings) | Some(EntryKind::InCollection) => (None, container),
            _ => (container, None),
        };

        BibRecord {
            kind,
            fields: WorkFields {
                title: self.title.and_then(|t| t.into_iter().next()),
                year,
                journal,
                booktitle,
                publisher: self.publisher,
                volume: self.volume,
                number: self.issue,
                pages: self.page,
                doi: self.doi.map(|d| d.to_lowercase()),
                ..Default::default()
            },
            authors: people(self.author),
            editors: people(self.editor),
            citation: None,
        }
    }
}

fn people(list: Option<Vec<CrossrefPerson>>) -> Vec<Person> {
    list.unwrap_or_default()
        .into_iter()
        .filter_map(|p| {
            let person = Person::new(p.family?);
            Some(match p.given {
                Some(given) => person.with_given_name(given),
                None => person,
            })
        })
        .collect()
}

/// DOI resolver backed by the Crossref REST API, with a persistent request
/// cache and an optional interactive confirmation step.
pub struct CrossrefResolver {
    client: reqwest::blocking::Client,
    cache: RefCell<RequestCache>,
    /// Skip the interactive confirmation and accept every resolved record.
    assume_yes: bool,
}

impl CrossrefResolver {
    pub fn new(cache: RequestCache, assume_yes: bool) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            cache: RefCell::new(cache),
            assume_yes,
        }
    }

    fn fetch(&self, doi: &str) -> Result<serde_json::Value> {
        let url = format!("{}/{}", CROSSREF_API, doi);
        debug!(url = %url, "querying Crossref");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::Storage(format!("Crossref request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Crossref has no record of {}", doi)));
        }
        if !response.status().is_success() {
            return Err(Error::Storage(format!(
                "Crossref answered {} for {}",
                response.status(),
                doi
            )));
        }
        response
            .json()
            .map_err(|e| Error::Parse(format!("invalid Crossref response: {}", e)))
    }

    /// Show the candidate and ask whether to use it. Declining a candidate
    /// skips it; quitting aborts the whole import.
    fn confirm(&self, doi: &str, record: &BibRecord) -> Result<bool> {
        let title = record.fields.title.as_deref().unwrap_or("(no title)");
        let year = record
            .fields
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "????".to_string());
        let authors = record
            .authors
            .iter()
            .map(|a| a.citation_name())
            .collect::<Vec<_>>()
            .join("; ");

        eprintln!("  {}", doi);
        eprintln!("  {} ({})", title, year);
        eprintln!("  {}", authors);
        eprint!("Use this record? [Y/n/q] ");
        std::io::stderr().flush()?;

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(Error::Cancelled);
        }
        match line.trim().to_lowercase().as_str() {
            "" | "y" | "yes" => Ok(true),
            "q" | "quit" => Err(Error::Cancelled),
            _ => Ok(false),
        }
    }
}

impl MetadataResolver for CrossrefResolver {
    fn resolve(&self, doi: &str) -> Result<Option<BibRecord>> {
        let fetched = self
            .cache
            .borrow_mut()
            .get_or_fetch("crossref", doi, || self.fetch(doi));

        let value = match fetched {
            Ok(value) => value,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let response: CrossrefResponse = serde_json::from_value(value)
            .map_err(|e| Error::Parse(format!("invalid Crossref response: {}", e)))?;
        let record = response.message.into_record();

        if self.assume_yes || self.confirm(doi, &record)? {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}
