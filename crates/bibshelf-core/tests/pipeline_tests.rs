//! End-to-end pipeline integration tests
//!
//! Exercise import, lookup, search, rekey and delete against an on-disk
//! repository, checking that the store, the managed files and the text
//! index stay consistent with each other.

use bibshelf_core::{
    full_text_report, import, reindex, BibRecord, EntryKind, Error, HighlightStyle,
    MetadataResolver, MetadataSource, Person, Result, Store, TextExtractor, TextIndex, Work,
    WorkFields,
};
use rstest::rstest;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Splits file contents on form feeds, one page per chunk.
struct FormFeedExtractor;

impl TextExtractor for FormFeedExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let contents = fs::read_to_string(path)?;
        Ok(contents.split('\x0c').map(|s| s.to_string()).collect())
    }
}

struct TableResolver {
    records: HashMap<String, BibRecord>,
}

impl MetadataResolver for TableResolver {
    fn resolve(&self, doi: &str) -> Result<Option<BibRecord>> {
        Ok(self.records.get(doi).cloned())
    }
}

fn record(family: &str, year: i32, title: &str, doi: &str) -> BibRecord {
    BibRecord {
        kind: Some(EntryKind::Article),
        fields: WorkFields {
            title: Some(title.to_string()),
            year: Some(year),
            journal: Some("Annals of Testing".to_string()),
            doi: Some(doi.to_string()),
            ..Default::default()
        },
        authors: vec![Person::new(family)],
        ..Default::default()
    }
}

struct Repo {
    _tmp: tempfile::TempDir,
    inbox: PathBuf,
    data_dir: PathBuf,
    store: Store,
    index: TextIndex,
}

fn repo() -> Repo {
    let tmp = tempfile::tempdir().unwrap();
    let inbox = tmp.path().join("inbox");
    fs::create_dir(&inbox).unwrap();
    let data_dir = tmp.path().join("articles");
    let store = Store::init(&data_dir, false).unwrap();
    let index = TextIndex::open(&store.index_dir()).unwrap();
    Repo {
        inbox,
        data_dir,
        store,
        index,
        _tmp: tmp,
    }
}

impl Repo {
    fn import_doc(&mut self, name: &str, pages: &str, rec: BibRecord, tags: &[&str]) -> String {
        let pdf = self.inbox.join(name);
        fs::write(&pdf, pages).unwrap();
        let doi = rec.fields.doi.clone().unwrap();
        let resolver = TableResolver {
            records: [(doi.clone(), rec)].into_iter().collect(),
        };
        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        import(
            &mut self.store,
            &self.index,
            &pdf,
            &[],
            &tags,
            MetadataSource::Doi(doi),
            &FormFeedExtractor,
            &resolver,
        )
        .unwrap()
    }
}

#[test]
fn test_import_search_and_report() {
    let mut repo = repo();
    let curie = repo.import_doc(
        "curie.pdf",
        "introduction\x0cradium emits rays\x0cmore radium data",
        record("Curie", 1903, "Radioactive Substances", "10.1000/curie"),
        &["physics"],
    );
    let smith = repo.import_doc(
        "smith.pdf",
        "radium appears once here",
        record("Smith", 2020, "A Survey", "10.1000/smith"),
        &[],
    );

    let entries =
        full_text_report(&repo.store, &repo.index, "radium", HighlightStyle::Plain).unwrap();
    assert_eq!(entries.len(), 2);

    // Two matching pages beat one; fragments ascend by page.
    assert_eq!(entries[0].work.cite_key, curie);
    assert_eq!(entries[1].work.cite_key, smith);
    let pages: Vec<u64> = entries[0].fragments.iter().map(|f| f.page).collect();
    assert_eq!(pages, vec![2, 3]);
    assert!(entries[0].fragments[0].excerpt.contains("**radium**"));

    // The joined record carries the resolved metadata.
    assert_eq!(entries[0].work.fields.year, Some(1903));
    assert!(entries[0].work.has_tag("physics"));
}

#[rstest]
#[case("author", "curie", 1)]
#[case("year", "^19", 1)]
#[case("title", "survey", 1)]
#[case("tag", "physics", 1)]
#[case("journal", "annals", 2)]
#[case("key", ".", 2)]
fn test_lookup_fields(#[case] field: &str, #[case] pattern: &str, #[case] expected: usize) {
    let mut repo = repo();
    repo.import_doc(
        "curie.pdf",
        "radium",
        record("Curie", 1903, "Radioactive Substances", "10.1000/curie"),
        &["physics"],
    );
    repo.import_doc(
        "smith.pdf",
        "nothing",
        record("Smith", 2020, "A Survey", "10.1000/smith"),
        &[],
    );

    let found = repo.store.lookup(field, pattern).unwrap();
    assert_eq!(found.len(), expected, "field {} pattern {}", field, pattern);
}

#[test]
fn test_rekey_and_delete_keep_store_and_index_consistent() {
    let mut repo = repo();
    let key = repo.import_doc(
        "curie.pdf",
        "page about polonium\x0cpage about radium",
        record("Curie", 1903, "Radioactive Substances", "10.1000/curie"),
        &[],
    );
    assert_eq!(repo.index.page_count(&key).unwrap(), 2);

    repo.store
        .rename_key(&key, "Curie1903renamed", &repo.index)
        .unwrap();
    assert_eq!(repo.index.page_count(&key).unwrap(), 0);
    assert_eq!(repo.index.page_count("Curie1903renamed").unwrap(), 2);

    let entries =
        full_text_report(&repo.store, &repo.index, "polonium", HighlightStyle::Plain).unwrap();
    assert_eq!(entries[0].work.cite_key, "Curie1903renamed");

    let managed: Vec<PathBuf> = repo
        .store
        .find_by_key("Curie1903renamed")
        .unwrap()
        .files
        .iter()
        .map(|f| repo.data_dir.join(&f.filename))
        .collect();
    repo.store.delete("Curie1903renamed", &repo.index).unwrap();
    assert!(managed.iter().all(|p| !p.exists()));
    assert!(
        full_text_report(&repo.store, &repo.index, "polonium", HighlightStyle::Plain)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_reopen_sees_committed_state() {
    let mut repo = repo();
    let key = repo.import_doc(
        "curie.pdf",
        "durable radium text",
        record("Curie", 1903, "Radioactive Substances", "10.1000/curie"),
        &["physics"],
    );
    drop(repo.index);

    let store = Store::open(&repo.data_dir).unwrap();
    let index = TextIndex::open(&store.index_dir()).unwrap();
    assert!(store.find_by_key(&key).is_some());
    let entries = full_text_report(&store, &index, "radium", HighlightStyle::Plain).unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_reindex_repairs_a_lost_index() {
    let mut repo = repo();
    let key = repo.import_doc(
        "curie.pdf",
        "alpha\x0cbeta radium",
        record("Curie", 1903, "Radioactive Substances", "10.1000/curie"),
        &[],
    );

    // Blow the index away, then rebuild it from the managed files.
    drop(repo.index);
    fs::remove_dir_all(repo.store.index_dir()).unwrap();
    let index = TextIndex::create(&repo.store.index_dir()).unwrap();
    assert_eq!(index.page_count(&key).unwrap(), 0);

    let repaired = reindex(&repo.store, &index, &FormFeedExtractor).unwrap();
    assert_eq!(repaired, 1);
    let hits = index.search("radium", HighlightStyle::Plain).unwrap();
    assert_eq!(hits[0].fragments[0].page, 2);
}

#[test]
fn test_duplicate_import_across_sessions() {
    let mut repo = repo();
    repo.import_doc(
        "curie.pdf",
        "same contents",
        record("Curie", 1903, "Radioactive Substances", "10.1000/curie"),
        &[],
    );

    // A fresh session must still reject the same bytes under a new name.
    let mut store = Store::open(&repo.data_dir).unwrap();
    let copy = repo.inbox.join("renamed.pdf");
    fs::write(&copy, "same contents").unwrap();
    let resolver = TableResolver {
        records: HashMap::new(),
    };
    let err = import(
        &mut store,
        &repo.index,
        &copy,
        &[],
        &[],
        MetadataSource::ScanText,
        &FormFeedExtractor,
        &resolver,
    )
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateEntry(_)));
}

#[test]
fn test_identical_metadata_imports_keep_distinct_files() {
    let mut repo = repo();
    let first = repo.import_doc(
        "a.pdf",
        "first document body",
        record("Smith", 2020, "A Better Computer", "10.1000/first"),
        &[],
    );
    let second = repo.import_doc(
        "b.pdf",
        "second document body",
        record("Smith", 2020, "A Better Computer", "10.1000/second"),
        &[],
    );
    assert_eq!(first, "Smith2020abc");
    assert_eq!(second, "Smith2020abca");

    // Identical author-year-title must still yield two managed files.
    let file_a = repo.store.find_by_key(&first).unwrap().files[0].clone();
    let file_b = repo.store.find_by_key(&second).unwrap().files[0].clone();
    assert_ne!(file_a.filename, file_b.filename);
    assert_eq!(
        fs::read_to_string(repo.data_dir.join(&file_a.filename)).unwrap(),
        "first document body"
    );

    // Deleting one work must not touch the other's file.
    repo.store.delete(&second, &repo.index).unwrap();
    assert_eq!(
        fs::read_to_string(repo.data_dir.join(&file_a.filename)).unwrap(),
        "first document body"
    );
}

#[test]
fn test_managed_filenames_are_derived_from_metadata() {
    let mut repo = repo();
    let key = repo.import_doc(
        "weird name (final).pdf",
        "text",
        record("O'Neill", 2001, "What: A/B testing?", "10.1000/oneill"),
        &[],
    );
    let work: &Work = repo.store.find_by_key(&key).unwrap();
    assert_eq!(work.files[0].filename, "ONeill-2001-What-AB-testing.pdf");
}
