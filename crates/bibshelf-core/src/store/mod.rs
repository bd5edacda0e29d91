//! Authoritative metadata store.
//!
//! One JSON snapshot holds every work; it is read wholesale into memory
//! under an advisory cross-process lock, mutated in memory, and written back
//! wholesale (temp file + atomic rename) on every mutating operation.

mod lock;

pub use lock::FileLock;

use crate::domain::{AttachedFile, Work};
use crate::error::{Error, Result};
use crate::filename::managed_filename;
use crate::identifiers::resolve_collision;
use crate::search::TextIndex;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Snapshot filename inside the data directory.
pub const METADATA_FILE: &str = "metadata.json";
/// Lock sentinel, co-located with the snapshot.
pub const LOCK_FILE: &str = "metadata.lock";
/// Text index directory inside the data directory.
pub const INDEX_DIR: &str = "index";
/// Default data directory name.
pub const DEFAULT_DATA_DIR: &str = "articles";

/// Label carried by the canonical primary attachment.
pub const PRIMARY_LABEL: &str = "PDF";

/// The in-memory record set plus its on-disk location.
pub struct Store {
    data_dir: PathBuf,
    works: Vec<Work>,
}

impl Store {
    /// Create a new repository at `data_dir`: the snapshot, the text index
    /// and the managed file directory are created together. With `force`,
    /// any existing repository at the location is destroyed first, as one
    /// unit; without it, an existing directory is a hard error.
    pub fn init(data_dir: &Path, force: bool) -> Result<Store> {
        if data_dir.exists() {
            if !force {
                return Err(Error::Storage(format!(
                    "document repository already exists at {}",
                    data_dir.display()
                )));
            }
            fs::remove_dir_all(data_dir)?;
            warn!(path = %data_dir.display(), "clobbered existing repository");
        }
        fs::create_dir_all(data_dir)?;

        let store = Store {
            data_dir: data_dir.to_path_buf(),
            works: Vec::new(),
        };
        store.save()?;
        TextIndex::create(&store.index_dir())?;
        Ok(store)
    }

    /// Walk up from `start` looking for an existing repository; returns the
    /// data directory when found.
    pub fn discover(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(DEFAULT_DATA_DIR);
            if candidate.join(METADATA_FILE).exists() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Load the full record set. The lock is held only for the duration of
    /// the read.
    pub fn open(data_dir: &Path) -> Result<Store> {
        let snapshot = data_dir.join(METADATA_FILE);
        if !snapshot.exists() {
            return Err(Error::Storage(format!(
                "no document repository at {}",
                data_dir.display()
            )));
        }

        let works = {
            let _lock = FileLock::acquire(&data_dir.join(LOCK_FILE))?;
            let contents = fs::read_to_string(&snapshot)?;
            serde_json::from_str::<Vec<Work>>(&contents)?
        };

        Ok(Store {
            data_dir: data_dir.to_path_buf(),
            works,
        })
    }

    /// Serialize the full record set back, atomically: write to a temp file
    /// in the same directory, then rename over the snapshot.
    pub fn save(&self) -> Result<()> {
        let _lock = FileLock::acquire(&self.data_dir.join(LOCK_FILE))?;

        let mut works: Vec<&Work> = self.works.iter().collect();
        works.sort_by(|a, b| a.cite_key.cmp(&b.cite_key));

        let tmp = self.data_dir.join(format!("{}.tmp", METADATA_FILE));
        fs::write(&tmp, serde_json::to_string_pretty(&works)?)?;
        fs::rename(&tmp, self.data_dir.join(METADATA_FILE))?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Location of the text index owned by this repository.
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join(INDEX_DIR)
    }

    pub fn works(&self) -> &[Work] {
        &self.works
    }

    pub fn find_by_key(&self, key: &str) -> Option<&Work> {
        self.works.iter().find(|w| w.cite_key == key)
    }

    /// Find the work referencing a file with this content hash, if any.
    pub fn find_by_hash(&self, sha256: &str) -> Option<&Work> {
        self.works.iter().find(|w| w.has_hash(sha256))
    }

    /// Absolute path of a work's attachment by label.
    pub fn attachment_path(&self, key: &str, label: &str) -> Result<PathBuf> {
        let work = self
            .find_by_key(key)
            .ok_or_else(|| Error::NotFound(format!("key {} not found", key)))?;
        let file = work
            .files
            .iter()
            .find(|f| f.label == label)
            .ok_or_else(|| Error::NotFound(format!("attachment {} not found", label)))?;
        Ok(self.data_dir.join(&file.filename))
    }

    /// Field-scoped lookup. `pattern` is a case-insensitive regex matched
    /// against the denormalized string form of the field; results are
    /// ordered by cite key.
    pub fn lookup(&self, field: &str, pattern: &str) -> Result<Vec<Work>> {
        let re = Regex::new(&format!("(?i){}", pattern))
            .map_err(|e| Error::QuerySyntax(e.to_string()))?;

        let matches = |w: &Work| -> bool {
            match field {
                "author" => re.is_match(&w.authors_string()),
                "editor" => re.is_match(&w.editors_string()),
                "title" => w.display_title().is_some_and(|t| re.is_match(t)),
                "journal" => w.fields.journal.as_deref().is_some_and(|j| re.is_match(j)),
                "year" => w
                    .fields
                    .year
                    .is_some_and(|y| re.is_match(&y.to_string())),
                "key" => re.is_match(&w.cite_key),
                "tag" => w.tags.iter().any(|t| re.is_match(t)),
                _ => false,
            }
        };

        let mut found: Vec<Work> = self.works.iter().filter(|w| matches(w)).cloned().collect();
        found.sort_by(|a, b| a.cite_key.cmp(&b.cite_key));
        Ok(found)
    }

    /// Commit a new work: reject duplicate content, copy the files into the
    /// managed directory, make the cite key unique, append tags, persist.
    /// Returns the final cite key.
    pub fn add(
        &mut self,
        mut work: Work,
        primary: &Path,
        supplementary: &[PathBuf],
        tags: &[String],
    ) -> Result<String> {
        let primary_hash = hash_file(primary)?;
        if let Some(existing) = self.find_by_hash(&primary_hash) {
            return Err(Error::DuplicateEntry(format!(
                "{} already exists in the repository with key {}",
                primary.display(),
                existing.cite_key
            )));
        }

        // Cite-key collision resolution before anything becomes visible.
        let existing_keys: HashSet<String> =
            self.works.iter().map(|w| w.cite_key.clone()).collect();
        let final_key = resolve_collision(&work.cite_key, &existing_keys);
        if final_key != work.cite_key {
            info!(proposed = %work.cite_key, assigned = %final_key, "cite key collision");
            if let Some(citation) = work.citation.take() {
                work.citation = Some(citation.replace(&work.cite_key, &final_key));
            }
            work.cite_key = final_key.clone();
        }

        self.copy_into_managed(&mut work, primary, PRIMARY_LABEL, 0, primary_hash)?;
        for (i, supp) in supplementary.iter().enumerate() {
            let hash = hash_file(supp)?;
            let label = basename(supp);
            self.copy_into_managed(&mut work, supp, &label, i + 1, hash)?;
        }

        work.add_tags(tags.iter().cloned());
        self.works.push(work);
        self.save()?;
        Ok(final_key)
    }

    /// Attach a supplementary file to an existing work.
    pub fn attach(&mut self, key: &str, path: &Path) -> Result<()> {
        let hash = hash_file(path)?;
        let data_dir = self.data_dir.clone();

        let work = self
            .works
            .iter_mut()
            .find(|w| w.cite_key == key)
            .ok_or_else(|| Error::NotFound(format!("key {} not found", key)))?;

        if let Some(existing) = work.files.iter().find(|f| f.sha256 == hash) {
            return Err(Error::DuplicateEntry(format!(
                "file already attached as {} under key {}",
                existing.label, key
            )));
        }

        let index = work.files.len();
        let filename = available_filename(&data_dir, work, path, index);
        fs::copy(path, data_dir.join(&filename))?;
        work.files.push(AttachedFile {
            filename,
            label: basename(path),
            sha256: hash,
        });
        self.save()
    }

    /// Remove a supplementary attachment by label, deleting its managed
    /// file. The primary PDF cannot be detached.
    pub fn remove_attachment(&mut self, key: &str, label: &str) -> Result<()> {
        let data_dir = self.data_dir.clone();
        let work = self
            .works
            .iter_mut()
            .find(|w| w.cite_key == key)
            .ok_or_else(|| Error::NotFound(format!("key {} not found", key)))?;

        let pos = work
            .files
            .iter()
            .position(|f| f.label == label)
            .ok_or_else(|| Error::NotFound(format!("attachment {} not found", label)))?;
        if pos == 0 {
            return Err(Error::Storage(
                "the primary PDF cannot be detached".to_string(),
            ));
        }

        let removed = work.files.remove(pos);
        if let Err(e) = fs::remove_file(data_dir.join(&removed.filename)) {
            warn!(file = %removed.filename, error = %e, "failed to delete managed file");
        }
        self.save()
    }

    /// Add and remove tags on a work, then persist.
    pub fn retag(&mut self, key: &str, add: &[String], remove: &[String]) -> Result<()> {
        let work = self
            .works
            .iter_mut()
            .find(|w| w.cite_key == key)
            .ok_or_else(|| Error::NotFound(format!("key {} not found", key)))?;
        work.add_tags(add.iter().cloned());
        work.remove_tags(remove.iter().map(|t| t.as_str()));
        self.save()
    }

    /// Rename a cite key across the store and the text index.
    pub fn rename_key(&mut self, old_key: &str, new_key: &str, index: &TextIndex) -> Result<()> {
        if self.find_by_key(new_key).is_some() {
            return Err(Error::DuplicateEntry(format!(
                "key {} already exists",
                new_key
            )));
        }
        let work = self
            .works
            .iter_mut()
            .find(|w| w.cite_key == old_key)
            .ok_or_else(|| Error::NotFound(format!("key {} not found", old_key)))?;

        if let Some(citation) = work.citation.take() {
            work.citation = Some(citation.replace(old_key, new_key));
        }
        work.cite_key = new_key.to_string();

        self.save()?;
        index.rename_key(old_key, new_key)?;
        Ok(())
    }

    /// Delete a work: record, managed files, and indexed pages go together.
    pub fn delete(&mut self, key: &str, index: &TextIndex) -> Result<()> {
        let pos = self
            .works
            .iter()
            .position(|w| w.cite_key == key)
            .ok_or_else(|| Error::NotFound(format!("key {} not in repository", key)))?;

        let work = self.works.remove(pos);
        for file in &work.files {
            if let Err(e) = fs::remove_file(self.data_dir.join(&file.filename)) {
                warn!(file = %file.filename, error = %e, "failed to delete managed file");
            }
        }
        self.save()?;
        index.delete_pages(key)?;
        Ok(())
    }

    fn copy_into_managed(
        &self,
        work: &mut Work,
        source: &Path,
        label: &str,
        index: usize,
        sha256: String,
    ) -> Result<()> {
        let filename = available_filename(&self.data_dir, work, source, index);
        fs::copy(source, self.data_dir.join(&filename))?;
        work.files.push(AttachedFile {
            filename,
            label: label.to_string(),
            sha256,
        });
        Ok(())
    }
}

/// Managed filename that does not clash with a file already on disk. Works
/// with identical author, year and title derive the same base name; a
/// numeric suffix keeps their files distinct.
fn available_filename(data_dir: &Path, work: &Work, source: &Path, index: usize) -> String {
    let candidate = managed_filename(work, source, index);
    if !data_dir.join(&candidate).exists() {
        return candidate;
    }

    let (stem, ext) = match candidate.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (candidate.as_str(), None),
    };
    for n in 2u32.. {
        let name = match ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        if !data_dir.join(&name).exists() {
            return name;
        }
    }
    unreachable!("counter space is unbounded")
}

/// SHA-256 of a file's contents, hex encoded.
pub fn hash_file(path: &Path) -> Result<String> {
    let contents = fs::read(path)
        .map_err(|_| Error::NotFound(format!("file {} not found", path.display())))?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryKind, Person, WorkFields};
    use std::io::Write;

    fn sample_work(key: &str, title: &str) -> Work {
        let mut work = Work::new(
            key,
            EntryKind::Article,
            WorkFields {
                title: Some(title.to_string()),
                year: Some(2020),
                journal: Some("Nature".to_string()),
                ..Default::default()
            },
        );
        work.authors.push(Person::new("Smith").with_given_name("Jane"));
        work
    }

    fn write_pdf(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        write!(f, "{}", contents).unwrap();
        path
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        inbox: PathBuf,
        data_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let inbox = tmp.path().join("inbox");
        fs::create_dir(&inbox).unwrap();
        let data_dir = tmp.path().join(DEFAULT_DATA_DIR);
        Fixture {
            inbox,
            data_dir,
            _tmp: tmp,
        }
    }

    #[test]
    fn test_init_refuses_existing_repository() {
        let fx = fixture();
        Store::init(&fx.data_dir, false).unwrap();
        assert!(matches!(
            Store::init(&fx.data_dir, false),
            Err(Error::Storage(_))
        ));

        // force resets snapshot, index and files as one unit
        let store = Store::init(&fx.data_dir, true).unwrap();
        assert!(store.works().is_empty());
        assert!(fx.data_dir.join(INDEX_DIR).exists());
    }

    #[test]
    fn test_find_on_empty_store_is_none() {
        let fx = fixture();
        let store = Store::init(&fx.data_dir, false).unwrap();
        assert!(store.find_by_key("X").is_none());
        assert!(store.find_by_hash("deadbeef").is_none());
    }

    #[test]
    fn test_add_copies_files_and_round_trips() {
        let fx = fixture();
        let mut store = Store::init(&fx.data_dir, false).unwrap();
        let pdf = write_pdf(&fx.inbox, "paper.pdf", "pdf bytes");
        let supp = write_pdf(&fx.inbox, "data.csv", "csv bytes");

        let key = store
            .add(
                sample_work("Smith2020abc", "A Better Computer"),
                &pdf,
                &[supp],
                &["survey".to_string()],
            )
            .unwrap();
        assert_eq!(key, "Smith2020abc");

        let work = store.find_by_key(&key).unwrap();
        assert_eq!(work.files.len(), 2);
        assert_eq!(work.files[0].label, PRIMARY_LABEL);
        assert_eq!(work.files[1].label, "data.csv");
        assert!(work.files[1].filename.contains("_SI0001"));
        assert!(fx.data_dir.join(&work.files[0].filename).exists());
        assert_eq!(work.tags, vec!["survey".to_string()]);

        // Round-trip: an independent open sees the same record set.
        let reopened = Store::open(&fx.data_dir).unwrap();
        assert_eq!(reopened.works(), store.works());
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let fx = fixture();
        let mut store = Store::init(&fx.data_dir, false).unwrap();
        let pdf = write_pdf(&fx.inbox, "paper.pdf", "same bytes");
        let copy = write_pdf(&fx.inbox, "copy.pdf", "same bytes");

        store
            .add(sample_work("Smith2020abc", "T"), &pdf, &[], &[])
            .unwrap();
        let err = store
            .add(sample_work("Other2021xyz", "U"), &copy, &[], &[])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry(_)));
        assert_eq!(store.works().len(), 1);
    }

    #[test]
    fn test_cite_key_collision_gets_letter_suffix() {
        let fx = fixture();
        let mut store = Store::init(&fx.data_dir, false).unwrap();
        let a = write_pdf(&fx.inbox, "a.pdf", "contents a");
        let b = write_pdf(&fx.inbox, "b.pdf", "contents b");

        store
            .add(sample_work("Smith2020abc", "T"), &a, &[], &[])
            .unwrap();
        let key = store
            .add(sample_work("Smith2020abc", "T"), &b, &[], &[])
            .unwrap();
        assert_eq!(key, "Smith2020abca");
    }

    #[test]
    fn test_identical_metadata_keeps_both_managed_files() {
        let fx = fixture();
        let mut store = Store::init(&fx.data_dir, false).unwrap();
        let a = write_pdf(&fx.inbox, "a.pdf", "contents a");
        let b = write_pdf(&fx.inbox, "b.pdf", "contents b");

        // Same author, year and title: the derived base filename collides
        // even though the cite keys get distinct suffixes.
        let first = store
            .add(sample_work("Smith2020abc", "A Better Computer"), &a, &[], &[])
            .unwrap();
        let second = store
            .add(sample_work("Smith2020abc", "A Better Computer"), &b, &[], &[])
            .unwrap();

        let name_a = store.find_by_key(&first).unwrap().files[0].filename.clone();
        let name_b = store.find_by_key(&second).unwrap().files[0].filename.clone();
        assert_ne!(name_a, name_b);

        // Neither import may overwrite the other's bytes.
        assert_eq!(
            fs::read_to_string(fx.data_dir.join(&name_a)).unwrap(),
            "contents a"
        );
        assert_eq!(
            fs::read_to_string(fx.data_dir.join(&name_b)).unwrap(),
            "contents b"
        );
    }

    #[test]
    fn test_lookup_by_tag_and_fields() {
        let fx = fixture();
        let mut store = Store::init(&fx.data_dir, false).unwrap();
        for (i, key) in ["A2020aaa", "B2020bbb", "C2020ccc", "D2020ddd"]
            .iter()
            .enumerate()
        {
            let pdf = write_pdf(&fx.inbox, &format!("{}.pdf", key), &format!("bytes {}", i));
            let tags = if i < 3 {
                vec!["survey".to_string()]
            } else {
                vec!["review".to_string()]
            };
            store
                .add(sample_work(key, "Some Title"), &pdf, &[], &tags)
                .unwrap();
        }

        let tagged = store.lookup("tag", "survey").unwrap();
        assert_eq!(tagged.len(), 3);
        assert!(tagged.iter().all(|w| w.has_tag("survey")));

        let by_author = store.lookup("author", "smith").unwrap();
        assert_eq!(by_author.len(), 4);
        let by_year = store.lookup("year", "^2020$").unwrap();
        assert_eq!(by_year.len(), 4);
        let none = store.lookup("title", "absent-pattern").unwrap();
        assert!(none.is_empty());

        let err = store.lookup("title", "[unclosed").unwrap_err();
        assert!(matches!(err, Error::QuerySyntax(_)));
    }

    #[test]
    fn test_attach_detach() {
        let fx = fixture();
        let mut store = Store::init(&fx.data_dir, false).unwrap();
        let pdf = write_pdf(&fx.inbox, "paper.pdf", "pdf");
        let supp = write_pdf(&fx.inbox, "extra.txt", "extra");

        let key = store
            .add(sample_work("Smith2020abc", "T"), &pdf, &[], &[])
            .unwrap();
        store.attach(&key, &supp).unwrap();

        let err = store.attach(&key, &supp).unwrap_err();
        assert!(matches!(err, Error::DuplicateEntry(_)));

        let managed = store.attachment_path(&key, "extra.txt").unwrap();
        assert!(managed.exists());

        store.remove_attachment(&key, "extra.txt").unwrap();
        assert!(!managed.exists());
        assert!(matches!(
            store.attachment_path(&key, "extra.txt").unwrap_err(),
            Error::NotFound(_)
        ));

        // The primary PDF cannot be detached.
        assert!(store.remove_attachment(&key, PRIMARY_LABEL).is_err());
        assert!(matches!(
            store.remove_attachment("nope", "x").unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_delete_cascades_to_files_and_index() {
        let fx = fixture();
        let mut store = Store::init(&fx.data_dir, false).unwrap();
        let index = TextIndex::open(&store.index_dir()).unwrap();
        let pdf = write_pdf(&fx.inbox, "paper.pdf", "pdf");

        let key = store
            .add(sample_work("Smith2020abc", "T"), &pdf, &[], &[])
            .unwrap();
        index
            .add_pages(&key, &["page one radium".to_string()])
            .unwrap();
        let managed = store.attachment_path(&key, PRIMARY_LABEL).unwrap();

        store.delete(&key, &index).unwrap();
        assert!(store.find_by_key(&key).is_none());
        assert!(!managed.exists());
        assert_eq!(index.page_count(&key).unwrap(), 0);

        assert!(matches!(
            store.delete(&key, &index).unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_rename_key_consistency() {
        let fx = fixture();
        let mut store = Store::init(&fx.data_dir, false).unwrap();
        let index = TextIndex::open(&store.index_dir()).unwrap();
        let pdf = write_pdf(&fx.inbox, "paper.pdf", "pdf");
        let other = write_pdf(&fx.inbox, "other.pdf", "other");

        let key = store
            .add(sample_work("Smith2020abc", "T"), &pdf, &[], &[])
            .unwrap();
        store
            .add(sample_work("Taken2020xxx", "U"), &other, &[], &[])
            .unwrap();
        index
            .add_pages(&key, &["radium page".to_string()])
            .unwrap();

        assert!(matches!(
            store
                .rename_key(&key, "Taken2020xxx", &index)
                .unwrap_err(),
            Error::DuplicateEntry(_)
        ));

        store.rename_key(&key, "Renamed2020abc", &index).unwrap();
        assert!(store.find_by_key("Smith2020abc").is_none());
        assert!(store.find_by_key("Renamed2020abc").is_some());
        assert_eq!(index.page_count("Smith2020abc").unwrap(), 0);
        assert_eq!(index.page_count("Renamed2020abc").unwrap(), 1);

        let reopened = Store::open(&fx.data_dir).unwrap();
        assert!(reopened.find_by_key("Renamed2020abc").is_some());
    }

    #[test]
    fn test_discover_walks_up() {
        let fx = fixture();
        Store::init(&fx.data_dir, false).unwrap();
        let nested = fx.data_dir.parent().unwrap().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        let found = Store::discover(&nested).unwrap();
        assert_eq!(found, fx.data_dir);
        assert!(Store::discover(Path::new("/nonexistent/dir")).is_none());
    }

    #[test]
    fn test_save_is_atomic_snapshot() {
        let fx = fixture();
        let mut store = Store::init(&fx.data_dir, false).unwrap();
        let pdf = write_pdf(&fx.inbox, "paper.pdf", "pdf");
        store
            .add(sample_work("Smith2020abc", "T"), &pdf, &[], &[])
            .unwrap();

        // No temp residue, and the snapshot parses.
        assert!(!fx.data_dir.join("metadata.json.tmp").exists());
        let raw = fs::read_to_string(fx.data_dir.join(METADATA_FILE)).unwrap();
        let parsed: Vec<Work> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
