//! Append-only JSON-lines file sink
//!
//! Layout under the sink root:
//!
//! ```text
//! pins/pin_<bookmark_id>.jl
//! urlslugs/urlslug_<slug>.jl
//! pages/page_<slug>.jl
//! ```
//!
//! Each file holds exactly one JSON line. A record is written to a temporary
//! file in the same directory and then linked into place without clobbering,
//! so a key's file either holds the complete line or does not exist. Keys are
//! percent-encoded, which keeps distinct keys on distinct file names.

use crate::model::{Record, RecordKind};
use crate::storage::traits::{RecordSink, StorageResult, WriteOutcome};
use std::borrow::Cow;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};

/// File sink writing one JSON-lines file per record
pub struct JsonLinesSink {
    root: PathBuf,
}

impl JsonLinesSink {
    /// Creates a sink rooted at `root`; directories are made on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory(kind: RecordKind) -> &'static str {
        match kind {
            RecordKind::Bookmark => "pins",
            RecordKind::SlugAggregate => "urlslugs",
            RecordKind::ExternalPage => "pages",
        }
    }

    /// Path a record is stored at, derived from its kind and natural key
    pub fn path_for(&self, record: &Record) -> PathBuf {
        let kind = record.kind();
        let file_name = format!("{}_{}.jl", kind.as_str(), file_key(&record.natural_key()));
        self.root.join(Self::directory(kind)).join(file_name)
    }

    fn to_json(record: &Record) -> serde_json::Result<String> {
        match record {
            Record::Bookmark(bookmark) => serde_json::to_string(bookmark),
            Record::SlugAggregate(aggregate) => serde_json::to_string(aggregate),
            Record::ExternalPage(page) => serde_json::to_string(page),
        }
    }

    /// Writes the line to a hidden temporary file in `dir`
    fn stage(dir: &Path, line: &str) -> StorageResult<NamedTempFile> {
        let mut staged = Builder::new().prefix(".").suffix(".part").tempfile_in(dir)?;
        staged.write_all(line.as_bytes())?;
        staged.as_file().sync_all()?;
        Ok(staged)
    }
}

/// Percent-encodes a natural key for use in a file name
fn file_key(key: &str) -> Cow<'_, str> {
    urlencoding::encode(key)
}

/// A stored file is complete when it holds one newline-terminated JSON value
fn is_complete(path: &Path) -> StorageResult<bool> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    Ok(bytes.ends_with(b"\n") && serde_json::from_slice::<serde_json::Value>(&bytes).is_ok())
}

impl RecordSink for JsonLinesSink {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn write(&mut self, record: &Record) -> StorageResult<WriteOutcome> {
        let path = self.path_for(record);
        let dir = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(dir)?;

        let mut line = Self::to_json(record)?;
        line.push('\n');

        let staged = Self::stage(dir, &line)?;
        let staged = match staged.persist_noclobber(&path) {
            Ok(_) => return Ok(WriteOutcome::Inserted),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => e.file,
            Err(e) => return Err(e.error.into()),
        };

        if is_complete(&path)? {
            tracing::trace!("{} already exists", path.display());
            return Ok(WriteOutcome::Duplicate);
        }

        // Left behind by an earlier writer that died mid-write
        tracing::warn!("Replacing incomplete record file {}", path.display());
        staged.persist(&path).map_err(|e| e.error)?;
        Ok(WriteOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bookmark, ExternalPage, SlugAggregate};
    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;

    fn bookmark(id: i64, title: &str) -> Record {
        Record::Bookmark(Bookmark {
            bookmark_id: id,
            target_url: "https://example.com/a".to_string(),
            slug: "abc".to_string(),
            save_count: 1,
            title: title.to_string(),
            created_at: NaiveDate::from_ymd_opt(2023, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap(),
            fetched_at: Utc::now(),
            tags: vec![],
            author: "alice".to_string(),
        })
    }

    #[test]
    fn test_directories_created_on_first_write() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("out");
        let mut sink = JsonLinesSink::new(&root);
        assert!(!root.exists());

        sink.write(&bookmark(1, "A")).unwrap();
        assert!(root.join("pins").join("pin_1.jl").exists());
    }

    #[test]
    fn test_rewrite_keeps_first_record() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonLinesSink::new(dir.path());

        assert_eq!(sink.write(&bookmark(5, "First")).unwrap(), WriteOutcome::Inserted);
        assert_eq!(sink.write(&bookmark(5, "Second")).unwrap(), WriteOutcome::Duplicate);

        let content = fs::read_to_string(dir.path().join("pins/pin_5.jl")).unwrap();
        assert_eq!(content.lines().count(), 1);

        let stored: Bookmark = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(stored.title, "First");
    }

    #[test]
    fn test_kinds_use_separate_files() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonLinesSink::new(dir.path());

        let aggregate = Record::SlugAggregate(SlugAggregate::new(
            "abc".to_string(),
            "https://pinboard.in/url:abc".to_string(),
            None,
            vec![],
            vec![],
            Utc::now(),
        ));
        let page = Record::ExternalPage(ExternalPage::new(
            "abc".to_string(),
            "https://example.com/a".to_string(),
            Utc::now(),
            200,
            String::new(),
        ));

        assert_eq!(sink.write(&aggregate).unwrap(), WriteOutcome::Inserted);
        assert_eq!(sink.write(&page).unwrap(), WriteOutcome::Inserted);
        assert!(dir.path().join("urlslugs/urlslug_abc.jl").exists());
        assert!(dir.path().join("pages/page_abc.jl").exists());
    }

    fn page(slug: &str) -> Record {
        Record::ExternalPage(ExternalPage::new(
            slug.to_string(),
            "https://example.com/a".to_string(),
            Utc::now(),
            200,
            String::new(),
        ))
    }

    #[test]
    fn test_file_keys_are_escaped() {
        assert_eq!(file_key("f81a-7954_x.y"), "f81a-7954_x.y");
        assert_eq!(file_key("ab/c d"), "ab%2Fc%20d");
        assert_ne!(file_key("a/b"), file_key("a_b"));
        assert_ne!(file_key("a%2Fb"), file_key("a/b"));
    }

    #[test]
    fn test_similar_keys_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonLinesSink::new(dir.path());

        assert_eq!(sink.write(&page("a/b")).unwrap(), WriteOutcome::Inserted);
        assert_eq!(sink.write(&page("a_b")).unwrap(), WriteOutcome::Inserted);
        assert_eq!(sink.write(&page("a b")).unwrap(), WriteOutcome::Inserted);
        assert_eq!(sink.write(&page("a/b")).unwrap(), WriteOutcome::Duplicate);

        let files = fs::read_dir(dir.path().join("pages")).unwrap().count();
        assert_eq!(files, 3);
    }

    #[test]
    fn test_empty_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonLinesSink::new(dir.path());
        fs::create_dir_all(dir.path().join("pins")).unwrap();
        fs::write(dir.path().join("pins/pin_1.jl"), b"").unwrap();

        assert_eq!(sink.write(&bookmark(1, "Kept")).unwrap(), WriteOutcome::Inserted);

        let content = fs::read_to_string(dir.path().join("pins/pin_1.jl")).unwrap();
        let stored: Bookmark = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(stored.title, "Kept");
        assert_eq!(sink.write(&bookmark(1, "Later")).unwrap(), WriteOutcome::Duplicate);
    }

    #[test]
    fn test_truncated_line_is_replaced() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonLinesSink::new(dir.path());
        fs::create_dir_all(dir.path().join("pins")).unwrap();
        fs::write(dir.path().join("pins/pin_2.jl"), br#"{"bookmark_id":2,"tit"#).unwrap();

        assert_eq!(sink.write(&bookmark(2, "Whole")).unwrap(), WriteOutcome::Inserted);

        let content = fs::read_to_string(dir.path().join("pins/pin_2.jl")).unwrap();
        assert_eq!(content.lines().count(), 1);
        let stored: Bookmark = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(stored.title, "Whole");
    }

    #[test]
    fn test_no_staging_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonLinesSink::new(dir.path());

        sink.write(&bookmark(7, "A")).unwrap();
        sink.write(&bookmark(7, "B")).unwrap();
        sink.write(&bookmark(8, "C")).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path().join("pins"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["pin_7.jl", "pin_8.jl"]);
    }
}
