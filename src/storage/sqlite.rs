//! SQLite record sink
//!
//! One table per record kind with the natural key as primary key. Writes use
//! `INSERT OR IGNORE`, so the database rejects duplicates even when several
//! workers, each with its own connection, race on the same key.

use crate::model::{Bookmark, ExternalPage, Record, RecordKind, SlugAggregate};
use crate::storage::schema::initialize_records_schema;
use crate::storage::traits::{RecordSink, StorageError, StorageResult, WriteOutcome};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Stored record counts, per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub bookmarks: u64,
    pub aggregates: u64,
    pub pages: u64,
}

impl RecordCounts {
    pub fn get(&self, kind: RecordKind) -> u64 {
        match kind {
            RecordKind::Bookmark => self.bookmarks,
            RecordKind::SlugAggregate => self.aggregates,
            RecordKind::ExternalPage => self.pages,
        }
    }
}

/// Relational sink backed by SQLite
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens (or creates) the record database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Concurrent workers each hold a connection; WAL lets readers proceed
        // and the busy timeout serializes writers instead of failing them
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(10))?;

        initialize_records_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_records_schema(&conn)?;
        Ok(Self { conn })
    }

    fn insert_bookmark(&self, bookmark: &Bookmark) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO PIN
                (bookmark_id, url, url_slug, url_count, title, created_at, fetched_at, tags, author)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                bookmark.bookmark_id,
                bookmark.target_url,
                bookmark.slug,
                bookmark.save_count,
                bookmark.title,
                bookmark.created_at.format(CREATED_AT_FORMAT).to_string(),
                bookmark.fetched_at.to_rfc3339(),
                serde_json::to_string(&bookmark.tags)?,
                bookmark.author,
            ],
        )?;
        Ok(changed)
    }

    fn insert_aggregate(&self, aggregate: &SlugAggregate) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO URLSLUG
                (url_slug, url, canonical_link, co_savers, co_saver_count, tags_union, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                aggregate.slug,
                aggregate.target_url,
                aggregate.canonical_link,
                serde_json::to_string(&aggregate.co_savers)?,
                aggregate.co_saver_count,
                serde_json::to_string(&aggregate.tags_union)?,
                aggregate.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(changed)
    }

    fn insert_page(&self, page: &ExternalPage) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO PAGE
                (url_slug, url, fetched_at, status_code, content_text, content_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                page.slug,
                page.target_url,
                page.fetched_at.to_rfc3339(),
                page.status_code,
                page.content_text,
                page.content_size,
            ],
        )?;
        Ok(changed)
    }

    /// Counts stored records of every kind
    pub fn record_counts(&self) -> StorageResult<RecordCounts> {
        let count = |table: &str| -> StorageResult<u64> {
            let n: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(RecordCounts {
            bookmarks: count("PIN")?,
            aggregates: count("URLSLUG")?,
            pages: count("PAGE")?,
        })
    }

    /// Gets a stored bookmark by id
    pub fn get_bookmark(&self, bookmark_id: i64) -> StorageResult<Option<Bookmark>> {
        let row = self
            .conn
            .query_row(
                "SELECT bookmark_id, url, url_slug, url_count, title, created_at, fetched_at, tags, author
                 FROM PIN WHERE bookmark_id = ?1",
                params![bookmark_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, url, slug, count, title, created, fetched, tags, author)) = row else {
            return Ok(None);
        };

        Ok(Some(Bookmark {
            bookmark_id: id,
            target_url: url,
            slug,
            save_count: count,
            title,
            created_at: NaiveDateTime::parse_from_str(&created, CREATED_AT_FORMAT)
                .map_err(|e| StorageError::Corrupt(format!("created_at '{}': {}", created, e)))?,
            fetched_at: parse_timestamp(&fetched)?,
            tags: serde_json::from_str(&tags)?,
            author,
        }))
    }

    /// Gets a stored aggregate by slug
    pub fn get_aggregate(&self, slug: &str) -> StorageResult<Option<SlugAggregate>> {
        let row = self
            .conn
            .query_row(
                "SELECT url_slug, url, canonical_link, co_savers, co_saver_count, tags_union, fetched_at
                 FROM URLSLUG WHERE url_slug = ?1",
                params![slug],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((slug, url, canonical_link, savers, count, tags, fetched)) = row else {
            return Ok(None);
        };

        Ok(Some(SlugAggregate {
            slug,
            target_url: url,
            canonical_link,
            co_savers: serde_json::from_str(&savers)?,
            co_saver_count: count,
            tags_union: serde_json::from_str(&tags)?,
            fetched_at: parse_timestamp(&fetched)?,
        }))
    }

    /// Gets a stored external page by slug
    pub fn get_page(&self, slug: &str) -> StorageResult<Option<ExternalPage>> {
        let row = self
            .conn
            .query_row(
                "SELECT url_slug, url, fetched_at, status_code, content_text, content_size
                 FROM PAGE WHERE url_slug = ?1",
                params![slug],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((slug, url, fetched, status_code, content_text, content_size)) = row else {
            return Ok(None);
        };

        Ok(Some(ExternalPage {
            slug,
            target_url: url,
            fetched_at: parse_timestamp(&fetched)?,
            status_code,
            content_text,
            content_size,
        }))
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp '{}': {}", value, e)))
}

impl RecordSink for SqliteSink {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write(&mut self, record: &Record) -> StorageResult<WriteOutcome> {
        let changed = match record {
            Record::Bookmark(bookmark) => self.insert_bookmark(bookmark)?,
            Record::SlugAggregate(aggregate) => self.insert_aggregate(aggregate)?,
            Record::ExternalPage(page) => self.insert_page(page)?,
        };

        Ok(if changed == 0 {
            WriteOutcome::Duplicate
        } else {
            WriteOutcome::Inserted
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_bookmark(id: i64, title: &str) -> Bookmark {
        Bookmark {
            bookmark_id: id,
            target_url: "https://example.com/a".to_string(),
            slug: "abc".to_string(),
            save_count: 3,
            title: title.to_string(),
            created_at: NaiveDate::from_ymd_opt(2023, 11, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            fetched_at: Utc::now(),
            tags: vec!["rust".to_string(), "web".to_string()],
            author: "alice".to_string(),
        }
    }

    #[test]
    fn test_bookmark_write_is_idempotent() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let first = sample_bookmark(1, "First");
        let second = sample_bookmark(1, "Changed");

        assert_eq!(
            sink.write(&Record::Bookmark(first.clone())).unwrap(),
            WriteOutcome::Inserted
        );
        assert_eq!(
            sink.write(&Record::Bookmark(second)).unwrap(),
            WriteOutcome::Duplicate
        );

        assert_eq!(sink.record_counts().unwrap().bookmarks, 1);
        assert_eq!(sink.get_bookmark(1).unwrap(), Some(first));
    }

    #[test]
    fn test_aggregate_and_page_keyed_by_slug() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let aggregate = SlugAggregate::new(
            "abc".to_string(),
            "https://pinboard.in/url:abc".to_string(),
            Some("https://example.com/a".to_string()),
            vec!["carol".to_string(), "dave".to_string()],
            vec!["rust".to_string()],
            Utc::now(),
        );
        let page = ExternalPage::new(
            "abc".to_string(),
            "https://example.com/a".to_string(),
            Utc::now(),
            200,
            "Hello".to_string(),
        );

        assert_eq!(
            sink.write(&Record::SlugAggregate(aggregate.clone())).unwrap(),
            WriteOutcome::Inserted
        );
        assert_eq!(
            sink.write(&Record::ExternalPage(page.clone())).unwrap(),
            WriteOutcome::Inserted
        );
        assert_eq!(
            sink.write(&Record::SlugAggregate(aggregate.clone())).unwrap(),
            WriteOutcome::Duplicate
        );

        assert_eq!(sink.get_aggregate("abc").unwrap(), Some(aggregate));
        assert_eq!(sink.get_page("abc").unwrap(), Some(page));
        assert_eq!(
            sink.record_counts().unwrap(),
            RecordCounts {
                bookmarks: 0,
                aggregates: 1,
                pages: 1
            }
        );

        let counts = sink.record_counts().unwrap();
        assert_eq!(counts.get(RecordKind::Bookmark), 0);
        assert_eq!(counts.get(RecordKind::SlugAggregate), 1);
        assert_eq!(counts.get(RecordKind::ExternalPage), 1);
    }

    #[test]
    fn test_separate_connections_share_key_constraint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.db");

        let mut a = SqliteSink::open(&path).unwrap();
        let mut b = SqliteSink::open(&path).unwrap();

        assert_eq!(
            a.write(&Record::Bookmark(sample_bookmark(7, "A"))).unwrap(),
            WriteOutcome::Inserted
        );
        assert_eq!(
            b.write(&Record::Bookmark(sample_bookmark(7, "B"))).unwrap(),
            WriteOutcome::Duplicate
        );
        assert_eq!(b.get_bookmark(7).unwrap().unwrap().title, "A");
    }

    #[test]
    fn test_missing_records_are_none() {
        let sink = SqliteSink::open_in_memory().unwrap();
        assert_eq!(sink.get_bookmark(404).unwrap(), None);
        assert_eq!(sink.get_aggregate("nope").unwrap(), None);
        assert_eq!(sink.get_page("nope").unwrap(), None);
    }
}
