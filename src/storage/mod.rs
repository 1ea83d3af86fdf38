//! Storage module for persisting crawl output and crawl state
//!
//! This module handles:
//! - The idempotent record sink contract and its two backends
//!   (JSON-lines files and SQLite tables)
//! - Fanning each record out to every configured sink
//! - The crawl-state database used to resume an interrupted crawl

mod jsonl;
mod schema;
mod sqlite;
mod state;
mod traits;

pub use jsonl::JsonLinesSink;
pub use sqlite::{RecordCounts, SqliteSink};
pub use state::StateStore;
pub use traits::{RecordSink, StorageError, StorageResult, WriteOutcome};

use crate::config::OutputConfig;
use crate::model::Record;
use std::path::Path;

/// Every sink one worker writes to
///
/// A record counts as inserted when at least one sink stored it. Each sink
/// decides idempotence on its own.
pub struct SinkSet {
    sinks: Vec<Box<dyn RecordSink>>,
}

impl SinkSet {
    pub fn new(sinks: Vec<Box<dyn RecordSink>>) -> Self {
        Self { sinks }
    }

    /// Opens the sinks named in the output configuration
    ///
    /// # Returns
    ///
    /// * `Ok(SinkSet)` - One sink per configured backend
    /// * `Err(StorageError)` - A backend could not be opened
    pub fn open(config: &OutputConfig) -> StorageResult<Self> {
        let mut sinks: Vec<Box<dyn RecordSink>> = Vec::new();

        if let Some(dir) = config.json_dir.as_deref().filter(|d| !d.is_empty()) {
            sinks.push(Box::new(JsonLinesSink::new(dir)));
        }

        if let Some(path) = config.database_path.as_deref().filter(|p| !p.is_empty()) {
            sinks.push(Box::new(SqliteSink::open(Path::new(path))?));
        }

        Ok(Self::new(sinks))
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Writes a record to every sink
    pub fn write(&mut self, record: &Record) -> StorageResult<WriteOutcome> {
        let mut outcome = WriteOutcome::Duplicate;

        for sink in &mut self.sinks {
            match sink.write(record)? {
                WriteOutcome::Inserted => outcome = WriteOutcome::Inserted,
                WriteOutcome::Duplicate => tracing::debug!(
                    "{} {} already stored in {}",
                    record.kind().as_str(),
                    record.natural_key(),
                    sink.name()
                ),
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExternalPage;
    use chrono::Utc;
    use tempfile::TempDir;

    fn output_config(dir: &TempDir, json: bool, sqlite: bool) -> OutputConfig {
        OutputConfig {
            state_path: dir.path().join("state.db").to_string_lossy().into_owned(),
            json_dir: json.then(|| dir.path().join("json").to_string_lossy().into_owned()),
            database_path: sqlite.then(|| dir.path().join("records.db").to_string_lossy().into_owned()),
        }
    }

    fn page() -> Record {
        Record::ExternalPage(ExternalPage::new(
            "abc".to_string(),
            "https://example.com/".to_string(),
            Utc::now(),
            200,
            "text".to_string(),
        ))
    }

    #[test]
    fn test_open_configured_sinks() {
        let dir = TempDir::new().unwrap();
        let sinks = SinkSet::open(&output_config(&dir, true, true)).unwrap();
        assert_eq!(sinks.names(), vec!["jsonl", "sqlite"]);

        let none = SinkSet::open(&output_config(&dir, false, false)).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_each_sink_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = output_config(&dir, true, true);
        let mut sinks = SinkSet::open(&config).unwrap();

        assert_eq!(sinks.write(&page()).unwrap(), WriteOutcome::Inserted);
        assert_eq!(sinks.write(&page()).unwrap(), WriteOutcome::Duplicate);

        // A second worker's sinks see the same stored keys
        let mut other = SinkSet::open(&config).unwrap();
        assert_eq!(other.write(&page()).unwrap(), WriteOutcome::Duplicate);

        let db = SqliteSink::open(Path::new(config.database_path.as_deref().unwrap())).unwrap();
        assert_eq!(db.record_counts().unwrap().pages, 1);
    }
}
