//! Storage traits and error types
//!
//! This module defines the sink interface every record store implements and
//! the errors storage operations raise.

use crate::model::Record;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt stored data: {0}")]
    Corrupt(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What a write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record was stored
    Inserted,

    /// A record with the same natural key was already stored; nothing changed
    Duplicate,
}

/// An idempotent record store
///
/// Writing a record whose natural key is already present must leave the
/// stored record untouched and report `Duplicate` rather than an error.
/// Each worker owns its own sink instances; sinks rely on the backing store,
/// not on shared locks, to reject concurrent duplicates.
pub trait RecordSink: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Stores a record if its natural key is new
    fn write(&mut self, record: &Record) -> StorageResult<WriteOutcome>;
}
