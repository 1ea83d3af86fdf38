//! Pinweave: a bookmark social-graph crawler
//!
//! This crate walks a bookmarking service starting from one user's saved links,
//! discovers every other user who saved the same targets, crawls those users in
//! turn, and persists a deduplicated record of bookmarks, bookmark-sharing
//! aggregates and (optionally) the text of each bookmarked page.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Pinweave operations
#[derive(Debug, Error)]
pub enum PinweaveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] crawler::FrontierError),

    #[error("Parser error: {0}")]
    Parse(#[from] crawler::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error(
        "{pending} requests are waiting in the saved frontier but the {strategy} dedup filter \
         starts empty; rerun with --fresh or use the persistent strategy"
    )]
    UnsafeResume {
        pending: usize,
        strategy: &'static str,
    },

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Crawl aborted with {unfinished} requests left in the frontier: {source}")]
    Aborted {
        unfinished: usize,
        #[source]
        source: Box<PinweaveError>,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Pinweave operations
pub type Result<T> = std::result::Result<T, PinweaveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{Bookmark, ExternalPage, Record, SlugAggregate};
pub use state::RequestState;
pub use crate::url::strip_fragment;
