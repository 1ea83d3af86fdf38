//! Configuration module for Pinweave
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use pinweave::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("pinweave.toml")).unwrap();
//! println!("Crawl starts from user: {}", config.seed.user);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, DedupConfig, DedupStrategy, OutputConfig, SeedConfig, SiteConfig,
    UserAgentConfig, DEFAULT_BEFORE_CURSOR,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
