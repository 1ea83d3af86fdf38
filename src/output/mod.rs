//! Output module for crawl reports and statistics
//!
//! This module handles:
//! - Live per-run counters updated by the traversal workers
//! - The completion report printed when a crawl stops
//! - Record counts read back from the relational sink

pub mod stats;

pub use stats::{load_statistics, print_report, print_statistics, CrawlReport, CrawlStats};
