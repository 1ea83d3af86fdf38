//! Crawl counters and statistics
//!
//! This module provides the live counters workers bump during a crawl, the
//! report built from them when the crawl ends, and the record counts read
//! back from the relational sink for `--stats`.

use crate::model::RecordKind;
use crate::storage::{RecordCounts, SqliteSink, WriteOutcome};
use crate::PinweaveError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

fn kind_index(kind: RecordKind) -> usize {
    match kind {
        RecordKind::Bookmark => 0,
        RecordKind::SlugAggregate => 1,
        RecordKind::ExternalPage => 2,
    }
}

/// Live counters shared by every worker
#[derive(Debug, Default)]
pub struct CrawlStats {
    admitted: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    persisted: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
    written: [AtomicU64; 3],
    duplicates: [AtomicU64; 3],
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request passed the dedup filter and entered the frontier
    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A request was turned away by the dedup filter
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Malformed records skipped by the parser
    pub fn record_skipped(&self, count: usize) {
        self.skipped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_write(&self, kind: RecordKind, outcome: WriteOutcome) {
        let counters = match outcome {
            WriteOutcome::Inserted => &self.written,
            WriteOutcome::Duplicate => &self.duplicates,
        };
        counters[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Freezes the counters into a report
    pub fn report(&self, remaining: usize, elapsed: Duration) -> CrawlReport {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        CrawlReport {
            admitted: load(&self.admitted),
            rejected: load(&self.rejected),
            dispatched: load(&self.dispatched),
            persisted: load(&self.persisted),
            dropped: load(&self.dropped),
            skipped: load(&self.skipped),
            written: RecordCounts {
                bookmarks: load(&self.written[0]),
                aggregates: load(&self.written[1]),
                pages: load(&self.written[2]),
            },
            duplicates: RecordCounts {
                bookmarks: load(&self.duplicates[0]),
                aggregates: load(&self.duplicates[1]),
                pages: load(&self.duplicates[2]),
            },
            remaining,
            elapsed,
        }
    }
}

/// Summary of one crawl run
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    pub admitted: u64,
    pub rejected: u64,
    pub dispatched: u64,
    pub persisted: u64,
    pub dropped: u64,
    pub skipped: u64,

    /// Records newly stored, per kind
    pub written: RecordCounts,

    /// Records already present, per kind
    pub duplicates: RecordCounts,

    /// Requests still in the frontier when the crawl stopped
    pub remaining: usize,

    pub elapsed: Duration,
}

impl CrawlReport {
    /// True when the crawl stopped before exhausting the graph
    pub fn is_partial(&self) -> bool {
        self.remaining > 0
    }
}

/// Prints a crawl report to stdout
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");

    println!("Requests:");
    println!("  Admitted: {}", report.admitted);
    println!("  Rejected as seen: {}", report.rejected);
    println!("  Dispatched: {}", report.dispatched);
    println!("  Persisted: {}", report.persisted);
    println!("  Dropped: {}", report.dropped);
    println!("  Left in frontier: {}", report.remaining);
    println!();

    println!("Records (new / already stored):");
    for kind in RecordKind::ALL {
        println!(
            "  {}: {} / {}",
            kind.as_str(),
            report.written.get(kind),
            report.duplicates.get(kind)
        );
    }
    if report.skipped > 0 {
        println!("  malformed, skipped: {}", report.skipped);
    }
    println!();

    let secs = report.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        report.dispatched as f64 / secs
    } else {
        0.0
    };
    println!("Elapsed: {:.1}s ({:.2} requests/sec)", secs, rate);
}

/// Loads stored record counts from the relational sink
///
/// # Arguments
///
/// * `sink` - The relational sink to query
///
/// # Returns
///
/// * `Ok(RecordCounts)` - Successfully loaded counts
/// * `Err(PinweaveError)` - Failed to query the database
pub fn load_statistics(sink: &SqliteSink) -> Result<RecordCounts, PinweaveError> {
    Ok(sink.record_counts()?)
}

/// Prints stored record counts to stdout
pub fn print_statistics(counts: &RecordCounts) {
    println!("=== Stored Records ===\n");
    for kind in RecordKind::ALL {
        println!("  {}: {}", kind.as_str(), counts.get(kind));
    }
    println!(
        "\n  total: {}",
        counts.bookmarks + counts.aggregates + counts.pages
    );
}
