//! Crawler module: the traversal and deduplication engine
//!
//! This module contains the core crawling logic, including:
//! - Fetch requests and their priorities
//! - The shared frontier and dedup filter
//! - Record parsing and text extraction
//! - The HTTP fetch collaborator
//! - Worker coordination

mod coordinator;
mod dedup;
mod extract;
mod fetcher;
mod parser;
mod request;
mod scheduler;

pub use coordinator::{Coordinator, CrawlSettings, SinkFactory};
pub use dedup::{BloomSeenSet, DedupKind, ExactSeenSet, SeenSet};
pub use extract::{
    html_to_text, ContentRoute, ExtractError, PdfExtract, PdfTextExtractor, UnsupportedPdf,
};
pub use fetcher::{build_http_client, FetchError, FetchedPayload, Fetcher, HttpFetcher};
pub use parser::{ParseContext, ParseError, ParseOutput, RecordParser};
pub use request::{FetchRequest, FetchTarget, Priority};
pub use scheduler::{Frontier, FrontierError, FrontierStore, Lease};

use crate::config::{Config, DedupConfig, DedupStrategy};
use crate::storage::{SinkSet, StateStore};
use crate::PinweaveError;
use std::path::Path;
use std::sync::Arc;

/// Builds the dedup filter selected by the configuration
///
/// # Arguments
///
/// * `config` - The dedup configuration
/// * `state` - The crawl-state store, used by the persistent strategy
pub fn build_seen_set(config: &DedupConfig, state: &Arc<StateStore>) -> Arc<dyn SeenSet> {
    match config.strategy {
        DedupStrategy::Exact => Arc::new(ExactSeenSet::new()),
        DedupStrategy::Bloom => Arc::new(BloomSeenSet::new(
            config.expected_items,
            config.false_positive_rate,
        )),
        DedupStrategy::Persistent => Arc::clone(state) as Arc<dyn SeenSet>,
    }
}

/// Wires a ready-to-run coordinator from configuration
///
/// Opens the crawl-state store, discards its frontier and seen-set when
/// `fresh` is set, and seeds the frontier when nothing is pending. A
/// non-empty stored frontier is resumed instead of re-seeding.
///
/// Resuming needs the keys marked by the interrupted run. An in-memory
/// filter has lost them, so a pending frontier with a non-durable strategy
/// is refused with [`PinweaveError::UnsafeResume`].
///
/// # Returns
///
/// * `Ok(Coordinator)` - Coordinator with a seeded or resumed frontier
/// * `Err(PinweaveError)` - State store, HTTP client or parser setup failed,
///   or the saved frontier cannot be resumed safely
pub fn build_coordinator(config: &Config, fresh: bool) -> Result<Coordinator, PinweaveError> {
    let state = Arc::new(StateStore::open(Path::new(&config.output.state_path))?);
    let seen = build_seen_set(&config.dedup, &state);

    if fresh {
        tracing::info!("Starting fresh crawl (discarding saved frontier and seen-set)");
        state.clear_frontier()?;
        seen.clear()?;
    } else if !config.dedup.strategy.is_durable() {
        let pending = state.frontier_len()?;
        if pending > 0 {
            return Err(PinweaveError::UnsafeResume {
                pending,
                strategy: config.dedup.strategy.as_str(),
            });
        }
    }

    let frontier = Arc::new(Frontier::with_store(state)?);
    let fetcher = Arc::new(HttpFetcher::new(&config.crawler, &config.user_agent)?);
    let parser = RecordParser::new(Arc::new(PdfExtract))?;

    let output = config.output.clone();
    let sinks: SinkFactory = Box::new(move || SinkSet::open(&output));

    let coordinator = Coordinator::new(
        CrawlSettings::from_config(config),
        Arc::clone(&frontier),
        seen,
        fetcher,
        parser,
        sinks,
    );

    if !frontier.is_empty() {
        tracing::info!("Resuming with {} pending requests", frontier.len());
    } else if !coordinator.seed()? {
        tracing::warn!(
            "Seed user {} was already crawled; use --fresh to start over",
            config.seed.user
        );
    }

    Ok(coordinator)
}
