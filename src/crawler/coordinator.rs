//! Traversal engine - main crawl orchestration logic
//!
//! This module contains the worker loop that drives a crawl:
//! - Seeding the frontier with the starting user's listing
//! - Popping requests and fetching them through the fetch collaborator
//! - Handing payloads to the record parser
//! - Writing records to the sinks and re-admitting derived requests
//! - Stopping when the frontier is exhausted or closed, and reporting
//!
//! Per-request failures (network errors, error statuses, malformed records)
//! are logged and counted. Failures of shared infrastructure (frontier,
//! dedup filter, sinks) stop the worker, close the frontier, and abort the
//! run.

use crate::config::Config;
use crate::crawler::dedup::{DedupKind, SeenSet};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::{ParseContext, RecordParser};
use crate::crawler::request::{FetchRequest, FetchTarget};
use crate::crawler::scheduler::{Frontier, FrontierError};
use crate::output::{CrawlReport, CrawlStats};
use crate::state::RequestState;
use crate::storage::{SinkSet, StorageResult};
use crate::PinweaveError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Opens the sinks for one worker
pub type SinkFactory = Box<dyn Fn() -> StorageResult<SinkSet> + Send + Sync>;

/// Crawl-wide settings the engine needs
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub base_url: String,
    pub seed_user: String,
    pub before: i64,
    pub parse_external_links: bool,
    pub workers: usize,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.site.base_url.trim_end_matches('/').to_string(),
            seed_user: config.seed.user.clone(),
            before: config.seed.before,
            parse_external_links: config.crawler.parse_external_links,
            workers: config.crawler.workers.max(1) as usize,
        }
    }
}

/// State shared by every worker
struct Shared {
    frontier: Arc<Frontier>,
    seen: Arc<dyn SeenSet>,
    fetcher: Arc<dyn Fetcher>,
    parser: RecordParser,
    context: ParseContext,
    stats: Arc<CrawlStats>,
}

impl Shared {
    /// Admits a request if its dedup key is new
    fn admit(&self, request: FetchRequest) -> Result<bool, FrontierError> {
        if let Some((kind, key)) = request.dedup_key() {
            if !self.seen.insert(kind, key)? {
                match kind {
                    DedupKind::User => tracing::info!("User {} already parsed", key),
                    _ => tracing::debug!("Skipping seen {} {}", kind.as_str(), key),
                }
                self.stats.record_rejected();
                return Ok(false);
            }
        }

        self.frontier.push(request)?;
        self.stats.record_admitted();
        Ok(true)
    }

    /// Takes one request through dispatch, parsing and persistence
    ///
    /// # Returns
    ///
    /// * `Ok(RequestState)` - The terminal state the request reached
    /// * `Err(PinweaveError)` - A sink or the frontier failed
    async fn process(
        &self,
        worker: usize,
        request: &FetchRequest,
        sinks: &mut SinkSet,
    ) -> Result<RequestState, PinweaveError> {
        let mut state = RequestState::Admitted;
        advance(&mut state, RequestState::Dispatched, request);
        self.stats.record_dispatched();
        tracing::debug!("Worker {} fetching {} {}", worker, request.kind_label(), request.url());

        let payload = match self.fetcher.fetch(request.url()).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Dropped {} request: {}", request.kind_label(), e);
                advance(&mut state, RequestState::Dropped, request);
                self.stats.record_dropped();
                return Ok(state);
            }
        };

        // External pages are recorded whatever their status
        let keeps_errors = matches!(request.target, FetchTarget::ExternalPage { .. });
        if !payload.is_success() && !keeps_errors {
            tracing::warn!(
                "Dropped {} request {}: HTTP {}",
                request.kind_label(),
                request.url(),
                payload.status_code
            );
            advance(&mut state, RequestState::Dropped, request);
            self.stats.record_dropped();
            return Ok(state);
        }

        let context = ParseContext {
            fetched_at: Utc::now(),
            ..self.context.clone()
        };
        let output = self.parser.parse(request, &payload, &context);
        advance(&mut state, RequestState::Parsed, request);
        self.stats.record_skipped(output.skipped);

        for record in &output.records {
            let outcome = sinks.write(record)?;
            self.stats.record_write(record.kind(), outcome);
        }

        for follow_up in output.requests {
            self.admit(follow_up)?;
        }

        advance(&mut state, RequestState::Persisted, request);
        self.stats.record_persisted();
        Ok(state)
    }
}

fn advance(state: &mut RequestState, next: RequestState, request: &FetchRequest) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal transition {} -> {}",
        state,
        next
    );
    tracing::trace!("{} {}: {} -> {}", request.kind_label(), request.url(), state, next);
    *state = next;
}

/// Drives a crawl over a shared frontier with a pool of workers
pub struct Coordinator {
    settings: CrawlSettings,
    shared: Arc<Shared>,
    sinks: SinkFactory,
}

impl Coordinator {
    /// Creates a coordinator
    ///
    /// # Arguments
    ///
    /// * `settings` - Seed, site and worker settings
    /// * `frontier` - The frontier, possibly holding requests from an earlier run
    /// * `seen` - The dedup filter
    /// * `fetcher` - The fetch collaborator
    /// * `parser` - The record parser
    /// * `sinks` - Opens one set of sinks per worker
    pub fn new(
        settings: CrawlSettings,
        frontier: Arc<Frontier>,
        seen: Arc<dyn SeenSet>,
        fetcher: Arc<dyn Fetcher>,
        parser: RecordParser,
        sinks: SinkFactory,
    ) -> Self {
        let context = ParseContext {
            base_url: settings.base_url.clone(),
            before: settings.before,
            parse_external_links: settings.parse_external_links,
            fetched_at: Utc::now(),
        };

        Self {
            settings,
            shared: Arc::new(Shared {
                frontier,
                seen,
                fetcher,
                parser,
                context,
                stats: Arc::new(CrawlStats::new()),
            }),
            sinks,
        }
    }

    pub fn frontier(&self) -> Arc<Frontier> {
        Arc::clone(&self.shared.frontier)
    }

    pub fn stats(&self) -> Arc<CrawlStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Admits the seed user's first listing page
    ///
    /// Returns false if the seed user was already seen (a finished run being
    /// resumed with a persistent dedup filter).
    pub fn seed(&self) -> Result<bool, PinweaveError> {
        let request = FetchRequest::listing(
            &self.settings.base_url,
            &self.settings.seed_user,
            self.settings.before,
        );
        tracing::info!("Seeding frontier with {}", request.url());
        Ok(self.shared.admit(request)?)
    }

    /// Runs the crawl until the frontier is exhausted or closed
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Every worker stopped normally
    /// * `Err(PinweaveError::Aborted)` - Shared infrastructure failed; carries
    ///   the number of requests left in the frontier
    pub async fn run(&self) -> Result<CrawlReport, PinweaveError> {
        let started = Instant::now();
        let frontier = &self.shared.frontier;

        // Open every worker's sinks up front so a bad sink fails before any
        // request leaves the frontier
        let mut sink_sets = Vec::with_capacity(self.settings.workers);
        for _ in 0..self.settings.workers {
            sink_sets.push((self.sinks)()?);
        }

        tracing::info!(
            "Starting crawl with {} workers, {} requests pending",
            self.settings.workers,
            frontier.len()
        );

        let mut tasks = JoinSet::new();
        for (id, sinks) in sink_sets.into_iter().enumerate() {
            tasks.spawn(run_worker(id, Arc::clone(&self.shared), sinks));
        }

        let mut failure: Option<PinweaveError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(PinweaveError::Worker(e.to_string())));
            if let Err(e) = result {
                frontier.close();
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }

        let remaining = frontier.len();
        if remaining > 0 {
            tracing::warn!(
                "There are {} requests in the frontier that were not parsed",
                remaining
            );
        }

        let report = self.shared.stats.report(remaining, started.elapsed());
        tracing::info!(
            "Crawl stopped: {} requests dispatched, {} persisted, {} dropped in {:?}",
            report.dispatched,
            report.persisted,
            report.dropped,
            report.elapsed
        );

        match failure {
            Some(source) => Err(PinweaveError::Aborted {
                unfinished: remaining,
                source: Box::new(source),
            }),
            None => Ok(report),
        }
    }
}

async fn run_worker(id: usize, shared: Arc<Shared>, mut sinks: SinkSet) -> Result<(), PinweaveError> {
    let result = worker_loop(id, &shared, &mut sinks).await;
    if let Err(e) = &result {
        tracing::error!("Worker {} stopping: {}", id, e);
        shared.frontier.close();
    }
    result
}

async fn worker_loop(id: usize, shared: &Shared, sinks: &mut SinkSet) -> Result<(), PinweaveError> {
    // The lease is held until derived requests are admitted, so the frontier
    // never looks finished while this worker may still add work
    while let Some(lease) = shared.frontier.pop().await? {
        shared.process(id, lease.request(), sinks).await?;
    }

    tracing::debug!("Worker {} finished", id);
    Ok(())
}
