//! Frontier of pending fetch requests
//!
//! This module handles:
//! - Priority ordering of admitted requests (FIFO within a priority)
//! - Handing requests to workers under an in-flight lease
//! - Detecting crawl completion (empty frontier and nothing in flight)
//! - Mirroring the pending set into a durable store for resumption

use crate::crawler::request::FetchRequest;
use crate::storage::StorageError;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::Notify;

/// Errors raised by the frontier or the dedup filter
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Frontier store error: {0}")]
    Store(#[from] StorageError),

    #[error("Frontier lock poisoned")]
    Poisoned,
}

/// Durable mirror of the frontier
///
/// Every pushed request is appended before it becomes poppable and removed
/// once popped, so after a crash the store holds exactly the requests that
/// were admitted but never handed to a worker.
pub trait FrontierStore: Send + Sync {
    /// Appends a request and returns its sequence number
    fn append(&self, request: &FetchRequest) -> Result<i64, StorageError>;

    /// Removes a popped request
    fn remove(&self, seq: i64) -> Result<(), StorageError>;

    /// Loads all pending requests with their sequence numbers
    fn load(&self) -> Result<Vec<(i64, FetchRequest)>, StorageError>;
}

/// A request waiting in the frontier
#[derive(Debug, Clone)]
struct QueuedRequest {
    /// Admission order, breaks ties within a priority
    seq: i64,
    request: FetchRequest,
}

// BinaryHeap is a max-heap: invert so the lowest priority value, then the
// lowest sequence number, comes out first
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .request
            .priority
            .cmp(&self.request.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

#[derive(Debug, Default)]
struct FrontierInner {
    heap: BinaryHeap<QueuedRequest>,
    next_seq: i64,
    in_flight: usize,
    closed: bool,
}

/// Priority frontier shared by all traversal workers
///
/// `pop` suspends while the frontier is empty but other workers still hold
/// leases, since their results may admit new work. It returns `None` once
/// the frontier is empty with nothing in flight, or after `close`.
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    notify: Notify,
    store: Option<Arc<dyn FrontierStore>>,
}

impl Frontier {
    /// Creates a frontier that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(FrontierInner::default()),
            notify: Notify::new(),
            store: None,
        }
    }

    /// Creates a frontier backed by a durable store
    ///
    /// Requests left in the store by an earlier run are loaded and keep
    /// their original order.
    ///
    /// # Returns
    ///
    /// * `Ok(Frontier)` - Frontier holding the stored requests
    /// * `Err(FrontierError)` - The store could not be read
    pub fn with_store(store: Arc<dyn FrontierStore>) -> Result<Self, FrontierError> {
        let pending = store.load()?;
        let next_seq = pending.iter().map(|(seq, _)| seq + 1).max().unwrap_or(0);

        if !pending.is_empty() {
            tracing::info!("Loaded {} pending requests from frontier store", pending.len());
        }

        let heap = pending
            .into_iter()
            .map(|(seq, request)| QueuedRequest { seq, request })
            .collect();

        Ok(Self {
            inner: Mutex::new(FrontierInner {
                heap,
                next_seq,
                in_flight: 0,
                closed: false,
            }),
            notify: Notify::new(),
            store: Some(store),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, FrontierInner>, FrontierError> {
        self.inner.lock().map_err(|_| FrontierError::Poisoned)
    }

    /// Adds an admitted request
    ///
    /// Pushes after `close` are still recorded (and persisted) so a resumed
    /// run picks them up, but they are never popped by this run.
    pub fn push(&self, request: FetchRequest) -> Result<(), FrontierError> {
        {
            let mut inner = self.lock()?;
            let seq = match &self.store {
                Some(store) => store.append(&request)?,
                None => inner.next_seq,
            };
            inner.next_seq = inner.next_seq.max(seq + 1);

            tracing::trace!("Queued {} (seq {})", request.url(), seq);
            inner.heap.push(QueuedRequest { seq, request });
        }

        self.notify.notify_waiters();
        Ok(())
    }

    /// Takes the highest priority request, waiting for work if needed
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Lease))` - A request to process; dropping the lease marks it finished
    /// * `Ok(None)` - The crawl is complete or the frontier was closed
    /// * `Err(FrontierError)` - The store failed or the lock was poisoned
    pub async fn pop(self: &Arc<Self>) -> Result<Option<Lease>, FrontierError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a push or finish between
            // the check and the await still wakes us
            notified.as_mut().enable();

            {
                let mut inner = self.lock()?;

                if inner.closed {
                    return Ok(None);
                }

                if let Some(queued) = inner.heap.pop() {
                    if let Some(store) = &self.store {
                        if let Err(e) = store.remove(queued.seq) {
                            inner.heap.push(queued);
                            return Err(e.into());
                        }
                    }

                    inner.in_flight += 1;
                    return Ok(Some(Lease {
                        frontier: Arc::clone(self),
                        request: queued.request,
                    }));
                }

                if inner.in_flight == 0 {
                    drop(inner);
                    // Let the other idle workers observe completion too
                    self.notify.notify_waiters();
                    return Ok(None);
                }
            }

            notified.await;
        }
    }

    fn finish(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// Stops handing out requests; pending ones stay stored
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|inner| inner.closed).unwrap_or(true)
    }

    /// Number of requests waiting to be popped
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.heap.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of requests currently held by workers
    pub fn in_flight(&self) -> usize {
        self.inner.lock().map(|inner| inner.in_flight).unwrap_or(0)
    }
}

/// A popped request held by a worker
///
/// The frontier counts the request as in flight until the lease is dropped.
pub struct Lease {
    frontier: Arc<Frontier>,
    request: FetchRequest,
}

impl Lease {
    pub fn request(&self) -> &FetchRequest {
        &self.request
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.frontier.finish();
    }
}
