use std::time::{Duration, Instant};

/// Tracks the request timing of one domain
///
/// The HTTP fetcher keeps one of these per host so consecutive requests to the
/// same site are spaced by at least the configured delay, no matter which
/// worker issues them.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests made to this domain in the current crawl
    pub request_count: u32,

    /// Start time of the most recently reserved request slot
    pub last_request_time: Option<Instant>,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let ready_at = last + delay;
        if ready_at > now {
            Some(ready_at - now)
        } else {
            None
        }
    }

    /// Claims the next request slot and returns how long to wait for it
    ///
    /// The slot is recorded immediately, so a caller that reserves while
    /// another request is still waiting queues up behind it.
    pub fn reserve(&mut self, delay: Duration, now: Instant) -> Duration {
        let wait = self.time_until_next_request(delay, now).unwrap_or_default();
        self.request_count += 1;
        self.last_request_time = Some(now + wait);
        wait
    }
}
