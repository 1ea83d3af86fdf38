//! Lifecycle states of a fetch request
//!
//! A request moves `Admitted -> Dispatched -> Parsed -> Persisted`, or ends in
//! `Dropped` when the fetch fails or the payload cannot be used.

use std::fmt;

/// Represents where a fetch request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    // ===== Active States =====
    /// Request passed the dedup filter and sits in the frontier
    Admitted,

    /// A worker popped the request and handed it to the fetcher
    Dispatched,

    /// The record parser returned for this request's payload
    Parsed,

    // ===== Terminal States =====
    /// Derived records were written and derived requests re-admitted
    Persisted,

    /// The fetch failed or returned nothing usable; never retried here
    Dropped,
}

impl RequestState {
    /// Returns true if no further processing happens in this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Persisted | Self::Dropped)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        matches!(
            (self, next),
            (Self::Admitted, Self::Dispatched)
                | (Self::Dispatched, Self::Parsed)
                | (Self::Dispatched, Self::Dropped)
                | (Self::Parsed, Self::Persisted)
                | (Self::Parsed, Self::Dropped)
        )
    }

    /// Label used in log lines and counters
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::Dispatched => "dispatched",
            Self::Parsed => "parsed",
            Self::Persisted => "persisted",
            Self::Dropped => "dropped",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!RequestState::Admitted.is_terminal());
        assert!(!RequestState::Dispatched.is_terminal());
        assert!(!RequestState::Parsed.is_terminal());

        assert!(RequestState::Persisted.is_terminal());
        assert!(RequestState::Dropped.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(RequestState::Admitted.can_transition_to(RequestState::Dispatched));
        assert!(RequestState::Dispatched.can_transition_to(RequestState::Parsed));
        assert!(RequestState::Parsed.can_transition_to(RequestState::Persisted));
    }

    #[test]
    fn test_drop_transitions() {
        assert!(RequestState::Dispatched.can_transition_to(RequestState::Dropped));
        assert!(RequestState::Parsed.can_transition_to(RequestState::Dropped));
        assert!(!RequestState::Admitted.can_transition_to(RequestState::Dropped));
    }

    #[test]
    fn test_terminal_states_have_no_successor() {
        for next in [
            RequestState::Admitted,
            RequestState::Dispatched,
            RequestState::Parsed,
            RequestState::Persisted,
            RequestState::Dropped,
        ] {
            assert!(!RequestState::Persisted.can_transition_to(next));
            assert!(!RequestState::Dropped.can_transition_to(next));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", RequestState::Admitted), "admitted");
        assert_eq!(format!("{}", RequestState::Dropped), "dropped");
    }
}
