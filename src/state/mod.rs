//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RequestState`: Lifecycle of a single fetch request
//! - `DomainState`: Per-domain request timing used by the HTTP fetcher

mod domain_state;
mod request_state;

// Re-export main types
pub use domain_state::DomainState;
pub use request_state::RequestState;
