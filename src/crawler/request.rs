//! Fetch requests: the unit of traversal work
//!
//! A request names what to fetch and carries the context its parser needs
//! (the user a listing belongs to, the slug an external page is a child of).
//! Its priority is fixed by the kind of target.

use crate::crawler::dedup::DedupKind;
use crate::url::{aggregate_url, listing_url};
use serde::{Deserialize, Serialize};

/// Scheduling priority; lower values are popped first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// User listings and their pagination
    Listing = 0,
    /// Slug aggregate pages
    Aggregate = 1,
    /// External target pages
    External = 2,
}

impl Priority {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }
}

/// What a request fetches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchTarget {
    /// A page of one user's bookmarks
    UserListing {
        user: String,
        url: String,
        /// True for "earlier page" follow-ups of an already admitted user
        continuation: bool,
    },

    /// The page enumerating every saver of a slug
    SlugAggregate { slug: String, url: String },

    /// A bookmark's target, resolved to text
    ExternalPage { slug: String, url: String },
}

/// A unit of traversal work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub target: FetchTarget,
    pub priority: Priority,
}

impl FetchRequest {
    /// First listing page of a user, bounded by the crawl's cursor
    pub fn listing(base_url: &str, user: &str, before: i64) -> Self {
        Self {
            target: FetchTarget::UserListing {
                user: user.to_string(),
                url: listing_url(base_url, user, before),
                continuation: false,
            },
            priority: Priority::Listing,
        }
    }

    /// An earlier listing page reached through pagination
    pub fn continuation(user: &str, url: String) -> Self {
        Self {
            target: FetchTarget::UserListing {
                user: user.to_string(),
                url,
                continuation: true,
            },
            priority: Priority::Listing,
        }
    }

    pub fn aggregate(base_url: &str, slug: &str) -> Self {
        Self {
            target: FetchTarget::SlugAggregate {
                slug: slug.to_string(),
                url: aggregate_url(base_url, slug),
            },
            priority: Priority::Aggregate,
        }
    }

    pub fn external(url: &str, slug: &str) -> Self {
        Self {
            target: FetchTarget::ExternalPage {
                slug: slug.to_string(),
                url: url.to_string(),
            },
            priority: Priority::External,
        }
    }

    pub fn url(&self) -> &str {
        match &self.target {
            FetchTarget::UserListing { url, .. }
            | FetchTarget::SlugAggregate { url, .. }
            | FetchTarget::ExternalPage { url, .. } => url,
        }
    }

    /// Key checked against the dedup filter before admission
    ///
    /// Pagination follow-ups have none: their user was checked when the
    /// first page was admitted.
    pub fn dedup_key(&self) -> Option<(DedupKind, &str)> {
        match &self.target {
            FetchTarget::UserListing {
                continuation: true, ..
            } => None,
            FetchTarget::UserListing { user, .. } => Some((DedupKind::User, user.as_str())),
            FetchTarget::SlugAggregate { slug, .. } => Some((DedupKind::Slug, slug.as_str())),
            FetchTarget::ExternalPage { slug, .. } => Some((DedupKind::Page, slug.as_str())),
        }
    }

    /// Short label for logs
    pub fn kind_label(&self) -> &'static str {
        match &self.target {
            FetchTarget::UserListing { .. } => "listing",
            FetchTarget::SlugAggregate { .. } => "aggregate",
            FetchTarget::ExternalPage { .. } => "external",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_follow_target_kind() {
        assert_eq!(
            FetchRequest::listing("https://pinboard.in", "alice", 1).priority,
            Priority::Listing
        );
        assert_eq!(
            FetchRequest::aggregate("https://pinboard.in", "abc").priority,
            Priority::Aggregate
        );
        assert_eq!(
            FetchRequest::external("https://example.com/", "abc").priority,
            Priority::External
        );
        assert!(Priority::Listing < Priority::Aggregate);
        assert!(Priority::Aggregate < Priority::External);
    }

    #[test]
    fn test_dedup_keys() {
        let listing = FetchRequest::listing("https://pinboard.in", "alice", 1);
        assert_eq!(listing.dedup_key(), Some((DedupKind::User, "alice")));

        let earlier = FetchRequest::continuation("alice", "https://pinboard.in/u:alice/before:5".into());
        assert_eq!(earlier.dedup_key(), None);

        let page = FetchRequest::external("https://example.com/", "abc");
        assert_eq!(page.dedup_key(), Some((DedupKind::Page, "abc")));
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let request = FetchRequest::aggregate("https://pinboard.in", "abc");
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""kind":"slug_aggregate""#));

        let back: FetchRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
