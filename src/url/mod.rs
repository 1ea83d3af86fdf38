//! URL handling module for Pinweave
//!
//! Fragment normalization for stored URLs, plus the handful of URL shapes the
//! bookmarking service exposes: a user's listing page, a slug's aggregate page,
//! and the profile links that name co-savers.

mod normalize;

pub use normalize::{resolve_href, strip_fragment};

/// Builds the listing page URL for a user, bounded by a save-time cursor
///
/// # Examples
///
/// ```
/// use pinweave::url::listing_url;
///
/// assert_eq!(
///     listing_url("https://pinboard.in", "alice", 1700000000),
///     "https://pinboard.in/u:alice/before:1700000000"
/// );
/// ```
pub fn listing_url(base_url: &str, user: &str, before: i64) -> String {
    format!("{}/u:{}/before:{}", base_url.trim_end_matches('/'), user, before)
}

/// Builds the aggregate page URL listing every saver of a slug
pub fn aggregate_url(base_url: &str, slug: &str) -> String {
    format!("{}/url:{}", base_url.trim_end_matches('/'), slug)
}

/// Extracts the slug from an aggregate page URL (`.../url:<slug>`)
pub fn slug_from_aggregate_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("url:")?;
    let slug = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

/// Extracts the username from a saver's profile link (`/u:<name>/t:...`)
pub fn user_from_profile_href(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("/u:")?;
    let (user, _) = rest.split_once("/t:")?;
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}
