//! Records produced by the crawl
//!
//! Each record kind has a natural key that identifies it permanently:
//! a bookmark by its source-assigned id, an aggregate and an external page by
//! the slug of the target they describe. Sinks store at most one record per
//! natural key.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user's saved link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Source-assigned identity, unique and immutable
    pub bookmark_id: i64,

    /// Saved URL with the fragment stripped
    pub target_url: String,

    /// Content-addressable identifier of the target, shared by all savers
    pub slug: String,

    /// How many users saved this target, as reported by the source
    pub save_count: i64,

    pub title: String,

    /// When the user saved the link
    pub created_at: NaiveDateTime,

    /// When the crawler read the record
    pub fetched_at: DateTime<Utc>,

    pub tags: Vec<String>,

    /// Owning user
    pub author: String,
}

/// Every user who saved a given target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlugAggregate {
    pub slug: String,

    /// The aggregate page itself, fragment stripped
    pub target_url: String,

    /// First external link on the aggregate page, i.e. the saved target
    pub canonical_link: Option<String>,

    /// Savers in first-seen order, without repeats
    pub co_savers: Vec<String>,

    pub co_saver_count: i64,

    /// Tags used by any saver
    pub tags_union: Vec<String>,

    pub fetched_at: DateTime<Utc>,
}

impl SlugAggregate {
    /// Builds an aggregate, collapsing repeated savers
    pub fn new(
        slug: String,
        target_url: String,
        canonical_link: Option<String>,
        savers: Vec<String>,
        tags_union: Vec<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let mut co_savers: Vec<String> = Vec::with_capacity(savers.len());
        for saver in savers {
            if !co_savers.contains(&saver) {
                co_savers.push(saver);
            }
        }

        Self {
            slug,
            target_url,
            canonical_link,
            co_saver_count: co_savers.len() as i64,
            co_savers,
            tags_union,
            fetched_at,
        }
    }
}

/// Resolved text content of a bookmark's target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPage {
    /// Slug of the aggregate this page belongs to
    pub slug: String,

    /// Final URL after redirects, fragment stripped
    pub target_url: String,

    pub fetched_at: DateTime<Utc>,

    /// HTTP status as observed, including non-2xx
    pub status_code: u16,

    /// Extracted plain text; empty when the body was empty or unreadable
    pub content_text: String,

    /// Byte length of `content_text`
    pub content_size: i64,
}

impl ExternalPage {
    pub fn new(
        slug: String,
        target_url: String,
        fetched_at: DateTime<Utc>,
        status_code: u16,
        content_text: String,
    ) -> Self {
        Self {
            slug,
            target_url,
            fetched_at,
            status_code,
            content_size: content_text.len() as i64,
            content_text,
        }
    }
}

/// Any record the parser can emit
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Bookmark(Bookmark),
    SlugAggregate(SlugAggregate),
    ExternalPage(ExternalPage),
}

/// Discriminant of [`Record`], used for counters and sink layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Bookmark,
    SlugAggregate,
    ExternalPage,
}

impl RecordKind {
    /// All record kinds, in the order reports list them
    pub const ALL: [RecordKind; 3] = [Self::Bookmark, Self::SlugAggregate, Self::ExternalPage];

    /// Short name used for file prefixes and log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bookmark => "pin",
            Self::SlugAggregate => "urlslug",
            Self::ExternalPage => "page",
        }
    }
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Bookmark(_) => RecordKind::Bookmark,
            Self::SlugAggregate(_) => RecordKind::SlugAggregate,
            Self::ExternalPage(_) => RecordKind::ExternalPage,
        }
    }

    /// The natural key this record is stored under
    pub fn natural_key(&self) -> String {
        match self {
            Self::Bookmark(b) => b.bookmark_id.to_string(),
            Self::SlugAggregate(a) => a.slug.clone(),
            Self::ExternalPage(p) => p.slug.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_collapses_repeated_savers() {
        let aggregate = SlugAggregate::new(
            "abc".to_string(),
            "https://pinboard.in/url:abc".to_string(),
            None,
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
            vec![],
            Utc::now(),
        );

        assert_eq!(aggregate.co_savers, vec!["a", "b"]);
        assert_eq!(aggregate.co_saver_count, 2);
    }

    #[test]
    fn test_external_page_size_is_byte_length() {
        let page = ExternalPage::new(
            "abc".to_string(),
            "https://example.com/".to_string(),
            Utc::now(),
            200,
            "héllo".to_string(),
        );
        assert_eq!(page.content_size, 6);
    }

    #[test]
    fn test_natural_keys() {
        let page = Record::ExternalPage(ExternalPage::new(
            "s1".to_string(),
            "https://example.com/".to_string(),
            Utc::now(),
            404,
            String::new(),
        ));
        assert_eq!(page.natural_key(), "s1");
        assert_eq!(page.kind(), RecordKind::ExternalPage);
        assert_eq!(page.kind().as_str(), "page");
    }
}
