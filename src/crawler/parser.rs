//! Record parser: fetched payloads into records and follow-up requests
//!
//! This module handles three payload kinds:
//! - User listings: embedded bookmark literals plus the "earlier page" link
//! - Slug aggregates: canonical link, tag cloud and the list of co-savers
//! - External pages: plain text of the bookmarked target
//!
//! Parsing is pure. The parser does not consult the dedup filter; it emits
//! every candidate request and the traversal engine decides admission.

use crate::crawler::extract::{html_to_text, ContentRoute, PdfTextExtractor};
use crate::crawler::fetcher::FetchedPayload;
use crate::crawler::request::{FetchRequest, FetchTarget};
use crate::model::{Bookmark, ExternalPage, Record, SlugAggregate};
use crate::url::{
    resolve_href, slug_from_aggregate_url, strip_fragment, user_from_profile_href,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

const BOOKMARK_LITERAL_PATTERN: &str = r"(?s)bmarks\[\d+\] = (\{.*?\});";
const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised while building the parser or decoding one record
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid selector {0}")]
    Selector(String),

    #[error("Malformed bookmark literal: {0}")]
    Literal(#[from] serde_json::Error),

    #[error("Invalid created timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Crawl-wide inputs the parser needs besides the payload
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Site root used to build listing and aggregate URLs
    pub base_url: String,

    /// Cursor the crawl was seeded with; co-saver listings reuse it
    pub before: i64,

    /// Whether to emit external-page requests for bookmarks
    pub parse_external_links: bool,

    /// Timestamp stamped on every record from this payload
    pub fetched_at: DateTime<Utc>,
}

/// Records and follow-up requests derived from one payload
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub records: Vec<Record>,
    pub requests: Vec<FetchRequest>,

    /// Malformed records that were skipped
    pub skipped: usize,
}

/// Turns fetched payloads into records and follow-up requests
pub struct RecordParser {
    bookmark_literal: Regex,
    earlier_link: Selector,
    any_link: Selector,
    cloud_tag: Selector,
    saver_entry: Selector,
    pdf: Arc<dyn PdfTextExtractor>,
}

impl RecordParser {
    /// Creates a parser using the given PDF backend
    ///
    /// # Returns
    ///
    /// * `Ok(RecordParser)` - Parser ready for use
    /// * `Err(ParseError)` - A built-in pattern or selector failed to compile
    pub fn new(pdf: Arc<dyn PdfTextExtractor>) -> Result<Self, ParseError> {
        Ok(Self {
            bookmark_literal: Regex::new(BOOKMARK_LITERAL_PATTERN)?,
            earlier_link: selector("a#top_earlier[href]")?,
            any_link: selector("a[href]")?,
            cloud_tag: selector("div#tag_cloud .tag")?,
            saver_entry: selector("div.bookmark")?,
            pdf,
        })
    }

    /// Parses a payload according to the request that fetched it
    pub fn parse(
        &self,
        request: &FetchRequest,
        payload: &FetchedPayload,
        context: &ParseContext,
    ) -> ParseOutput {
        match &request.target {
            FetchTarget::UserListing { user, .. } => {
                self.parse_listing(&payload.text(), &payload.final_url, user, context)
            }
            FetchTarget::SlugAggregate { slug, .. } => {
                self.parse_aggregate(&payload.text(), &payload.final_url, slug, context)
            }
            FetchTarget::ExternalPage { slug, .. } => self.parse_external(payload, slug, context),
        }
    }

    /// Parses one page of a user's bookmarks
    ///
    /// Every bookmark yields a Bookmark record and an aggregate request for
    /// its slug, plus an external request when external resolution is on.
    /// A present "earlier page" link yields one continuation request.
    pub fn parse_listing(
        &self,
        body: &str,
        page_url: &str,
        user: &str,
        context: &ParseContext,
    ) -> ParseOutput {
        let mut output = ParseOutput::default();

        for captures in self.bookmark_literal.captures_iter(body) {
            let literal = &captures[1];
            let bookmark = match decode_bookmark(literal, user, context.fetched_at) {
                Ok(bookmark) => bookmark,
                Err(e) => {
                    tracing::warn!("Skipping bookmark on {}: {}", page_url, e);
                    output.skipped += 1;
                    continue;
                }
            };

            output
                .requests
                .push(FetchRequest::aggregate(&context.base_url, &bookmark.slug));

            if context.parse_external_links {
                output
                    .requests
                    .push(FetchRequest::external(&bookmark.target_url, &bookmark.slug));
            }

            output.records.push(Record::Bookmark(bookmark));
        }

        let document = Html::parse_document(body);
        let earlier = document
            .select(&self.earlier_link)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| resolve_href(page_url, href));

        if let Some(earlier_url) = earlier {
            if strip_fragment(&earlier_url) == strip_fragment(page_url) {
                tracing::warn!("Earlier-page link on {} points back to itself", page_url);
            } else {
                tracing::info!("Fetching previous page: {}", earlier_url);
                output
                    .requests
                    .push(FetchRequest::continuation(user, earlier_url));
            }
        }

        tracing::debug!(
            "Listing {} for {}: {} bookmarks, {} skipped",
            page_url,
            user,
            output.records.len(),
            output.skipped
        );

        output
    }

    /// Parses the page enumerating every saver of a slug
    ///
    /// An empty body yields nothing, and so does a page whose URL does not
    /// name `slug` (a redirect away from the aggregate). Otherwise one
    /// SlugAggregate is emitted together with a listing request for each
    /// co-saver.
    pub fn parse_aggregate(
        &self,
        body: &str,
        page_url: &str,
        slug: &str,
        context: &ParseContext,
    ) -> ParseOutput {
        let mut output = ParseOutput::default();

        if body.trim().is_empty() {
            tracing::info!("Empty aggregate page for slug {}", slug);
            return output;
        }

        let page_slug = slug_from_aggregate_url(page_url);
        if page_slug.as_deref() != Some(slug) {
            tracing::warn!(
                "Aggregate request for slug {} landed on {}; skipping",
                slug,
                page_url
            );
            output.skipped += 1;
            return output;
        }

        let document = Html::parse_document(body);

        let canonical_link = document
            .select(&self.any_link)
            .filter_map(|el| el.value().attr("href"))
            .find(|href| href.starts_with("http://") || href.starts_with("https://"))
            .map(str::to_string);

        if canonical_link.is_none() {
            tracing::warn!("No outbound link on aggregate page {}", page_url);
        }

        let tags_union: Vec<String> = document
            .select(&self.cloud_tag)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();

        let savers: Vec<String> = document
            .select(&self.saver_entry)
            .filter_map(|entry| {
                entry
                    .select(&self.any_link)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(user_from_profile_href)
            })
            .collect();

        let aggregate = SlugAggregate::new(
            slug.to_string(),
            strip_fragment(page_url),
            canonical_link,
            savers,
            tags_union,
            context.fetched_at,
        );

        for saver in &aggregate.co_savers {
            output
                .requests
                .push(FetchRequest::listing(&context.base_url, saver, context.before));
        }

        tracing::debug!(
            "Aggregate {}: {} co-savers, {} tags",
            slug,
            aggregate.co_saver_count,
            aggregate.tags_union.len()
        );

        output.records.push(Record::SlugAggregate(aggregate));
        output
    }

    /// Resolves an external page into text
    ///
    /// Always yields exactly one ExternalPage, with empty content when the
    /// body is empty or cannot be read.
    pub fn parse_external(
        &self,
        payload: &FetchedPayload,
        slug: &str,
        context: &ParseContext,
    ) -> ParseOutput {
        let target_url = strip_fragment(&payload.final_url);

        let content_text = if payload.body.is_empty() {
            tracing::info!("No response body for {}", target_url);
            String::new()
        } else {
            match ContentRoute::for_url(&target_url) {
                ContentRoute::Pdf => match self.pdf.extract_text(&payload.body) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Could not extract PDF text from {}: {}", target_url, e);
                        String::new()
                    }
                },
                ContentRoute::Html => html_to_text(&payload.text()),
            }
        };

        let page = ExternalPage::new(
            slug.to_string(),
            target_url,
            context.fetched_at,
            payload.status_code,
            content_text,
        );

        ParseOutput {
            records: vec![Record::ExternalPage(page)],
            ..ParseOutput::default()
        }
    }
}

fn selector(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector(format!("{}: {:?}", css, e)))
}

/// Bookmark literal as embedded in listing pages
#[derive(Debug, Deserialize)]
struct RawBookmark {
    #[serde(deserialize_with = "flexible_int")]
    id: i64,
    url: String,
    url_slug: String,
    #[serde(default, deserialize_with = "flexible_int")]
    url_count: i64,
    #[serde(default)]
    title: Option<String>,
    created: String,
    #[serde(default)]
    tags: Option<RawTags>,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<String>),
    Spaced(String),
}

impl RawTags {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(tags) => tags,
            Self::Spaced(tags) => tags.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Accepts an integer given as a JSON number or a numeric string
fn flexible_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(n) => Ok(n),
        IntOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn decode_bookmark(
    literal: &str,
    listing_user: &str,
    fetched_at: DateTime<Utc>,
) -> Result<Bookmark, ParseError> {
    let raw: RawBookmark = serde_json::from_str(literal)?;

    let created_at = NaiveDateTime::parse_from_str(&raw.created, CREATED_FORMAT).map_err(|e| {
        ParseError::Timestamp {
            value: raw.created.clone(),
            source: e,
        }
    })?;

    Ok(Bookmark {
        bookmark_id: raw.id,
        target_url: strip_fragment(&raw.url),
        slug: raw.url_slug,
        save_count: raw.url_count,
        title: raw.title.unwrap_or_default(),
        created_at,
        fetched_at,
        tags: raw.tags.map(RawTags::into_vec).unwrap_or_default(),
        author: raw
            .author
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| listing_user.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::extract::{ExtractError, PdfExtract, UnsupportedPdf};
    use crate::crawler::request::Priority;

    const BASE: &str = "https://pinboard.in";

    fn parser() -> RecordParser {
        RecordParser::new(Arc::new(UnsupportedPdf)).unwrap()
    }

    fn context(parse_external_links: bool) -> ParseContext {
        ParseContext {
            base_url: BASE.to_string(),
            before: 1700000000,
            parse_external_links,
            fetched_at: Utc::now(),
        }
    }

    fn listing_page(literals: &[&str], earlier: Option<&str>) -> String {
        let mut script = String::from("<script>\nvar bmarks = [];\n");
        for (i, literal) in literals.iter().enumerate() {
            script.push_str(&format!("bmarks[{}] = {};\n", i, literal));
        }
        script.push_str("</script>");

        let nav = earlier
            .map(|href| format!(r#"<a id="top_earlier" href="{}">earlier</a>"#, href))
            .unwrap_or_default();

        format!("<html><body>{}{}</body></html>", script, nav)
    }

    const ALICE_ONE: &str = r#"{"id":"1","url":"https://example.com/a#intro","url_slug":"abc","url_count":"3","title":"A","created":"2023-11-01 10:00:00","tags":["rust","web"],"author":"alice"}"#;
    const ALICE_TWO: &str = r#"{"id":2,"url":"https://example.org/b","url_slug":"def","url_count":1,"title":"B","created":"2023-10-01 09:30:00","tags":[],"author":"alice"}"#;

    fn bookmarks(output: &ParseOutput) -> Vec<&Bookmark> {
        output
            .records
            .iter()
            .filter_map(|r| match r {
                Record::Bookmark(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_listing_without_earlier_link() {
        let body = listing_page(&[ALICE_ONE, ALICE_TWO], None);
        let output = parser().parse_listing(
            &body,
            "https://pinboard.in/u:alice/before:1700000000",
            "alice",
            &context(false),
        );

        let ids: Vec<i64> = bookmarks(&output).iter().map(|b| b.bookmark_id).collect();
        assert_eq!(ids, vec![1, 2]);

        let aggregates: Vec<&str> = output
            .requests
            .iter()
            .filter(|r| r.priority == Priority::Aggregate)
            .map(|r| r.url())
            .collect();
        assert_eq!(
            aggregates,
            vec!["https://pinboard.in/url:abc", "https://pinboard.in/url:def"]
        );
        assert!(output.requests.iter().all(|r| r.priority != Priority::Listing));
    }

    #[test]
    fn test_bookmark_fields_are_decoded() {
        let body = listing_page(&[ALICE_ONE], None);
        let output = parser().parse_listing(&body, "https://pinboard.in/u:alice", "alice", &context(false));

        let bookmark = bookmarks(&output)[0];
        assert_eq!(bookmark.target_url, "https://example.com/a");
        assert_eq!(bookmark.slug, "abc");
        assert_eq!(bookmark.save_count, 3);
        assert_eq!(bookmark.tags, vec!["rust", "web"]);
        assert_eq!(bookmark.author, "alice");
        assert_eq!(
            bookmark.created_at.format(CREATED_FORMAT).to_string(),
            "2023-11-01 10:00:00"
        );
    }

    #[test]
    fn test_earlier_link_yields_one_continuation() {
        let body = listing_page(&[ALICE_ONE], Some("/u:alice/before:1690000000"));
        let output = parser().parse_listing(
            &body,
            "https://pinboard.in/u:alice/before:1700000000",
            "alice",
            &context(false),
        );

        let continuations: Vec<&FetchRequest> = output
            .requests
            .iter()
            .filter(|r| r.priority == Priority::Listing)
            .collect();
        assert_eq!(continuations.len(), 1);
        assert_eq!(
            continuations[0].url(),
            "https://pinboard.in/u:alice/before:1690000000"
        );
        assert_eq!(continuations[0].dedup_key(), None);
    }

    #[test]
    fn test_malformed_literal_is_skipped() {
        let broken = r#"{"id": 3, "url": "https://x.org/", "url_slug": "ghi", "created": "yesterday"}"#;
        let body = listing_page(&[ALICE_ONE, broken, ALICE_TWO], None);
        let output = parser().parse_listing(&body, "https://pinboard.in/u:alice", "alice", &context(false));

        assert_eq!(bookmarks(&output).len(), 2);
        assert_eq!(output.skipped, 1);
    }

    #[test]
    fn test_missing_title_and_tags_default() {
        let literal = r#"{"id":9,"url":"https://x.org/","url_slug":"s9","url_count":1,"title":null,"created":"2020-01-01 00:00:00"}"#;
        let body = listing_page(&[literal], None);
        let output = parser().parse_listing(&body, "https://pinboard.in/u:bob", "bob", &context(false));

        let bookmark = bookmarks(&output)[0];
        assert_eq!(bookmark.title, "");
        assert!(bookmark.tags.is_empty());
        assert_eq!(bookmark.author, "bob");
    }

    #[test]
    fn test_external_requests_only_when_enabled() {
        let body = listing_page(&[ALICE_ONE], None);

        let off = parser().parse_listing(&body, "https://pinboard.in/u:alice", "alice", &context(false));
        assert!(off.requests.iter().all(|r| r.priority != Priority::External));

        let on = parser().parse_listing(&body, "https://pinboard.in/u:alice", "alice", &context(true));
        let external: Vec<&FetchRequest> = on
            .requests
            .iter()
            .filter(|r| r.priority == Priority::External)
            .collect();
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].url(), "https://example.com/a");
        assert!(matches!(
            &external[0].target,
            FetchTarget::ExternalPage { slug, .. } if slug == "abc"
        ));
    }

    const AGGREGATE_PAGE: &str = r##"<html><body>
<a href="/">home</a>
<a href="https://example.com/a">Example A</a>
<div id="tag_cloud"><a class="tag" href="/t:rust">rust</a> <a class="tag" href="/t:web">web</a></div>
<div class="bookmark"><a href="/u:carol/t:rust/">carol</a></div>
<div class="bookmark"><a href="/u:dave/t:web/">dave</a></div>
<div class="bookmark"><a href="/u:carol/t:web/">carol</a></div>
<div class="bookmark"><span>no link</span></div>
</body></html>"##;

    #[test]
    fn test_aggregate_page() {
        let output = parser().parse_aggregate(
            AGGREGATE_PAGE,
            "https://pinboard.in/url:abc#savers",
            "abc",
            &context(false),
        );

        let Record::SlugAggregate(aggregate) = &output.records[0] else {
            panic!("expected aggregate");
        };
        assert_eq!(aggregate.slug, "abc");
        assert_eq!(aggregate.target_url, "https://pinboard.in/url:abc");
        assert_eq!(aggregate.canonical_link.as_deref(), Some("https://example.com/a"));
        assert_eq!(aggregate.tags_union, vec!["rust", "web"]);
        assert_eq!(aggregate.co_savers, vec!["carol", "dave"]);
        assert_eq!(aggregate.co_saver_count, 2);

        let listings: Vec<&str> = output.requests.iter().map(|r| r.url()).collect();
        assert_eq!(
            listings,
            vec![
                "https://pinboard.in/u:carol/before:1700000000",
                "https://pinboard.in/u:dave/before:1700000000",
            ]
        );
    }

    #[test]
    fn test_empty_aggregate_yields_nothing() {
        let output = parser().parse_aggregate("", "https://pinboard.in/url:abc", "abc", &context(false));
        assert!(output.records.is_empty());
        assert!(output.requests.is_empty());
    }

    #[test]
    fn test_aggregate_redirected_elsewhere_is_skipped() {
        let other = parser().parse_aggregate(
            AGGREGATE_PAGE,
            "https://pinboard.in/url:xyz",
            "abc",
            &context(false),
        );
        assert!(other.records.is_empty());
        assert!(other.requests.is_empty());
        assert_eq!(other.skipped, 1);

        let login = parser().parse_aggregate(
            AGGREGATE_PAGE,
            "https://pinboard.in/login/",
            "abc",
            &context(false),
        );
        assert!(login.records.is_empty());
        assert_eq!(login.skipped, 1);

        // A trailing slash still names the requested slug
        let same = parser().parse_aggregate(
            AGGREGATE_PAGE,
            "https://pinboard.in/url:abc/",
            "abc",
            &context(false),
        );
        assert_eq!(same.records.len(), 1);
    }

    #[test]
    fn test_aggregate_without_tag_cloud() {
        let body = r#"<div class="bookmark"><a href="/u:erin/t:x/">erin</a></div>"#;
        let output = parser().parse_aggregate(body, "https://pinboard.in/url:s", "s", &context(false));

        let Record::SlugAggregate(aggregate) = &output.records[0] else {
            panic!("expected aggregate");
        };
        assert!(aggregate.tags_union.is_empty());
        assert!(aggregate.canonical_link.is_none());
        assert_eq!(aggregate.co_savers, vec!["erin"]);
    }

    fn payload(url: &str, status_code: u16, body: &[u8]) -> FetchedPayload {
        FetchedPayload {
            final_url: url.to_string(),
            status_code,
            body: body.to_vec(),
        }
    }

    fn external_page(output: &ParseOutput) -> &ExternalPage {
        match &output.records[0] {
            Record::ExternalPage(page) => page,
            other => panic!("expected external page, got {:?}", other),
        }
    }

    #[test]
    fn test_external_html_page() {
        let output = parser().parse_external(
            &payload("https://x.org/post#c", 200, b"<p>Hello</p><script>x()</script>"),
            "abc",
            &context(true),
        );

        let page = external_page(&output);
        assert_eq!(page.target_url, "https://x.org/post");
        assert_eq!(page.content_text, "Hello");
        assert_eq!(page.content_size, 5);
        assert!(output.requests.is_empty());
    }

    #[test]
    fn test_external_empty_body_keeps_status() {
        let output = parser().parse_external(&payload("https://x.org/gone", 404, b""), "abc", &context(true));

        let page = external_page(&output);
        assert_eq!(page.status_code, 404);
        assert_eq!(page.content_text, "");
        assert_eq!(page.content_size, 0);
    }

    struct FixedPdf;

    impl PdfTextExtractor for FixedPdf {
        fn extract_text(&self, _bytes: &[u8]) -> Result<String, ExtractError> {
            Ok("pdf text".to_string())
        }
    }

    #[test]
    fn test_pdf_goes_to_pdf_extractor() {
        let parser = RecordParser::new(Arc::new(FixedPdf)).unwrap();

        let pdf = parser.parse_external(&payload("https://x.org/paper.pdf", 200, b"%PDF"), "p", &context(true));
        assert_eq!(external_page(&pdf).content_text, "pdf text");

        let html = parser.parse_external(
            &payload("https://x.org/paper?format=pdf", 200, b"<p>page</p>"),
            "p",
            &context(true),
        );
        assert_eq!(external_page(&html).content_text, "page");
    }

    #[test]
    fn test_unsupported_pdf_yields_empty_content() {
        let output = parser().parse_external(&payload("https://x.org/paper.pdf", 200, b"%PDF"), "p", &context(true));
        let page = external_page(&output);
        assert_eq!(page.status_code, 200);
        assert_eq!(page.content_text, "");
    }

    #[test]
    fn test_malformed_pdf_yields_empty_content() {
        let parser = RecordParser::new(Arc::new(PdfExtract)).unwrap();
        let output = parser.parse_external(
            &payload("https://x.org/paper.pdf", 200, b"%PDF-1.4 fake"),
            "p",
            &context(true),
        );

        assert_eq!(output.records.len(), 1);
        assert_eq!(external_page(&output).content_text, "");
    }

    #[test]
    fn test_flexible_int_accepts_strings_and_numbers() {
        let a: RawBookmark = serde_json::from_str(
            r#"{"id":"17","url":"u","url_slug":"s","url_count":" 4 ","created":"2020-01-01 00:00:00"}"#,
        )
        .unwrap();
        assert_eq!(a.id, 17);
        assert_eq!(a.url_count, 4);

        let bad = serde_json::from_str::<RawBookmark>(
            r#"{"id":"x","url":"u","url_slug":"s","created":"2020-01-01 00:00:00"}"#,
        );
        assert!(bad.is_err());
    }
}
