use serde::Deserialize;

/// Largest save time the source accepts as a "before" cursor (seconds).
///
/// Seeding with this value lists a user's bookmarks from the newest one.
pub const DEFAULT_BEFORE_CURSOR: i64 = 315_537_897_599;

/// Main configuration structure for Pinweave
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of traversal workers sharing the frontier
    pub workers: u32,

    /// Maximum number of HTTP requests in flight at once
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Minimum time between requests to the same domain (milliseconds)
    #[serde(rename = "domain-delay-ms")]
    pub domain_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Whether bookmark targets are fetched and reduced to plain text
    #[serde(rename = "parse-external-links", default)]
    pub parse_external_links: bool,
}

fn default_request_timeout() -> u64 {
    15
}

/// The user and cursor the crawl starts from
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Username whose listing seeds the traversal
    #[serde(default = "default_seed_user")]
    pub user: String,

    /// Upper bound on bookmark save time, carried to every discovered user
    #[serde(default = "default_before")]
    pub before: i64,
}

fn default_seed_user() -> String {
    "notiv".to_string()
}

fn default_before() -> i64 {
    DEFAULT_BEFORE_CURSOR
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            user: default_seed_user(),
            before: default_before(),
        }
    }
}

/// Location of the bookmarking service
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://pinboard.in".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Which membership structure backs the dedup filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupStrategy {
    /// In-memory hash set, exact answers
    Exact,
    /// In-memory bloom filter, bounded memory with false positives
    Bloom,
    /// Stored in the crawl-state database, survives restarts
    Persistent,
}

impl DedupStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Bloom => "bloom",
            Self::Persistent => "persistent",
        }
    }

    /// Whether marked keys outlive the process
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Persistent)
    }
}

/// Dedup filter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_strategy")]
    pub strategy: DedupStrategy,

    /// Number of keys the bloom filter is sized for
    #[serde(rename = "expected-items", default = "default_expected_items")]
    pub expected_items: u64,

    /// Target false-positive rate of the bloom filter
    #[serde(rename = "false-positive-rate", default = "default_fp_rate")]
    pub false_positive_rate: f64,
}

fn default_strategy() -> DedupStrategy {
    DedupStrategy::Persistent
}

fn default_expected_items() -> u64 {
    1_000_000
}

fn default_fp_rate() -> f64 {
    0.001
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            expected_items: default_expected_items(),
            false_positive_rate: default_fp_rate(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// SQLite file holding the persisted frontier and seen-set
    #[serde(rename = "state-path")]
    pub state_path: String,

    /// Root directory of the JSON-lines sink (disabled when absent)
    #[serde(rename = "json-dir", default)]
    pub json_dir: Option<String>,

    /// Path to the relational sink database (disabled when absent)
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,
}
