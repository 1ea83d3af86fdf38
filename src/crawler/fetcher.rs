//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent and timeout
//! - Capping concurrent requests across all workers
//! - Spacing requests to the same host by a minimum delay
//! - Classifying transport failures
//!
//! Redirects are followed by the client; the payload carries the final URL.
//! Failed requests are not retried.

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::state::DomainState;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;

/// A completed HTTP exchange, whatever its status
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    /// Final URL after redirects
    pub final_url: String,

    /// HTTP status code
    pub status_code: u16,

    /// Raw response body
    pub body: Vec<u8>,
}

impl FetchedPayload {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Body decoded as UTF-8, with invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level fetch failures (no response was obtained)
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Request failed for {url}: {message}")]
    Request { url: String, message: String },
}

impl FetchError {
    fn classify(url: &str, error: reqwest::Error) -> Self {
        let url = url.to_string();
        if error.is_timeout() {
            Self::Timeout { url }
        } else if error.is_connect() {
            Self::Connect {
                url,
                message: error.to_string(),
            }
        } else {
            Self::Request {
                url,
                message: error.to_string(),
            }
        }
    }
}

/// Source of fetched payloads
///
/// The traversal engine only talks to this trait, so tests can serve canned
/// pages without a network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `timeout` - Total time allowed for one request
///
/// # Example
///
/// ```no_run
/// use pinweave::config::UserAgentConfig;
/// use pinweave::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "Pinweave".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(15)).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher backed by reqwest
///
/// At most `max_concurrent_requests` requests are on the wire at once, and
/// consecutive requests to one host start at least `domain_delay_ms` apart.
pub struct HttpFetcher {
    client: Client,
    permits: Semaphore,
    domain_delay: Duration,
    domains: Mutex<HashMap<String, DomainState>>,
}

impl HttpFetcher {
    pub fn new(crawler: &CrawlerConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(
            user_agent,
            Duration::from_secs(crawler.request_timeout_secs),
        )?;
        Ok(Self::with_client(client, crawler))
    }

    pub fn with_client(client: Client, crawler: &CrawlerConfig) -> Self {
        Self {
            client,
            permits: Semaphore::new(crawler.max_concurrent_requests.max(1) as usize),
            domain_delay: Duration::from_millis(crawler.domain_delay_ms),
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves the next request slot for the URL's host
    fn reserve_slot(&self, url: &str) -> Duration {
        if self.domain_delay.is_zero() {
            return Duration::ZERO;
        }

        let host = match url::Url::parse(url) {
            Ok(parsed) => parsed.host_str().unwrap_or_default().to_string(),
            Err(_) => return Duration::ZERO,
        };

        match self.domains.lock() {
            Ok(mut domains) => domains
                .entry(host)
                .or_default()
                .reserve(self.domain_delay, Instant::now()),
            Err(_) => Duration::ZERO,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
        let wait = self.reserve_slot(url);
        if !wait.is_zero() {
            tracing::trace!("Waiting {:?} before requesting {}", wait, url);
            tokio::time::sleep(wait).await;
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::classify(url, e))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::classify(url, e))?;

        tracing::debug!("{} {} ({} bytes)", status_code, final_url, body.len());

        Ok(FetchedPayload {
            final_url,
            status_code,
            body: body.to_vec(),
        })
    }
}
