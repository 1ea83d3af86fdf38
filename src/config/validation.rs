use crate::config::types::{
    Config, CrawlerConfig, DedupConfig, DedupStrategy, OutputConfig, SeedConfig, SiteConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Largest bloom filter the crawler will allocate for (about 540 MB of bits
/// at the smallest allowed false-positive rate)
const MAX_BLOOM_ITEMS: u64 = 100_000_000;

/// Rates below this would need more hash functions than the filter runs
const MIN_BLOOM_RATE: f64 = 1e-9;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_seed_config(&config.seed)?;
    validate_site_config(&config.site)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_dedup_config(&config.dedup)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the seed user and cursor
fn validate_seed_config(config: &SeedConfig) -> Result<(), ConfigError> {
    validate_username(&config.user)?;

    if config.before <= 0 {
        return Err(ConfigError::Validation(format!(
            "seed cursor must be a positive timestamp, got {}",
            config.before
        )));
    }

    Ok(())
}

/// Usernames end up in URL paths and file names
fn validate_username(user: &str) -> Result<(), ConfigError> {
    if user.is_empty() {
        return Err(ConfigError::Validation(
            "seed user cannot be empty".to_string(),
        ));
    }

    if user.contains('/') || user.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "seed user '{}' may not contain '/' or whitespace",
            user
        )));
    }

    Ok(())
}

fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    Ok(())
}

/// The user agent identifies the crawler to every site it touches, so each
/// part must be present and reachable
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    let name_ok = !config.crawler_name.is_empty()
        && config
            .crawler_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !name_ok {
        return Err(ConfigError::Validation(format!(
            "crawler-name must be non-empty ASCII letters, digits or hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler-version cannot be empty".to_string(),
        ));
    }

    let contact = Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("contact-url: {}", e)))?;
    if !matches!(contact.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "contact-url '{}' must use http or https",
            config.contact_url
        )));
    }

    validate_email(&config.contact_email)
}

fn validate_dedup_config(config: &DedupConfig) -> Result<(), ConfigError> {
    if config.strategy != DedupStrategy::Bloom {
        return Ok(());
    }

    if config.expected_items == 0 || config.expected_items > MAX_BLOOM_ITEMS {
        return Err(ConfigError::Validation(format!(
            "expected-items must be between 1 and {} for the bloom strategy, got {}",
            MAX_BLOOM_ITEMS, config.expected_items
        )));
    }

    if !(config.false_positive_rate >= MIN_BLOOM_RATE && config.false_positive_rate < 1.0) {
        return Err(ConfigError::Validation(format!(
            "false-positive-rate must be in [{}, 1), got {}",
            MIN_BLOOM_RATE, config.false_positive_rate
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.state_path.is_empty() {
        return Err(ConfigError::Validation(
            "state_path cannot be empty".to_string(),
        ));
    }

    let json = config.json_dir.as_deref().filter(|p| !p.is_empty());
    let db = config.database_path.as_deref().filter(|p| !p.is_empty());
    if json.is_none() && db.is_none() {
        return Err(ConfigError::Validation(
            "at least one of json_dir or database_path must be set".to_string(),
        ));
    }

    Ok(())
}

/// Accepts `local@domain.tld`; anything stricter is left to the mail server
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "contact-email '{}' is not an email address",
            email
        )))
    }
}
