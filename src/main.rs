//! Pinweave main entry point
//!
//! This is the command-line interface for the Pinweave bookmark graph crawler.

use anyhow::{bail, Context};
use clap::Parser;
use pinweave::config::{load_config_with_hash, validate, Config};
use pinweave::crawler::build_coordinator;
use pinweave::output::{load_statistics, print_report, print_statistics};
use pinweave::storage::SqliteSink;
use pinweave::PinweaveError;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Pinweave: a bookmark social-graph crawler
///
/// Pinweave starts from one user's bookmarks, finds everyone else who saved
/// the same links, crawls them in turn, and stores a deduplicated record of
/// bookmarks, co-saver aggregates and, optionally, target page text.
#[derive(Parser, Debug)]
#[command(name = "pinweave")]
#[command(version)]
#[command(about = "A bookmark social-graph crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh crawl, discarding the saved frontier and seen-set
    #[arg(long)]
    fresh: bool,

    /// Validate config and show the crawl setup without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show stored record counts from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Seed user, overriding the configuration
    #[arg(long)]
    user: Option<String>,

    /// Seed cursor (upper bound on save time), overriding the configuration
    #[arg(long)]
    before: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(user) = cli.user {
        config.seed.user = user;
    }
    if let Some(before) = cli.before {
        config.seed.before = before;
    }
    validate(&config).context("invalid seed override")?;

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pinweave=info,warn"),
            1 => EnvFilter::new("pinweave=debug,info"),
            2 => EnvFilter::new("pinweave=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective crawl setup
fn handle_dry_run(config: &Config) {
    println!("=== Pinweave Dry Run ===\n");

    println!("Seed:");
    println!("  User: {}", config.seed.user);
    println!("  Before: {}", config.seed.before);
    println!(
        "  First request: {}",
        pinweave::url::listing_url(&config.site.base_url, &config.seed.user, config.seed.before)
    );

    println!("\nCrawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Per-domain delay: {}ms", config.crawler.domain_delay_ms);
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!(
        "  External pages: {}",
        if config.crawler.parse_external_links {
            "resolved"
        } else {
            "skipped"
        }
    );
    println!("  Dedup strategy: {}", config.dedup.strategy.as_str());

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Crawl state: {}", config.output.state_path);
    if let Some(dir) = &config.output.json_dir {
        println!("  JSON lines: {}", dir);
    }
    if let Some(path) = &config.output.database_path {
        println!("  Database: {}", path);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows stored record counts
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let Some(path) = config.output.database_path.as_deref() else {
        bail!("--stats needs output.database-path to be configured");
    };

    println!("Database: {}\n", path);
    let sink = SqliteSink::open(Path::new(path))?;
    let counts = load_statistics(&sink)?;
    print_statistics(&counts);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool) -> anyhow::Result<()> {
    let coordinator = build_coordinator(&config, fresh)?;
    let frontier = coordinator.frontier();

    // Ctrl-C stops handing out work; in-flight requests finish
    let interrupt = {
        let frontier = frontier.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing in-flight requests");
                frontier.close();
            }
        })
    };

    let result = coordinator.run().await;
    interrupt.abort();

    match result {
        Ok(report) => {
            print_report(&report);
            if report.is_partial() {
                tracing::warn!(
                    "Crawl stopped with {} requests left; run again to resume",
                    report.remaining
                );
            } else {
                tracing::info!("Crawl completed successfully");
            }
            Ok(())
        }
        Err(PinweaveError::Aborted { unfinished, source }) => {
            tracing::error!("Crawl aborted: {}", source);
            Err(anyhow::anyhow!(
                "crawl aborted with {} requests left in the frontier: {}",
                unfinished,
                source
            ))
        }
        Err(e) => Err(e.into()),
    }
}
