//! Sumi-Crawler main entry point
//!
//! This is the command-line interface for running crawl sessions.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sumi_crawler::config::{load_config_with_hash, Config, QueueKind};
use sumi_crawler::queue::{MemoryQueue, Queue, SqliteQueue};
use sumi_crawler::robots::{RobotsCache, SqliteRobotsCache};
use sumi_crawler::storage::{Backend, SqliteBackend};
use sumi_crawler::Crawler;
use tracing_subscriber::EnvFilter;

/// Sumi-Crawler: the crawling core of a search engine
///
/// Sumi-Crawler fetches pages from a shared queue while respecting
/// robots.txt, crawl delays and Retry-After hints per host, and stores
/// what it learns in a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "sumi-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A polite search engine crawler", long_about = None)]
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

    /// Session length in seconds, overriding the configuration
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show document and queue counts from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }
    if cli.stats {
        return handle_stats(&config);
    }

    let duration = cli
        .duration
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.crawler.session());
    handle_crawl(config, duration).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_crawler=info,warn"),
            1 => EnvFilter::new("sumi_crawler=debug,info"),
            2 => EnvFilter::new("sumi_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;
    println!("=== Sumi-Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", crawler.workers);
    println!("  Session: {}s", crawler.session_secs);
    println!("  Recrawl after: {}h", crawler.since_hours);
    println!("  Request timeout: {}s", crawler.timeout_secs);
    println!("  Max bytes per page: {}", limit(crawler.max_bytes));
    println!("  Max links per page: {}", limit(crawler.max_links));
    println!("  Max queued links: {}", crawler.max_queue_links);
    println!("  Max documents per domain: {}", crawler.max_domain_links);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.full());
    println!("  Robots agent: {}", config.user_agent.short());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Queue: {:?}", config.storage.queue);

    println!("\nSeeds ({}):", crawler.seeds.len());
    for seed in &crawler.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

fn limit(value: i64) -> String {
    if value < 0 {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

/// Handles the --stats mode: shows counts from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = Path::new(&config.storage.database_path);
    println!("Database: {}\n", path.display());

    let backend = SqliteBackend::open(path)?;
    backend.setup()?;
    println!("Documents: {}", backend.count_documents()?);

    if config.storage.queue == QueueKind::Sqlite {
        let queue = SqliteQueue::open(path)?;
        queue.setup()?;
        println!("Queued links: {}", queue.count_links()?);
    }

    Ok(())
}

/// Opens the stores and runs one crawl session
async fn handle_crawl(config: Config, duration: Duration) -> anyhow::Result<()> {
    let path = Path::new(&config.storage.database_path);

    let backend = SqliteBackend::open(path).context("opening document store")?;
    backend.setup()?;

    let robots = SqliteRobotsCache::open(path, config.storage.robots_batch_size)
        .context("opening robots.txt cache")?;
    robots.setup()?;

    let queue: Arc<dyn Queue> = match config.storage.queue {
        QueueKind::Memory => Arc::new(MemoryQueue::new()),
        QueueKind::Sqlite => Arc::new(SqliteQueue::open(path).context("opening link queue")?),
    };
    queue.setup()?;

    let crawler = Crawler::new(config, queue, Arc::new(robots), Arc::new(backend))?;
    let result = crawler.start(duration).await;
    crawler.close();

    match result {
        Ok(()) => {
            tracing::info!("Crawl session completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl session failed: {}", e);
            Err(e.into())
        }
    }
}
