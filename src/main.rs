//! Trawler main entry point
//!
//! This is the command-line interface for the Trawler web crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trawler::config::{load_config_with_hash, Config};
use trawler::crawler::run_crawl;
use trawler::output::{
    load_statistics, print_page, print_search_results, print_statistics, print_summary,
};
use trawler::service::CrawlService;
use trawler::storage::{self, SqliteStorage};
use tracing_subscriber::EnvFilter;

/// Number of recently crawled pages listed by --stats
const STATS_LATEST: usize = 10;

/// Trawler: a polite, depth-bounded web crawler
///
/// Trawler fetches pages from the given seeds, follows same-domain links up
/// to a maximum depth, spaces requests to each domain, and stores the
/// visible text of every page in a searchable index.
#[derive(Parser, Debug)]
#[command(name = "trawler")]
#[command(version)]
#[command(about = "A polite, depth-bounded web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URL to crawl (repeatable; added to the seeds in the config)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Forget visited URLs before crawling
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "search", "page"])]
    dry_run: bool,

    /// Show index statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "search", "page"])]
    stats: bool,

    /// Search the index and exit (an empty query lists recent pages)
    #[arg(long, value_name = "QUERY", conflicts_with_all = ["dry_run", "stats", "page"])]
    search: Option<String>,

    /// Print the stored record for a URL and exit
    #[arg(long, value_name = "URL", conflicts_with_all = ["dry_run", "stats", "search"])]
    page: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let mut seeds = config.seeds.clone();
    seeds.extend(cli.seeds.iter().cloned());

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &seeds);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(query) = &cli.search {
        handle_search(&config, query)?;
    } else if let Some(url) = &cli.page {
        handle_page(&config, url)?;
    } else {
        handle_crawl(&config, &seeds, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawler=info,warn"),
            1 => EnvFilter::new("trawler=debug,info"),
            2 => EnvFilter::new("trawler=trace,debug"),
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

fn open_storage(config: &Config) -> anyhow::Result<Arc<SqliteStorage>> {
    let path = Path::new(&config.storage.database_path);
    let storage = storage::open_storage(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(storage))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, seeds: &[String]) {
    println!("=== Trawler Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Workers: {}", crawler.workers);
    println!("  Queue capacity: {}", crawler.queue_capacity);
    println!("  Seed submit timeout: {}ms", crawler.seed_submit_timeout_ms);
    println!("  Max attempts: {}", crawler.max_attempts);
    println!("  Retry delay: {}ms", crawler.retry_delay_ms);
    println!("  Politeness interval: {}ms", crawler.politeness_interval_ms);
    println!("  Visited retention: {}s", crawler.dedup_ttl_secs);
    println!("  Visited backend: {:?}", crawler.dedup_backend);
    println!("  Max content length: {} chars", crawler.max_content_length);
    println!("  Fetch timeout: {}ms", config.fetch.timeout_ms);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nSearch:");
    println!("  Rank threshold: {}", config.search.rank_threshold);
    println!("  Recent listing: {} pages", config.search.recent_limit);

    println!("\nSeeds ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", seeds.len());
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(config)?;
    let stats = load_statistics(storage.as_ref(), STATS_LATEST)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --search mode
fn handle_search(config: &Config, query: &str) -> anyhow::Result<()> {
    let service = CrawlService::new(open_storage(config)?, config);
    let hits = service.search(query).context("Search failed")?;
    print_search_results(query, &hits);
    Ok(())
}

/// Handles the --page mode
fn handle_page(config: &Config, url: &str) -> anyhow::Result<()> {
    let service = CrawlService::new(open_storage(config)?, config);
    match service.page(url)? {
        Some(page) => print_page(&page),
        None => println!("No page stored for {}", url),
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, seeds: &[String], fresh: bool) -> anyhow::Result<()> {
    if seeds.is_empty() {
        anyhow::bail!("No seeds to crawl: pass --seed <URL> or list seeds in the config");
    }

    if fresh {
        tracing::info!("Starting fresh crawl (visited URLs forgotten)");
    } else {
        tracing::info!("Starting crawl");
    }
    tracing::info!("Total seed URLs: {}", seeds.len());

    let summary = run_crawl(config, seeds, fresh).await.context("Crawl failed")?;
    tracing::info!("Crawl finished: {} pages crawled", summary.succeeded);
    print_summary(&summary);

    Ok(())
}
