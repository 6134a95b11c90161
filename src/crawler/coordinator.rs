//! Crawler coordinator - crawl orchestration
//!
//! This module wires the crawl components together for one crawl run:
//! - Opening storage and selecting the visited-claim backend
//! - Building the fetcher, limiter and worker pool
//! - Submitting seeds and waiting for the frontier to drain
//! - Draining gracefully on interrupt

use crate::config::{Config, DedupBackend};
use crate::crawler::dispatcher::{DispatchOptions, Dispatcher};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::task::TaskContext;
use crate::output::{CrawlStats, CrawlSummary};
use crate::service::CrawlService;
use crate::state::{ClaimStore, DomainLimiter, MemoryClaims, SqliteClaims};
use crate::storage::{open_storage, SqliteStorage};
use crate::TrawlerError;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Main crawler coordinator structure
pub struct Coordinator {
    dispatcher: Dispatcher,
    service: CrawlService,
    stats: Arc<CrawlStats>,
}

impl Coordinator {
    /// Creates a coordinator and starts its workers
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `storage` - The page index (also holds visited claims for the sqlite backend)
    /// * `fresh` - Drop all visited claims before crawling
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Workers are running and seeds can be submitted
    /// * `Err(TrawlerError)` - Failed to initialize
    pub fn new(
        config: &Config,
        storage: Arc<SqliteStorage>,
        fresh: bool,
    ) -> Result<Self, TrawlerError> {
        let crawler = &config.crawler;
        let ttl = crawler.dedup_ttl();

        let claims: Arc<dyn ClaimStore> = match crawler.dedup_backend {
            DedupBackend::Memory => Arc::new(MemoryClaims::new(ttl)),
            DedupBackend::Sqlite => Arc::new(SqliteClaims::new(storage.clone(), ttl)),
        };

        if fresh {
            tracing::info!("Clearing visited URLs before crawling");
            claims.clear()?;
        }

        let ctx = TaskContext {
            claims,
            limiter: Arc::new(DomainLimiter::new(crawler.politeness_interval())),
            fetcher: Fetcher::new(&config.user_agent, config.fetch.timeout())?,
            store: storage.clone(),
            max_content_length: crawler.max_content_length,
            retry_delay: crawler.retry_delay(),
        };

        let stats = Arc::new(CrawlStats::new());
        let dispatcher = Dispatcher::start(
            ctx,
            DispatchOptions::from_config(crawler),
            Arc::clone(&stats),
        );
        let service = CrawlService::new(storage, config).with_dispatcher(dispatcher.handle());

        Ok(Self {
            dispatcher,
            service,
            stats,
        })
    }

    /// The submission and search service backed by this crawl
    pub fn service(&self) -> &CrawlService {
        &self.service
    }

    /// Submits every seed, returning how many were accepted
    ///
    /// Invalid or rejected seeds are logged and skipped.
    pub async fn seed(&self, urls: &[String]) -> usize {
        let mut accepted = 0;
        for url in urls {
            match self.service.submit(url).await {
                Ok(_) => accepted += 1,
                Err(e) => tracing::warn!("Seed {} not submitted: {}", url, e),
            }
        }
        accepted
    }

    /// Waits until the frontier drains or `interrupt` fires, then shuts down
    ///
    /// Either way every in-flight job, pending retries included, finishes
    /// before this returns.
    pub async fn run(self, interrupt: impl Future<Output = ()>) -> CrawlSummary {
        tokio::select! {
            _ = self.dispatcher.wait_idle() => {
                tracing::info!("Frontier drained");
            }
            _ = interrupt => {
                tracing::info!("Interrupted, draining in-flight work");
            }
        }

        self.dispatcher.shutdown().await;
        self.stats.snapshot()
    }
}

/// Runs a complete crawl from the given seeds
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the storage database
/// 2. Start the worker pool
/// 3. Submit the seeds
/// 4. Wait until the frontier drains or Ctrl-C is pressed
///
/// # Example
///
/// ```no_run
/// use trawler::config::Config;
/// use trawler::crawler::run_crawl;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let summary = run_crawl(&config, &["https://example.com/".to_string()], false).await?;
/// println!("Crawled {} pages", summary.succeeded);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    seeds: &[String],
    fresh: bool,
) -> Result<CrawlSummary, TrawlerError> {
    let storage = Arc::new(open_storage(Path::new(&config.storage.database_path))?);
    let coordinator = Coordinator::new(config, storage, fresh)?;

    let accepted = coordinator.seed(seeds).await;
    tracing::info!("Submitted {} of {} seeds", accepted, seeds.len());

    let summary = coordinator
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(summary)
}
