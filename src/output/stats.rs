//! Crawl and index statistics
//!
//! This module provides:
//! - Live counters of task outcomes, fed by the dispatcher's workers
//! - Index statistics loaded from the storage layer
//! - Plain-text printing of both

use crate::crawler::{TaskOutcome, TaskReport};
use crate::storage::IndexedStore;
use crate::{CrawlError, TrawlerError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of task outcomes over one crawl
#[derive(Debug, Default)]
pub struct CrawlStats {
    succeeded: AtomicU64,
    already_visited: AtomicU64,
    depth_exceeded: AtomicU64,
    retries: AtomicU64,
    rate_limit_exhausted: AtomicU64,
    fetch_failed: AtomicU64,
    http_failed: AtomicU64,
    store_failed: AtomicU64,
    other_failed: AtomicU64,
    links_queued: AtomicU64,
    links_dropped: AtomicU64,
}

/// Point-in-time copy of `CrawlStats`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub succeeded: u64,
    pub already_visited: u64,
    pub depth_exceeded: u64,
    pub retries: u64,
    pub rate_limit_exhausted: u64,
    pub fetch_failed: u64,
    pub http_failed: u64,
    pub store_failed: u64,
    pub other_failed: u64,
    pub links_queued: u64,
    pub links_dropped: u64,
}

impl CrawlSummary {
    /// Tasks that ended in `Failed`
    pub fn total_failed(&self) -> u64 {
        self.rate_limit_exhausted
            + self.fetch_failed
            + self.http_failed
            + self.store_failed
            + self.other_failed
    }
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one task execution
    pub fn record(&self, report: &TaskReport) {
        let counter = match &report.outcome {
            TaskOutcome::Success { expanded, dropped } => {
                self.links_queued
                    .fetch_add(*expanded as u64, Ordering::Relaxed);
                self.links_dropped
                    .fetch_add(*dropped as u64, Ordering::Relaxed);
                &self.succeeded
            }
            TaskOutcome::AlreadyVisited => &self.already_visited,
            TaskOutcome::DepthExceeded => &self.depth_exceeded,
            TaskOutcome::Retrying { .. } => &self.retries,
            TaskOutcome::Failed(error) => match error {
                CrawlError::RateLimited { .. } => &self.rate_limit_exhausted,
                CrawlError::FetchTimeout | CrawlError::FetchNetwork(_) => &self.fetch_failed,
                CrawlError::FetchHttp(_) => &self.http_failed,
                CrawlError::Store(_) => &self.store_failed,
                _ => &self.other_failed,
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a task that panicked before producing a report
    pub fn record_aborted(&self) {
        self.other_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CrawlSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CrawlSummary {
            succeeded: load(&self.succeeded),
            already_visited: load(&self.already_visited),
            depth_exceeded: load(&self.depth_exceeded),
            retries: load(&self.retries),
            rate_limit_exhausted: load(&self.rate_limit_exhausted),
            fetch_failed: load(&self.fetch_failed),
            http_failed: load(&self.http_failed),
            store_failed: load(&self.store_failed),
            other_failed: load(&self.other_failed),
            links_queued: load(&self.links_queued),
            links_dropped: load(&self.links_dropped),
        }
    }
}

/// Prints a crawl summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Tasks:");
    println!("  Pages crawled: {}", summary.succeeded);
    println!("  Already visited: {}", summary.already_visited);
    println!("  Beyond max depth: {}", summary.depth_exceeded);
    println!("  Retries scheduled: {}", summary.retries);
    println!();

    println!("Failures: {}", summary.total_failed());
    if summary.total_failed() > 0 {
        println!("  Rate-limit retries exhausted: {}", summary.rate_limit_exhausted);
        println!("  Timeouts / network errors: {}", summary.fetch_failed);
        println!("  HTTP errors: {}", summary.http_failed);
        println!("  Store errors: {}", summary.store_failed);
        println!("  Other: {}", summary.other_failed);
    }
    println!();

    println!("Links:");
    println!("  Queued: {}", summary.links_queued);
    println!("  Dropped (queue full or shutting down): {}", summary.links_dropped);
}

/// Index statistics summary
#[derive(Debug, Clone)]
pub struct IndexStatistics {
    /// Total number of pages stored
    pub total_pages: u64,

    /// Page counts by HTTP status code, most common first
    pub pages_by_status: Vec<(u16, u64)>,

    /// Most recently crawled URLs with their timestamps
    pub latest: Vec<(String, String)>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The page index to query
/// * `latest` - How many recently crawled pages to list
///
/// # Returns
///
/// * `Ok(IndexStatistics)` - Successfully loaded statistics
/// * `Err(TrawlerError)` - Failed to query statistics
pub fn load_statistics(
    store: &dyn IndexedStore,
    latest: usize,
) -> Result<IndexStatistics, TrawlerError> {
    let total_pages = store.count_pages()?;
    let pages_by_status = store.status_breakdown()?;
    let latest = store
        .recent(latest)?
        .into_iter()
        .map(|page| (page.url, page.crawled_at.to_rfc3339()))
        .collect();

    Ok(IndexStatistics {
        total_pages,
        pages_by_status,
        latest,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &IndexStatistics) {
    println!("=== Index Statistics ===\n");

    println!("Overview:");
    println!("  Total pages indexed: {}", stats.total_pages);
    println!();

    println!("Pages by Status:");
    for (status, count) in &stats.pages_by_status {
        let percentage = if stats.total_pages > 0 {
            (*count as f64 / stats.total_pages as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.latest.is_empty() {
        println!("Most Recently Crawled:");
        for (url, crawled_at) in &stats.latest {
            println!("  {}  {}", crawled_at, url);
        }
    }
}
