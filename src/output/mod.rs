//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - Recording task outcomes while a crawl runs
//! - Printing crawl summaries, index statistics and search results

pub mod stats;

pub use stats::{
    load_statistics, print_statistics, print_summary, CrawlStats, CrawlSummary, IndexStatistics,
};

use crate::storage::{CrawledPage, SearchHit};

/// Prints search hits to stdout, best first
pub fn print_search_results(query: &str, hits: &[SearchHit]) {
    if query.trim().is_empty() {
        println!("=== {} most recent pages ===\n", hits.len());
    } else {
        println!("=== {} results for \"{}\" ===\n", hits.len(), query.trim());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. {} [{:.3}]", i + 1, hit.page.title, hit.rank);
        println!("   {}", hit.page.url);
        if !hit.snippet.is_empty() {
            println!("   {}", hit.snippet);
        }
        println!();
    }
}

/// Prints a stored page record to stdout
pub fn print_page(page: &CrawledPage) {
    println!("URL:         {}", page.url);
    println!("Title:       {}", page.title);
    println!("Status:      {}", page.status_code);
    println!("Crawled at:  {}", page.crawled_at.to_rfc3339());
    println!("Length:      {} chars", page.content.chars().count());
    println!();
    println!("{}", page.content);
}
