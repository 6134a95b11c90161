//! State module for tracking crawl progress
//!
//! This module provides the shared state that crawl tasks coordinate through.
//!
//! # Components
//!
//! - `CrawlState`: The states a single crawl task moves through
//! - `ClaimStore`: Visited-URL claims with expiry (in-memory or SQLite)
//! - `DomainLimiter`: Per-domain politeness locks

mod domain_state;
mod task_state;
mod visited;

// Re-export main types
pub use domain_state::DomainLimiter;
pub use task_state::CrawlState;
pub use visited::{ClaimStore, MemoryClaims, SqliteClaims};
