//! Storage traits and error types
//!
//! This module defines the contract the crawler needs from a page index and
//! the associated error types.

use crate::storage::{CrawledPage, SearchHit};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A page index with ranked full-text search
///
/// Implementations must be safe to call from many workers at once. `upsert`
/// is keyed on the page URL and must make the page visible to the very next
/// `search` call.
pub trait IndexedStore: Send + Sync {
    /// Inserts the page, or overwrites the existing row with the same URL
    fn upsert(&self, page: &CrawledPage) -> StorageResult<()>;

    /// Returns pages matching `query`, best first, dropping hits ranked below `threshold`
    fn search(&self, query: &str, threshold: f64) -> StorageResult<Vec<SearchHit>>;

    /// Returns the most recently crawled pages, newest first
    fn recent(&self, limit: usize) -> StorageResult<Vec<CrawledPage>>;

    /// Looks up a stored page by URL
    fn get_page(&self, url: &str) -> StorageResult<Option<CrawledPage>>;

    /// Gets total page count
    fn count_pages(&self) -> StorageResult<u64>;

    /// Gets page counts per HTTP status code, most common first
    fn status_breakdown(&self) -> StorageResult<Vec<(u16, u64)>>;
}
