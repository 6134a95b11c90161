//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Page upserts keyed on URL, mirrored into an FTS5 index
//! - Ranked full-text search with highlighted snippets
//! - Visited-URL claims with expiry

mod rank;
mod schema;
mod sqlite;
mod traits;

pub use rank::{query_terms, rank_document, CONTENT_WEIGHT, TITLE_WEIGHT};
pub use sqlite::SqliteStorage;
pub use traits::{IndexedStore, StorageError, StorageResult};

use crate::TrawlerError;
use chrono::{DateTime, SecondsFormat, Utc};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(TrawlerError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, TrawlerError> {
    SqliteStorage::new(path)
}

/// A crawled page as persisted in the index
#[derive(Debug, Clone, PartialEq)]
pub struct CrawledPage {
    /// Normalized URL the page was requested under; unique in the index
    pub url: String,
    pub title: String,
    /// Extracted visible text
    pub content: String,
    pub status_code: u16,
    pub crawled_at: DateTime<Utc>,
}

impl CrawledPage {
    /// Creates a page record stamped with the current time
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            status_code,
            crawled_at: Utc::now(),
        }
    }
}

/// One search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub page: CrawledPage,
    /// Relevance score, higher is better
    pub rank: f64,
    /// Content excerpt with matches wrapped in `<mark>` tags
    pub snippet: String,
}

/// Formats a timestamp the way it is stored, so that text order is time order
pub(crate) fn to_db_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp
pub(crate) fn from_db_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(s.to_string()))
}
