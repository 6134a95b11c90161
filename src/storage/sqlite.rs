//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the IndexedStore
//! trait, plus the visited-URL claim table used by the SQLite claim backend.

use crate::storage::rank::{match_expression, query_terms, rank_document};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{IndexedStore, StorageError, StorageResult};
use crate::storage::{from_db_timestamp, to_db_timestamp, CrawledPage, SearchHit};
use crate::TrawlerError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Upper bound on FTS candidates scored per search
const MAX_SEARCH_CANDIDATES: i64 = 1000;

/// SQLite storage backend
///
/// A single connection guarded by a mutex; every operation is one short
/// statement or transaction so workers never hold the lock across I/O.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(TrawlerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, TrawlerError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, TrawlerError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    // ===== Visited Claims =====

    /// Atomically claims a URL until `expires_ms`
    ///
    /// The row is written only if no claim exists or the existing one expired
    /// at or before `now_ms`; exactly one of several racing callers sees
    /// `true`.
    pub fn claim_url(&self, url: &str, now_ms: i64, expires_ms: i64) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO visited (url, expires_at) VALUES (?1, ?2)
             ON CONFLICT(url) DO UPDATE SET expires_at = excluded.expires_at
             WHERE visited.expires_at <= ?3",
            params![url, expires_ms, now_ms],
        )?;
        Ok(changed == 1)
    }

    /// Deletes claims that expired at or before `now_ms`, returning how many went
    pub fn purge_expired_claims(&self, now_ms: i64) -> StorageResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM visited WHERE expires_at <= ?1",
            params![now_ms],
        )?;
        Ok(removed)
    }

    /// Drops every visited claim
    pub fn clear_claims(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM visited", [])?;
        tracing::debug!("Cleared {} visited claims", removed);
        Ok(())
    }

    /// Counts claims that have not yet expired at `now_ms`
    pub fn count_active_claims(&self, now_ms: i64) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM visited WHERE expires_at > ?1",
            params![now_ms],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// A `pages` row selected as (url, title, content, status_code, crawled_at)
struct PageRow {
    url: String,
    title: String,
    content: String,
    status_code: u16,
    crawled_at: String,
}

impl PageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            status_code: row.get(3)?,
            crawled_at: row.get(4)?,
        })
    }

    fn into_page(self) -> StorageResult<CrawledPage> {
        Ok(CrawledPage {
            crawled_at: from_db_timestamp(&self.crawled_at)?,
            url: self.url,
            title: self.title,
            content: self.content,
            status_code: self.status_code,
        })
    }
}

impl IndexedStore for SqliteStorage {
    fn upsert(&self, page: &CrawledPage) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pages (url, title, content, status_code, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                status_code = excluded.status_code,
                crawled_at = excluded.crawled_at",
            params![
                page.url,
                page.title,
                page.content,
                page.status_code,
                to_db_timestamp(&page.crawled_at),
            ],
        )?;
        Ok(())
    }

    fn search(&self, query: &str, threshold: f64) -> StorageResult<Vec<SearchHit>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.url, p.title, p.content, p.status_code, p.crawled_at,
                    snippet(pages_fts, 1, '<mark>', '</mark>', '...', 24)
             FROM pages_fts
             JOIN pages p ON p.id = pages_fts.rowid
             WHERE pages_fts MATCH ?1
             ORDER BY pages_fts.rank
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(
            params![match_expression(&terms), MAX_SEARCH_CANDIDATES],
            |row| Ok((PageRow::from_row(row)?, row.get::<_, String>(5)?)),
        )?;

        let mut hits = Vec::new();
        for row in rows {
            let (raw, snippet) = row?;
            let page = raw.into_page()?;
            let rank = rank_document(&terms, &page.title, &page.content);
            if rank >= threshold {
                hits.push(SearchHit {
                    page,
                    rank,
                    snippet,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.rank
                .total_cmp(&a.rank)
                .then_with(|| b.page.crawled_at.cmp(&a.page.crawled_at))
        });

        Ok(hits)
    }

    fn recent(&self, limit: usize) -> StorageResult<Vec<CrawledPage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT url, title, content, status_code, crawled_at FROM pages
             ORDER BY crawled_at DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], PageRow::from_row)?;

        let mut pages = Vec::new();
        for row in rows {
            pages.push(row?.into_page()?);
        }

        Ok(pages)
    }

    fn get_page(&self, url: &str) -> StorageResult<Option<CrawledPage>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT url, title, content, status_code, crawled_at FROM pages WHERE url = ?1",
                params![url],
                PageRow::from_row,
            )
            .optional()?;

        raw.map(PageRow::into_page).transpose()
    }

    fn count_pages(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn status_breakdown(&self) -> StorageResult<Vec<(u16, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT status_code, COUNT(*) AS n FROM pages
             GROUP BY status_code
             ORDER BY n DESC, status_code ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, u16>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut breakdown = Vec::new();
        for row in rows {
            breakdown.push(row?);
        }

        Ok(breakdown)
    }
}
