//! Visited-URL claims
//!
//! A claim reserves a URL for one crawl per retention window. Claiming is a
//! single insert-if-absent-or-expired operation on both backends, so two
//! workers racing on the same URL can never both win.

use crate::storage::{SqliteStorage, StorageResult};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Expired markers are swept after this many successful claims
const SWEEP_INTERVAL: u64 = 4096;

/// Store of visited-URL markers with expiry
pub trait ClaimStore: Send + Sync {
    /// Claims `url`; true iff no active marker existed
    ///
    /// There is no way to give a claim back: a URL whose crawl failed stays
    /// claimed until its marker expires.
    fn claim(&self, url: &str) -> StorageResult<bool>;

    /// Drops every marker
    fn clear(&self) -> StorageResult<()>;
}

/// In-process claim store backed by a sharded concurrent map
pub struct MemoryClaims {
    /// URL -> marker expiry
    markers: DashMap<String, Instant>,
    ttl: Duration,
    claims: AtomicU64,
}

impl MemoryClaims {
    pub fn new(ttl: Duration) -> Self {
        Self {
            markers: DashMap::new(),
            ttl,
            claims: AtomicU64::new(0),
        }
    }

    /// Claims `url` as of `now`
    pub fn claim_at(&self, url: &str, now: Instant) -> bool {
        // The entry guard holds the shard lock for the whole check-and-set.
        let claimed = match self.markers.entry(url.to_string()) {
            Entry::Occupied(mut marker) => {
                if *marker.get() > now {
                    false
                } else {
                    marker.insert(now + self.ttl);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now + self.ttl);
                true
            }
        };

        if claimed {
            let count = self.claims.fetch_add(1, Ordering::Relaxed) + 1;
            if count % SWEEP_INTERVAL == 0 {
                let purged = self.purge_expired(now);
                tracing::debug!("Swept {} expired visited markers", purged);
            }
        }

        claimed
    }

    /// Removes markers that expired before `now`, returning how many went
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.markers.len();
        self.markers.retain(|_, expiry| *expiry > now);
        before.saturating_sub(self.markers.len())
    }

    /// Number of markers currently held, expired or not
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl ClaimStore for MemoryClaims {
    fn claim(&self, url: &str) -> StorageResult<bool> {
        Ok(self.claim_at(url, Instant::now()))
    }

    fn clear(&self) -> StorageResult<()> {
        self.markers.clear();
        Ok(())
    }
}

/// Claim store kept in the page database, so claims outlive the process
pub struct SqliteClaims {
    storage: Arc<SqliteStorage>,
    ttl: Duration,
    claims: AtomicU64,
}

impl SqliteClaims {
    pub fn new(storage: Arc<SqliteStorage>, ttl: Duration) -> Self {
        Self {
            storage,
            ttl,
            claims: AtomicU64::new(0),
        }
    }

    /// Claims `url` as of `now`
    pub fn claim_at(&self, url: &str, now: DateTime<Utc>) -> StorageResult<bool> {
        let now_ms = now.timestamp_millis();
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let claimed = self
            .storage
            .claim_url(url, now_ms, now_ms.saturating_add(ttl_ms))?;

        if claimed {
            let count = self.claims.fetch_add(1, Ordering::Relaxed) + 1;
            if count % SWEEP_INTERVAL == 0 {
                let purged = self.storage.purge_expired_claims(now_ms)?;
                tracing::debug!("Swept {} expired visited rows", purged);
            }
        }

        Ok(claimed)
    }
}

impl ClaimStore for SqliteClaims {
    fn claim(&self, url: &str) -> StorageResult<bool> {
        self.claim_at(url, Utc::now())
    }

    fn clear(&self) -> StorageResult<()> {
        self.storage.clear_claims()
    }
}
