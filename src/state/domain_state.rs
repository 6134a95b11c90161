use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Per-domain politeness locks
///
/// Each successful acquisition leaves a lock on the domain that expires after
/// the politeness interval. While it is held every other acquisition for that
/// domain fails, so at most one request per interval reaches a domain no
/// matter how many workers target it.
#[derive(Debug)]
pub struct DomainLimiter {
    /// Domain -> lock expiry
    locks: DashMap<String, Instant>,

    /// Minimum spacing between requests to the same domain
    interval: Duration,
}

impl DomainLimiter {
    /// Creates a limiter with the given politeness interval
    pub fn new(interval: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            interval,
        }
    }

    /// Tries to take the domain's lock now
    pub fn try_acquire(&self, domain: &str) -> bool {
        self.try_acquire_at(domain, Instant::now())
    }

    /// Tries to take the domain's lock as of `now`
    ///
    /// # Returns
    ///
    /// * `true` - No active lock existed; a new one now runs until `now + interval`
    /// * `false` - The domain was requested less than one interval ago
    pub fn try_acquire_at(&self, domain: &str, now: Instant) -> bool {
        match self.locks.entry(domain.to_lowercase()) {
            Entry::Occupied(mut lock) => {
                if *lock.get() > now {
                    return false;
                }
                lock.insert(now + self.interval);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now + self.interval);
                true
            }
        }
    }

    /// Time left until the domain's lock expires, if it is held at `now`
    pub fn time_until_available(&self, domain: &str, now: Instant) -> Option<Duration> {
        self.locks
            .get(&domain.to_lowercase())
            .and_then(|expiry| expiry.checked_duration_since(now))
            .filter(|wait| !wait.is_zero())
    }
}
