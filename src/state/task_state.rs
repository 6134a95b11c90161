/// Crawl task state definitions
///
/// This module defines the states a single crawl task moves through and the
/// legal edges between them.
use crate::TrawlerError;
use std::fmt;

/// Represents the current state of one crawl task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    // ===== Active States =====
    /// Job taken off the queue, nothing attempted yet
    Pending,

    /// Reserving the URL in the claim store
    Claiming,

    /// Waiting for the per-domain politeness lock
    RateLimiting,

    /// Network request in flight
    Fetching,

    /// Parsing the fetched body
    Extracting,

    /// Writing the page into the index
    Persisting,

    /// Submitting child requests for extracted links
    Expanding,

    // ===== Terminal States =====
    /// Finished without error (including "already visited")
    Done,

    /// Finished with a reported failure
    Failed,
}

impl CrawlState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if a task may be suspended here and resumed by re-submission
    ///
    /// Only the rate-limit wait and the fetch step hand the job back to the
    /// dispatcher for a delayed retry.
    pub fn is_retry_point(&self) -> bool {
        matches!(self, Self::RateLimiting | Self::Fetching)
    }

    /// Returns true if `next` is a legal successor of this state
    ///
    /// `Pending -> RateLimiting` is the re-entry edge of a retried job whose
    /// URL claim already succeeded. `Pending -> Done` drops requests beyond
    /// their depth limit.
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        use CrawlState::*;

        matches!(
            (self, next),
            (Pending, Claiming)
                | (Pending, RateLimiting)
                | (Pending, Done)
                | (Claiming, RateLimiting)
                | (Claiming, Done)
                | (Claiming, Failed)
                | (RateLimiting, Fetching)
                | (RateLimiting, Failed)
                | (Fetching, Extracting)
                | (Fetching, Failed)
                | (Extracting, Persisting)
                | (Persisting, Expanding)
                | (Persisting, Failed)
                | (Expanding, Done)
        )
    }

    /// Moves to `next`, rejecting edges the state machine does not have
    pub fn transition(self, next: CrawlState) -> Result<CrawlState, TrawlerError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TrawlerError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Short lowercase name used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claiming => "claiming",
            Self::RateLimiting => "rate_limiting",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Persisting => "persisting",
            Self::Expanding => "expanding",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
