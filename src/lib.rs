//! Trawler: a polite, depth-bounded web crawler with a searchable page index
//!
//! This crate implements a crawler that claims URLs exactly once per retention
//! window, spaces requests per domain, follows same-domain links up to a
//! bounded depth, and stores extracted page text in a full-text index.

pub mod config;
pub mod crawler;
pub mod output;
pub mod service;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Trawler operations
#[derive(Debug, Error)]
pub enum TrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlState,
        to: state::CrawlState,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Why a submission to the dispatcher was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The bounded queue had no free slot
    QueueFull,
    /// The dispatcher is draining and no longer accepts work
    ShuttingDown,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueFull => write!(f, "queue full"),
            Self::ShuttingDown => write!(f, "dispatcher shutting down"),
        }
    }
}

/// Failure taxonomy of a single crawl task
///
/// None of these ever escape the task that produced them; they end up in the
/// task report and the log. Losing a claim race is not an error: that task
/// ends as `TaskOutcome::AlreadyVisited`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    #[error("{}", rate_limit_message(.retries_exhausted))]
    RateLimited { retries_exhausted: bool },

    #[error("fetch timed out")]
    FetchTimeout,

    #[error("network error: {0}")]
    FetchNetwork(String),

    #[error("http status {0}")]
    FetchHttp(u16),

    #[error("unsupported response: {0}")]
    Unsupported(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("dispatch rejected: {0}")]
    DispatchRejected(RejectReason),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CrawlError {
    /// Returns true if the task may be re-submitted after the retry delay
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited {
                retries_exhausted: false
            } | Self::FetchTimeout
                | Self::FetchNetwork(_)
        )
    }
}

fn rate_limit_message(retries_exhausted: &bool) -> &'static str {
    if *retries_exhausted {
        "rate-limit retries exhausted"
    } else {
        "rate limited"
    }
}

/// Result type alias for Trawler operations
pub type Result<T> = std::result::Result<T, TrawlerError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{CrawlState, DomainLimiter};
pub use url::{extract_domain, normalize_url, same_origin};
