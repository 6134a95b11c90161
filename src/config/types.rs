use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Trawler
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    /// Seed URLs crawled in addition to any given on the command line
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Where visited-URL claims are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupBackend {
    /// Process-local concurrent map; claims vanish on exit
    Memory,
    /// Table in the page database; claims survive restarts
    #[default]
    Sqlite,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum link depth followed from a seed URL
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Number of workers executing crawl tasks concurrently
    pub workers: u32,

    /// Capacity of the bounded dispatcher queue
    #[serde(rename = "queue-capacity")]
    pub queue_capacity: u32,

    /// How long a seed submission waits for queue capacity (milliseconds)
    #[serde(rename = "seed-submit-timeout-ms")]
    pub seed_submit_timeout_ms: u64,

    /// Attempts per task across rate-limit denials and transient fetch errors
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay before a deferred task is re-submitted (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Minimum time between requests to the same domain (milliseconds)
    #[serde(rename = "politeness-interval-ms")]
    pub politeness_interval_ms: u64,

    /// How long a claimed URL stays claimed (seconds)
    #[serde(rename = "dedup-ttl-secs")]
    pub dedup_ttl_secs: u64,

    #[serde(rename = "dedup-backend")]
    pub dedup_backend: DedupBackend,

    /// Maximum number of characters of page text kept
    #[serde(rename = "max-content-length")]
    pub max_content_length: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            workers: 8,
            queue_capacity: 1024,
            seed_submit_timeout_ms: 5_000,
            max_attempts: 3,
            retry_delay_ms: 2_000,
            politeness_interval_ms: 1_000,
            dedup_ttl_secs: 24 * 60 * 60,
            dedup_backend: DedupBackend::default(),
            max_content_length: 10_000,
        }
    }
}

impl CrawlerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn politeness_interval(&self) -> Duration {
        Duration::from_millis(self.politeness_interval_ms)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn seed_submit_timeout(&self) -> Duration {
        Duration::from_millis(self.seed_submit_timeout_ms)
    }
}

/// HTTP fetch configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Hard timeout for a single fetch (milliseconds)
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "Trawler".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/trawler".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Page index storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./trawler.db".to_string(),
        }
    }
}

/// Search behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Hits ranked below this are not returned
    #[serde(rename = "rank-threshold")]
    pub rank_threshold: f64,

    /// Number of pages listed for an empty query
    #[serde(rename = "recent-limit")]
    pub recent_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rank_threshold: 0.1,
            recent_limit: 20,
        }
    }
}
