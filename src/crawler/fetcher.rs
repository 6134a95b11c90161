//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests bounded by a fixed timeout
//! - Redirect following (at most `MAX_REDIRECTS` hops)
//! - Rejecting non-HTML and oversized responses before the body is read
//! - Error classification into retryable and permanent failures

use crate::config::UserAgentConfig;
use crate::CrawlError;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Maximum redirect hops followed for a single fetch
pub const MAX_REDIRECTS: usize = 10;

/// Largest advertised body accepted, in bytes
pub const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Content types treated as HTML pages
const HTML_CONTENT_TYPES: [&str; 2] = ["text/html", "application/xhtml+xml"];

/// A page body returned with HTTP 200
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status_code: u16,
    pub body: String,
    /// URL after redirects
    pub final_url: String,
}

/// Why a fetch produced no page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("not an HTML page: {0:?}")]
    ContentType(String),

    #[error("body of {0} bytes exceeds the size limit")]
    TooLarge(u64),
}

impl FetchError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Network(format!("connection failed: {}", e))
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<FetchError> for CrawlError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout => CrawlError::FetchTimeout,
            FetchError::Network(msg) => CrawlError::FetchNetwork(msg),
            FetchError::Status(code) => CrawlError::FetchHttp(code),
            other @ (FetchError::ContentType(_) | FetchError::TooLarge(_)) => {
                CrawlError::Unsupported(other.to_string())
            }
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Total time allowed for one request, body included
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use trawler::config::UserAgentConfig;
/// use trawler::crawler::build_http_client;
///
/// let config = UserAgentConfig::default();
/// let client = build_http_client(&config, Duration::from_secs(5)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages over HTTP for crawl tasks
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Creates a fetcher identifying itself with `config`
    pub fn new(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config, timeout)?,
        })
    }

    /// Fetches `url`
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | HTTP 200 | `Ok(FetchedPage)` |
    /// | Any other status | `Err(Status(code))` |
    /// | Content-Type not HTML | `Err(ContentType(type))` |
    /// | Content-Length over `MAX_BODY_BYTES` | `Err(TooLarge(len))` |
    /// | Timeout (connect or body) | `Err(Timeout)` |
    /// | Other transport failure | `Err(Network(msg))` |
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!("{} answered HTTP {}", url, status.as_u16());
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !HTML_CONTENT_TYPES.iter().any(|t| content_type.contains(t)) {
            tracing::debug!("Skipping {}: content type {:?}", url, content_type);
            return Err(FetchError::ContentType(content_type));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_BODY_BYTES {
                return Err(FetchError::TooLarge(length));
            }
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(FetchError::from_reqwest)?;

        Ok(FetchedPage {
            status_code: status.as_u16(),
            body,
            final_url,
        })
    }
}
