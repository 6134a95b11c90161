//! Submission and search entry points
//!
//! `CrawlService` is what the outside world talks to: it turns a raw URL into
//! a seed crawl request and answers search and page lookups from the index.

use crate::config::Config;
use crate::crawler::{CrawlRequest, DispatchHandle, Submission};
use crate::storage::{CrawledPage, IndexedStore, SearchHit};
use crate::url::normalize_url;
use crate::{RejectReason, TrawlerError, UrlError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Characters of content shown for pages listed without a query
const PREVIEW_LENGTH: usize = 200;

/// Acknowledgement of an accepted seed submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a seed submission was not accepted
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("submission rejected: {0}")]
    Rejected(RejectReason),

    #[error("no crawl is running")]
    NotCrawling,
}

/// Submission, search and lookup over one page index
pub struct CrawlService {
    store: Arc<dyn IndexedStore>,
    dispatcher: Option<DispatchHandle>,
    max_depth: u32,
    seed_submit_timeout: Duration,
    rank_threshold: f64,
    recent_limit: usize,
}

impl CrawlService {
    /// Creates a read-only service; `submit` fails until a dispatcher is attached
    pub fn new(store: Arc<dyn IndexedStore>, config: &Config) -> Self {
        Self {
            store,
            dispatcher: None,
            max_depth: config.crawler.max_depth,
            seed_submit_timeout: config.crawler.seed_submit_timeout(),
            rank_threshold: config.search.rank_threshold,
            recent_limit: config.search.recent_limit,
        }
    }

    /// Attaches the dispatcher seeds are submitted to
    pub fn with_dispatcher(mut self, dispatcher: DispatchHandle) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Submits `url` as a depth-0 crawl
    ///
    /// Returns as soon as the request is queued; the crawl's outcome only
    /// shows up in the index and the log.
    pub async fn submit(&self, url: &str) -> Result<TaskId, SubmitError> {
        let dispatcher = self.dispatcher.as_ref().ok_or(SubmitError::NotCrawling)?;
        let normalized = normalize_url(url)?.to_string();

        let request = CrawlRequest::seed(normalized.clone(), self.max_depth);
        match dispatcher
            .submit_seed(request, self.seed_submit_timeout)
            .await
        {
            Submission::Accepted => {
                let id = TaskId::new();
                tracing::info!("Accepted seed {} as task {}", normalized, id);
                Ok(id)
            }
            Submission::Rejected(reason) => {
                tracing::warn!("Rejected seed {}: {}", normalized, reason);
                Err(SubmitError::Rejected(reason))
            }
        }
    }

    /// Searches the index
    ///
    /// A blank query lists the most recently crawled pages instead, with rank
    /// 0 and the start of the content as snippet.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, TrawlerError> {
        if query.trim().is_empty() {
            let hits = self
                .store
                .recent(self.recent_limit)?
                .into_iter()
                .map(|page| SearchHit {
                    snippet: preview(&page.content),
                    page,
                    rank: 0.0,
                })
                .collect();
            return Ok(hits);
        }

        let hits = self.store.search(query, self.rank_threshold)?;
        tracing::debug!("Search {:?} returned {} hits", query, hits.len());
        Ok(hits)
    }

    /// Looks up the stored record for `url`
    ///
    /// The URL is normalized the same way crawled URLs are; input that does
    /// not normalize is looked up verbatim.
    pub fn page(&self, url: &str) -> Result<Option<CrawledPage>, TrawlerError> {
        let key = normalize_url(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.trim().to_string());
        Ok(self.store.get_page(&key)?)
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_LENGTH) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}
