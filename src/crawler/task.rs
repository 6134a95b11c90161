//! Crawl task execution
//!
//! One crawl task takes a single queued job through the state machine in
//! `state::task_state`:
//!
//! `Pending -> Claiming -> RateLimiting -> Fetching -> Extracting -> Persisting -> Expanding -> Done`
//!
//! Failures never leave the task; they end up in the returned `TaskReport`
//! and the log. Rate-limit denials and transient fetch errors hand the job
//! back to the frontier for a delayed retry instead of blocking the worker.

use crate::crawler::dispatcher::{Frontier, Submission};
use crate::crawler::extractor::extract;
use crate::crawler::fetcher::Fetcher;
use crate::state::{ClaimStore, CrawlState, DomainLimiter};
use crate::storage::{CrawledPage, IndexedStore};
use crate::url::{extract_domain, normalize_url, same_origin};
use crate::CrawlError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Shared collaborators every crawl task runs against
#[derive(Clone)]
pub struct TaskContext {
    pub claims: Arc<dyn ClaimStore>,
    pub limiter: Arc<DomainLimiter>,
    pub fetcher: Fetcher,
    pub store: Arc<dyn IndexedStore>,
    /// Longest extracted text stored, in characters
    pub max_content_length: usize,
    /// Delay before a retried job is re-queued
    pub retry_delay: Duration,
}

/// A URL to crawl at a given depth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    /// Normalized absolute URL
    pub url: String,
    /// Link distance from the seed (0 for the seed itself)
    pub depth: u32,
    /// Deepest level links are followed to
    pub max_depth: u32,
}

impl CrawlRequest {
    /// Creates a depth-0 request
    pub fn seed(url: impl Into<String>, max_depth: u32) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            max_depth,
        }
    }

    /// Request for a link found on this request's page
    pub fn child(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: self.depth + 1,
            max_depth: self.max_depth,
        }
    }
}

/// Attempt counter carried by a job across re-submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// 1-based number of the current attempt
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 1,
            max_attempts,
        }
    }

    /// State for the following attempt, or None once the cap is reached
    pub fn next(&self) -> Option<Self> {
        (self.attempt < self.max_attempts).then(|| Self {
            attempt: self.attempt + 1,
            max_attempts: self.max_attempts,
        })
    }
}

/// The unit of work placed on the dispatcher queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlJob {
    pub request: CrawlRequest,
    pub retry: RetryState,
    /// The URL claim already succeeded; a retried job skips `Claiming`
    pub claimed: bool,
}

impl CrawlJob {
    /// A first attempt at `request`
    pub fn new(request: CrawlRequest, max_attempts: u32) -> Self {
        Self {
            request,
            retry: RetryState::new(max_attempts),
            claimed: false,
        }
    }
}

/// How one task execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Page fetched, stored and expanded
    Success { expanded: usize, dropped: usize },
    /// Another task holds the URL claim
    AlreadyVisited,
    /// Request was deeper than its limit
    DepthExceeded,
    /// Job handed back to the frontier for another attempt
    Retrying { attempt: u32, cause: CrawlError },
    Failed(CrawlError),
}

/// Result of one task execution
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub request: CrawlRequest,
    /// Attempt this execution ran as
    pub attempt: u32,
    /// State the task stopped in
    pub state: CrawlState,
    pub outcome: TaskOutcome,
}

impl TaskReport {
    /// True if the job lives on as a scheduled retry
    pub fn is_retrying(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Retrying { .. })
    }
}

/// Runs one job to a terminal state or a retry point
///
/// # Arguments
///
/// * `ctx` - Claim store, limiter, fetcher and index shared by all tasks
/// * `job` - The job taken off the queue
/// * `frontier` - Where child requests and retries are submitted
pub async fn run_task(ctx: &TaskContext, job: CrawlJob, frontier: &dyn Frontier) -> TaskReport {
    let mut task = Task {
        state: CrawlState::Pending,
        job,
    };

    let outcome = match task.drive(ctx, frontier).await {
        Ok(outcome) => outcome,
        Err(error) => {
            if task.state.can_transition_to(CrawlState::Failed) {
                task.state = CrawlState::Failed;
            }
            tracing::warn!(
                "Crawl of {} failed in {}: {}",
                task.job.request.url,
                task.state,
                error
            );
            TaskOutcome::Failed(error)
        }
    };

    TaskReport {
        attempt: task.job.retry.attempt,
        request: task.job.request,
        state: task.state,
        outcome,
    }
}

struct Task {
    state: CrawlState,
    job: CrawlJob,
}

impl Task {
    fn advance(&mut self, next: CrawlState) -> Result<(), CrawlError> {
        self.state = self
            .state
            .transition(next)
            .map_err(|e| CrawlError::Internal(e.to_string()))?;
        tracing::debug!("{} -> {}", self.job.request.url, next);
        Ok(())
    }

    async fn drive(
        &mut self,
        ctx: &TaskContext,
        frontier: &dyn Frontier,
    ) -> Result<TaskOutcome, CrawlError> {
        let request = self.job.request.clone();

        if !self.job.claimed {
            if request.depth > request.max_depth {
                self.advance(CrawlState::Done)?;
                tracing::debug!(
                    "Dropping {} at depth {} (max {})",
                    request.url,
                    request.depth,
                    request.max_depth
                );
                return Ok(TaskOutcome::DepthExceeded);
            }

            self.advance(CrawlState::Claiming)?;
            match ctx.claims.claim(&request.url) {
                Ok(true) => self.job.claimed = true,
                Ok(false) => {
                    self.advance(CrawlState::Done)?;
                    tracing::debug!("Already visited: {}", request.url);
                    return Ok(TaskOutcome::AlreadyVisited);
                }
                Err(e) => {
                    tracing::error!("Claim store failed for {}: {}", request.url, e);
                    return Err(CrawlError::Store(e.to_string()));
                }
            }
        }

        // Claimed jobs (first attempts and retries alike) continue here
        self.advance(CrawlState::RateLimiting)?;

        let request_url = Url::parse(&request.url)
            .map_err(|e| CrawlError::Internal(format!("unparseable url {}: {}", request.url, e)))?;
        let domain = extract_domain(&request_url)
            .ok_or_else(|| CrawlError::Internal(format!("no host in {}", request.url)))?;

        if !ctx.limiter.try_acquire(&domain) {
            if let Some(wait) = ctx.limiter.time_until_available(&domain, Instant::now()) {
                tracing::debug!("{} is rate limited for another {:?}", domain, wait);
            }
            return self.retry_or_fail(
                ctx,
                frontier,
                CrawlError::RateLimited {
                    retries_exhausted: false,
                },
            );
        }

        self.advance(CrawlState::Fetching)?;
        let fetched = match ctx.fetcher.fetch(&request.url).await {
            Ok(page) => page,
            Err(e) => {
                let cause = CrawlError::from(e);
                if cause.is_retryable() {
                    return self.retry_or_fail(ctx, frontier, cause);
                }
                return Err(cause);
            }
        };

        self.advance(CrawlState::Extracting)?;
        // Links are resolved against where the page really lives, unless a
        // redirect took us off the requested origin.
        let base = match Url::parse(&fetched.final_url) {
            Ok(final_url) if same_origin(&final_url, &request_url) => final_url,
            _ => request_url,
        };
        let extracted = extract(&fetched.body, &base, ctx.max_content_length);

        self.advance(CrawlState::Persisting)?;
        let page = CrawledPage::new(
            request.url.clone(),
            extracted.title,
            extracted.text,
            fetched.status_code,
        );
        if let Err(e) = ctx.store.upsert(&page) {
            tracing::error!("Failed to store {}: {}", request.url, e);
            return Err(CrawlError::Store(e.to_string()));
        }

        self.advance(CrawlState::Expanding)?;
        let mut expanded = 0;
        let mut dropped = 0;
        if request.depth < request.max_depth {
            for link in extracted.links {
                let Ok(link) = normalize_url(&link).map(String::from) else {
                    continue;
                };
                match frontier.submit(request.child(link.clone())) {
                    Submission::Accepted => expanded += 1,
                    Submission::Rejected(reason) => {
                        tracing::warn!("Dropped link {} from {}: {}", link, request.url, reason);
                        dropped += 1;
                    }
                }
            }
        }

        self.advance(CrawlState::Done)?;
        tracing::info!(
            "Crawled {} (depth {}, {} links queued)",
            request.url,
            request.depth,
            expanded
        );

        Ok(TaskOutcome::Success { expanded, dropped })
    }

    /// Hands the job back for another attempt, or fails once attempts run out
    fn retry_or_fail(
        &mut self,
        ctx: &TaskContext,
        frontier: &dyn Frontier,
        cause: CrawlError,
    ) -> Result<TaskOutcome, CrawlError> {
        debug_assert!(self.state.is_retry_point());

        let Some(next) = self.job.retry.next() else {
            return Err(match cause {
                CrawlError::RateLimited { .. } => CrawlError::RateLimited {
                    retries_exhausted: true,
                },
                other => other,
            });
        };

        let job = CrawlJob {
            request: self.job.request.clone(),
            retry: next,
            claimed: self.job.claimed,
        };

        match frontier.retry(job, ctx.retry_delay) {
            Submission::Accepted => {
                tracing::warn!(
                    "Retrying {} in {:?} (attempt {}/{}): {}",
                    self.job.request.url,
                    ctx.retry_delay,
                    next.attempt,
                    next.max_attempts,
                    cause
                );
                Ok(TaskOutcome::Retrying {
                    attempt: next.attempt,
                    cause,
                })
            }
            Submission::Rejected(reason) => Err(CrawlError::DispatchRejected(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgentConfig;
    use crate::state::MemoryClaims;
    use crate::storage::{SqliteStorage, StorageError, StorageResult};
    use crate::RejectReason;
    use std::sync::Mutex;

    /// Frontier that records everything submitted to it
    #[derive(Default)]
    struct RecordingFrontier {
        submitted: Mutex<Vec<CrawlRequest>>,
        retried: Mutex<Vec<(CrawlJob, Duration)>>,
        reject_submit: Option<RejectReason>,
        reject_retry: Option<RejectReason>,
    }

    impl Frontier for RecordingFrontier {
        fn submit(&self, request: CrawlRequest) -> Submission {
            if let Some(reason) = self.reject_submit {
                return Submission::Rejected(reason);
            }
            self.submitted.lock().unwrap().push(request);
            Submission::Accepted
        }

        fn retry(&self, job: CrawlJob, delay: Duration) -> Submission {
            if let Some(reason) = self.reject_retry {
                return Submission::Rejected(reason);
            }
            self.retried.lock().unwrap().push((job, delay));
            Submission::Accepted
        }
    }

    struct FailingStore;

    impl IndexedStore for FailingStore {
        fn upsert(&self, _page: &CrawledPage) -> StorageResult<()> {
            Err(StorageError::Database("disk full".to_string()))
        }
        fn search(&self, _q: &str, _t: f64) -> StorageResult<Vec<crate::storage::SearchHit>> {
            Ok(Vec::new())
        }
        fn recent(&self, _limit: usize) -> StorageResult<Vec<CrawledPage>> {
            Ok(Vec::new())
        }
        fn get_page(&self, _url: &str) -> StorageResult<Option<CrawledPage>> {
            Ok(None)
        }
        fn count_pages(&self) -> StorageResult<u64> {
            Ok(0)
        }
        fn status_breakdown(&self) -> StorageResult<Vec<(u16, u64)>> {
            Ok(Vec::new())
        }
    }

    fn create_test_context() -> TaskContext {
        TaskContext {
            claims: Arc::new(MemoryClaims::new(Duration::from_secs(3600))),
            limiter: Arc::new(DomainLimiter::new(Duration::from_secs(60))),
            fetcher: Fetcher::new(&UserAgentConfig::default(), Duration::from_secs(1)).unwrap(),
            store: Arc::new(SqliteStorage::new_in_memory().unwrap()),
            max_content_length: 10_000,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_child_request_increments_depth() {
        let seed = CrawlRequest::seed("https://example.com/", 2);
        let child = seed.child("https://example.com/a");

        assert_eq!(child.depth, 1);
        assert_eq!(child.max_depth, 2);
        assert_eq!(child.url, "https://example.com/a");
    }

    #[test]
    fn test_retry_state_caps_attempts() {
        let first = RetryState::new(3);
        let second = first.next().unwrap();
        let third = second.next().unwrap();

        assert_eq!(second.attempt, 2);
        assert_eq!(third.attempt, 3);
        assert!(third.next().is_none());
        assert!(RetryState::new(1).next().is_none());
    }

    #[tokio::test]
    async fn test_depth_beyond_limit_dropped_before_claim() {
        let ctx = create_test_context();
        let frontier = RecordingFrontier::default();
        let request = CrawlRequest {
            url: "https://example.com/deep".to_string(),
            depth: 3,
            max_depth: 2,
        };

        let report = run_task(&ctx, CrawlJob::new(request, 3), &frontier).await;

        assert_eq!(report.outcome, TaskOutcome::DepthExceeded);
        assert_eq!(report.state, CrawlState::Done);
        // The URL was never claimed
        assert!(ctx.claims.claim("https://example.com/deep").unwrap());
    }

    #[tokio::test]
    async fn test_claimed_url_reports_already_visited() {
        let ctx = create_test_context();
        let frontier = RecordingFrontier::default();
        ctx.claims.claim("https://example.com/").unwrap();

        let job = CrawlJob::new(CrawlRequest::seed("https://example.com/", 2), 3);
        let report = run_task(&ctx, job, &frontier).await;

        assert_eq!(report.outcome, TaskOutcome::AlreadyVisited);
        assert_eq!(report.state, CrawlState::Done);
    }

    #[tokio::test]
    async fn test_rate_limited_job_is_retried_with_claim_kept() {
        let ctx = create_test_context();
        let frontier = RecordingFrontier::default();
        assert!(ctx.limiter.try_acquire("example.com"));

        let job = CrawlJob::new(CrawlRequest::seed("https://example.com/", 2), 3);
        let report = run_task(&ctx, job, &frontier).await;

        assert_eq!(
            report.outcome,
            TaskOutcome::Retrying {
                attempt: 2,
                cause: CrawlError::RateLimited {
                    retries_exhausted: false
                }
            }
        );
        assert_eq!(report.state, CrawlState::RateLimiting);

        let retried = frontier.retried.lock().unwrap();
        assert_eq!(retried.len(), 1);
        assert!(retried[0].0.claimed);
        assert_eq!(retried[0].0.retry.attempt, 2);
        assert_eq!(retried[0].1, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausted_on_last_attempt() {
        let ctx = create_test_context();
        let frontier = RecordingFrontier::default();
        assert!(ctx.limiter.try_acquire("example.com"));

        let job = CrawlJob {
            request: CrawlRequest::seed("https://example.com/", 2),
            retry: RetryState {
                attempt: 3,
                max_attempts: 3,
            },
            claimed: true,
        };
        let report = run_task(&ctx, job, &frontier).await;

        assert_eq!(
            report.outcome,
            TaskOutcome::Failed(CrawlError::RateLimited {
                retries_exhausted: true
            })
        );
        assert_eq!(report.state, CrawlState::Failed);
        assert!(frontier.retried.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_retry_fails_task() {
        let ctx = create_test_context();
        let frontier = RecordingFrontier {
            reject_retry: Some(RejectReason::ShuttingDown),
            ..Default::default()
        };
        assert!(ctx.limiter.try_acquire("example.com"));

        let job = CrawlJob::new(CrawlRequest::seed("https://example.com/", 2), 3);
        let report = run_task(&ctx, job, &frontier).await;

        assert_eq!(
            report.outcome,
            TaskOutcome::Failed(CrawlError::DispatchRejected(RejectReason::ShuttingDown))
        );
    }

    #[tokio::test]
    async fn test_full_queue_drops_links_but_page_succeeds() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_raw(
                "<html><title>Hub</title><a href=\"/a\">a</a><a href=\"/b\">b</a></html>",
                "text/html",
            ))
            .mount(&server)
            .await;

        let ctx = TaskContext {
            limiter: Arc::new(DomainLimiter::new(Duration::ZERO)),
            ..create_test_context()
        };
        let frontier = RecordingFrontier {
            reject_submit: Some(RejectReason::QueueFull),
            ..Default::default()
        };
        let url = format!("{}/", server.uri());
        let job = CrawlJob::new(CrawlRequest::seed(url.clone(), 2), 3);

        let report = run_task(&ctx, job, &frontier).await;

        assert_eq!(
            report.outcome,
            TaskOutcome::Success {
                expanded: 0,
                dropped: 2
            }
        );
        assert_eq!(report.state, CrawlState::Done);
        assert!(frontier.retried.lock().unwrap().is_empty());
        assert_eq!(ctx.store.get_page(&url).unwrap().unwrap().title, "Hub");
    }

    #[tokio::test]
    async fn test_non_html_response_fails_without_storing() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a], "image/png"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ctx = TaskContext {
            limiter: Arc::new(DomainLimiter::new(Duration::ZERO)),
            ..create_test_context()
        };
        let frontier = RecordingFrontier::default();
        let url = format!("{}/logo.png", server.uri());
        let job = CrawlJob::new(CrawlRequest::seed(url.clone(), 2), 3);

        let report = run_task(&ctx, job, &frontier).await;

        assert!(matches!(
            report.outcome,
            TaskOutcome::Failed(CrawlError::Unsupported(_))
        ));
        assert_eq!(report.state, CrawlState::Failed);
        assert!(frontier.retried.lock().unwrap().is_empty());
        assert!(ctx.store.get_page(&url).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_reported() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_raw(
                    "<html><title>Hi</title><a href=\"/a\">a</a></html>",
                    "text/html",
                ),
            )
            .mount(&server)
            .await;

        let ctx = TaskContext {
            store: Arc::new(FailingStore),
            ..create_test_context()
        };
        let frontier = RecordingFrontier::default();
        let job = CrawlJob::new(CrawlRequest::seed(format!("{}/", server.uri()), 2), 3);

        let report = run_task(&ctx, job, &frontier).await;

        assert_eq!(
            report.outcome,
            TaskOutcome::Failed(CrawlError::Store("Database error: disk full".to_string()))
        );
        assert_eq!(report.state, CrawlState::Failed);
        // Nothing is expanded from a page that was not stored
        assert!(frontier.submitted.lock().unwrap().is_empty());
    }
}
