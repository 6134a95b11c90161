//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! crawl tasks, the dispatcher and the full crawl cycle end-to-end.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use trawler::config::{Config, DedupBackend, UserAgentConfig};
use trawler::crawler::{
    run_task, Coordinator, CrawlJob, CrawlRequest, DispatchOptions, Dispatcher, Fetcher,
    Frontier, RetryState, Submission, TaskContext, TaskOutcome,
};
use trawler::output::CrawlStats;
use trawler::service::CrawlService;
use trawler::state::{ClaimStore, CrawlState, DomainLimiter, MemoryClaims};
use trawler::storage::{IndexedStore, SqliteStorage};
use trawler::CrawlError;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Frontier that records submissions instead of running them
#[derive(Default)]
struct RecordingFrontier {
    submitted: Mutex<Vec<CrawlRequest>>,
    retried: Mutex<Vec<CrawlJob>>,
}

impl Frontier for RecordingFrontier {
    fn submit(&self, request: CrawlRequest) -> Submission {
        self.submitted.lock().unwrap().push(request);
        Submission::Accepted
    }

    fn retry(&self, job: CrawlJob, _delay: Duration) -> Submission {
        self.retried.lock().unwrap().push(job);
        Submission::Accepted
    }
}

fn test_user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

/// Creates a task context over `storage` with the given politeness interval
fn create_test_context(storage: Arc<SqliteStorage>, politeness: Duration) -> TaskContext {
    TaskContext {
        claims: Arc::new(MemoryClaims::new(Duration::from_secs(3600))),
        limiter: Arc::new(DomainLimiter::new(politeness)),
        fetcher: Fetcher::new(&test_user_agent(), Duration::from_secs(2)).unwrap(),
        store: storage,
        max_content_length: 10_000,
        retry_delay: Duration::from_millis(10),
    }
}

fn html_page(title: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            title, body
        ),
        "text/html",
    )
}

#[tokio::test]
async fn test_same_domain_links_expanded_one_level() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            "Home",
            r#"<p>Welcome</p>
            <a href="/a">A</a>
            <a href="/a#section">A again</a>
            <a href="https://other.com/x">Elsewhere</a>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let ctx = create_test_context(storage.clone(), Duration::ZERO);
    let frontier = RecordingFrontier::default();

    let seed = CrawlRequest::seed(format!("{}/", base_url), 2);
    let report = run_task(&ctx, CrawlJob::new(seed, 3), &frontier).await;

    assert_eq!(
        report.outcome,
        TaskOutcome::Success {
            expanded: 1,
            dropped: 0
        }
    );
    assert_eq!(report.state, CrawlState::Done);

    let submitted = frontier.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].url, format!("{}/a", base_url));
    assert_eq!(submitted[0].depth, 1);
    assert_eq!(submitted[0].max_depth, 2);

    let page = storage.get_page(&format!("{}/", base_url)).unwrap().unwrap();
    assert_eq!(page.title, "Home");
    assert_eq!(page.status_code, 200);
    assert!(page.content.contains("Welcome"));
}

#[tokio::test]
async fn test_no_expansion_at_max_depth() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/leaf"))
        .respond_with(html_page("Leaf", r#"<a href="/next">Next</a>"#))
        .mount(&mock_server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let ctx = create_test_context(storage.clone(), Duration::ZERO);
    let frontier = RecordingFrontier::default();

    let request = CrawlRequest {
        url: format!("{}/leaf", base_url),
        depth: 1,
        max_depth: 1,
    };
    let report = run_task(&ctx, CrawlJob::new(request, 3), &frontier).await;

    assert_eq!(
        report.outcome,
        TaskOutcome::Success {
            expanded: 0,
            dropped: 0
        }
    );
    assert!(frontier.submitted.lock().unwrap().is_empty());
    assert_eq!(storage.count_pages().unwrap(), 1);
}

#[tokio::test]
async fn test_http_error_fails_without_retry() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let ctx = create_test_context(storage.clone(), Duration::ZERO);
    let frontier = RecordingFrontier::default();

    let seed = CrawlRequest::seed(format!("{}/", base_url), 2);
    let report = run_task(&ctx, CrawlJob::new(seed, 3), &frontier).await;

    assert_eq!(report.outcome, TaskOutcome::Failed(CrawlError::FetchHttp(500)));
    assert_eq!(report.state, CrawlState::Failed);
    if let TaskOutcome::Failed(error) = &report.outcome {
        assert_eq!(error.to_string(), "http status 500");
    }

    assert!(frontier.retried.lock().unwrap().is_empty());
    assert_eq!(storage.count_pages().unwrap(), 0);
}

#[tokio::test]
async fn test_timeout_is_retried_then_fails() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html_page("Slow", "").set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let ctx = TaskContext {
        fetcher: Fetcher::new(&test_user_agent(), Duration::from_millis(200)).unwrap(),
        ..create_test_context(storage.clone(), Duration::ZERO)
    };
    let frontier = RecordingFrontier::default();

    let request = CrawlRequest::seed(format!("{}/slow", base_url), 2);
    let report = run_task(&ctx, CrawlJob::new(request.clone(), 3), &frontier).await;

    assert_eq!(
        report.outcome,
        TaskOutcome::Retrying {
            attempt: 2,
            cause: CrawlError::FetchTimeout
        }
    );
    assert_eq!(report.state, CrawlState::Fetching);
    assert_eq!(frontier.retried.lock().unwrap().len(), 1);

    let last_attempt = CrawlJob {
        request,
        retry: RetryState {
            attempt: 3,
            max_attempts: 3,
        },
        claimed: true,
    };
    let report = run_task(&ctx, last_attempt, &frontier).await;

    assert_eq!(report.outcome, TaskOutcome::Failed(CrawlError::FetchTimeout));
    assert_eq!(storage.count_pages().unwrap(), 0);
}

#[tokio::test]
async fn test_identification_header_sent() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header(
            "user-agent",
            "TestBot/1.0.0 (+https://example.com/contact; test@example.com)",
        ))
        .respond_with(html_page("Hello", "hi"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let ctx = create_test_context(storage, Duration::ZERO);
    let frontier = RecordingFrontier::default();

    let seed = CrawlRequest::seed(format!("{}/", base_url), 0);
    let report = run_task(&ctx, CrawlJob::new(seed, 3), &frontier).await;

    assert!(matches!(report.outcome, TaskOutcome::Success { .. }));
}

#[tokio::test]
async fn test_recrawl_overwrites_page() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("First", "original words"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Second", "replacement words"))
        .mount(&mock_server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let ctx = create_test_context(storage.clone(), Duration::ZERO);
    let frontier = RecordingFrontier::default();
    let url = format!("{}/", base_url);

    run_task(&ctx, CrawlJob::new(CrawlRequest::seed(url.clone(), 0), 3), &frontier).await;
    ctx.claims.clear().unwrap();
    run_task(&ctx, CrawlJob::new(CrawlRequest::seed(url.clone(), 0), 3), &frontier).await;

    assert_eq!(storage.count_pages().unwrap(), 1);
    assert_eq!(storage.get_page(&url).unwrap().unwrap().title, "Second");
    assert!(storage.search("original", 0.0).unwrap().is_empty());
    assert_eq!(storage.search("replacement", 0.0).unwrap().len(), 1);
}

#[tokio::test]
async fn test_rate_limit_exhaustion_keeps_claim() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .respond_with(html_page("Never", ""))
        .expect(0)
        .mount(&mock_server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let ctx = create_test_context(storage.clone(), Duration::from_secs(60));
    let limiter = ctx.limiter.clone();
    let stats = Arc::new(CrawlStats::new());
    let dispatcher = Dispatcher::start(
        ctx,
        DispatchOptions {
            workers: 2,
            queue_capacity: 16,
            max_attempts: 3,
        },
        stats.clone(),
    );

    // Another request to the domain was just issued
    assert!(limiter.try_acquire("127.0.0.1"));

    let handle = dispatcher.handle();
    let seed = CrawlRequest::seed(format!("{}/", base_url), 2);
    assert_eq!(
        handle.submit_seed(seed.clone(), Duration::from_secs(1)).await,
        Submission::Accepted
    );
    dispatcher.wait_idle().await;

    let summary = stats.snapshot();
    assert_eq!(summary.retries, 2);
    assert_eq!(summary.rate_limit_exhausted, 1);
    assert_eq!(summary.succeeded, 0);

    // The failed crawl still holds its claim
    assert!(handle
        .submit_seed(seed, Duration::from_secs(1))
        .await
        .is_accepted());
    dispatcher.wait_idle().await;
    assert_eq!(stats.snapshot().already_visited, 1);

    dispatcher.shutdown().await;
    assert_eq!(storage.count_pages().unwrap(), 0);
}

#[tokio::test]
async fn test_second_request_to_domain_is_deferred() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/one"))
        .respond_with(html_page("One", "first"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/two"))
        .respond_with(html_page("Two", "second"))
        .mount(&mock_server)
        .await;

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let ctx = create_test_context(storage.clone(), Duration::from_millis(300));
    let stats = Arc::new(CrawlStats::new());
    let dispatcher = Dispatcher::start(
        ctx,
        DispatchOptions {
            workers: 2,
            queue_capacity: 16,
            max_attempts: 100,
        },
        stats.clone(),
    );

    let handle = dispatcher.handle();
    for page in ["one", "two"] {
        let seed = CrawlRequest::seed(format!("{}/{}", base_url, page), 0);
        assert!(handle
            .submit_seed(seed, Duration::from_secs(1))
            .await
            .is_accepted());
    }

    dispatcher.shutdown().await;

    let summary = stats.snapshot();
    assert_eq!(summary.succeeded, 2);
    assert!(summary.retries >= 1);
    assert_eq!(storage.count_pages().unwrap(), 2);
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            "Home",
            r#"<p>Start here</p><a href="/rust">Language</a><a href="/tokio">Runtime</a>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rust"))
        .respond_with(html_page(
            "Rust Language",
            r#"<p>Rust is fast</p><a href="/">Home</a><a href="/tokio">Tokio</a>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tokio"))
        .respond_with(html_page(
            "Tokio",
            r#"<p>An async runtime for rust</p><a href="/deep">Deep</a>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deep"))
        .respond_with(html_page("Too deep", ""))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = Config::default();
    config.crawler.max_depth = 1;
    config.crawler.workers = 4;
    config.crawler.politeness_interval_ms = 0;
    config.crawler.retry_delay_ms = 10;
    config.crawler.dedup_backend = DedupBackend::Memory;
    config.user_agent = test_user_agent();

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let coordinator = Coordinator::new(&config, storage.clone(), false).unwrap();

    let accepted = coordinator.seed(&[format!("{}/", base_url)]).await;
    assert_eq!(accepted, 1);

    let summary = coordinator.run(std::future::pending()).await;

    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.total_failed(), 0);
    assert_eq!(summary.already_visited, 0);
    assert_eq!(storage.count_pages().unwrap(), 3);

    let service = CrawlService::new(storage, &config);

    let hits = service.search("rust").unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].page.url, format!("{}/rust", base_url));
    assert!(hits[0].rank >= hits[1].rank);

    let recent = service.search("").unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent.iter().all(|hit| hit.rank == 0.0));
}

#[tokio::test]
async fn test_sqlite_claims_survive_reopen() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Home", "hello"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("trawler.db");

    let mut config = Config::default();
    config.crawler.politeness_interval_ms = 0;
    config.user_agent = test_user_agent();

    for _ in 0..2 {
        let storage = Arc::new(SqliteStorage::new(&db_path).unwrap());
        let coordinator = Coordinator::new(&config, storage, false).unwrap();
        coordinator.seed(&[format!("{}/", base_url)]).await;
        coordinator.run(std::future::pending()).await;
    }

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_pages().unwrap(), 1);
}
