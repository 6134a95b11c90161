//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with a fixed timeout and error classification
//! - HTML content extraction and same-origin link discovery
//! - The per-URL crawl task state machine
//! - The bounded work dispatcher and its worker pool
//! - Overall crawl coordination

mod coordinator;
mod dispatcher;
mod extractor;
mod fetcher;
mod task;

pub use coordinator::{run_crawl, Coordinator};
pub use dispatcher::{DispatchHandle, DispatchOptions, Dispatcher, Frontier, Submission};
pub use extractor::{extract, ExtractedPage, FALLBACK_TITLE, MAX_TITLE_LENGTH};
pub use fetcher::{build_http_client, FetchError, FetchedPage, Fetcher, MAX_REDIRECTS};
pub use task::{
    run_task, CrawlJob, CrawlRequest, RetryState, TaskContext, TaskOutcome, TaskReport,
};
