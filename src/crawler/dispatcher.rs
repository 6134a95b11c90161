//! Work dispatcher
//!
//! A bounded FIFO queue feeding a fixed pool of worker tasks. Each worker
//! runs one job's state machine to completion before taking the next.
//!
//! # Backpressure
//!
//! | Submission | When the queue is full |
//! |------------|------------------------|
//! | Link expansion (`submit`) | Rejected immediately with `QueueFull` |
//! | Seed (`submit_seed`) | Waits up to the seed timeout, then `QueueFull` |
//! | Retry (`retry`) | A detached timer waits out the delay, then waits for a slot |
//!
//! Every accepted job is counted in flight until it reaches a terminal
//! state; a job waiting for its retry stays counted. `wait_idle` resolves
//! when the count drops to zero, which is how a crawl knows it is finished.

use crate::config::CrawlerConfig;
use crate::crawler::task::{run_task, CrawlJob, CrawlRequest, TaskContext};
use crate::output::CrawlStats;
use crate::RejectReason;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

/// Where crawl tasks send follow-up work
pub trait Frontier: Send + Sync {
    /// Queues a new request without waiting
    fn submit(&self, request: CrawlRequest) -> Submission;

    /// Re-queues an in-flight job after `delay`
    fn retry(&self, job: CrawlJob, delay: Duration) -> Submission;
}

/// Answer to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    Rejected(RejectReason),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

enum Message {
    Run(CrawlJob),
    Stop,
}

/// Sizing of the dispatcher
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_attempts: u32,
}

impl DispatchOptions {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            workers: config.workers as usize,
            queue_capacity: config.queue_capacity as usize,
            max_attempts: config.max_attempts,
        }
    }
}

struct Shared {
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
    max_attempts: u32,
    stats: Arc<CrawlStats>,
}

/// Cloneable submission side of the dispatcher
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Message>,
    shared: Arc<Shared>,
}

impl DispatchHandle {
    /// Number of jobs queued, running or waiting for a retry
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Statistics fed by the workers
    pub fn stats(&self) -> &CrawlStats {
        &self.shared.stats
    }

    /// Submits a seed request, waiting up to `timeout` for queue capacity
    pub async fn submit_seed(&self, request: CrawlRequest, timeout: Duration) -> Submission {
        if let Err(reason) = self.reserve() {
            return Submission::Rejected(reason);
        }

        let job = CrawlJob::new(request, self.shared.max_attempts);
        match self.tx.send_timeout(Message::Run(job), timeout).await {
            Ok(()) => Submission::Accepted,
            Err(SendTimeoutError::Timeout(_)) => {
                self.release();
                Submission::Rejected(RejectReason::QueueFull)
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.release();
                Submission::Rejected(RejectReason::ShuttingDown)
            }
        }
    }

    /// Resolves once nothing is queued, running or waiting for a retry
    pub async fn wait_idle(&self) {
        loop {
            // Register before checking so a release in between is not missed
            let notified = self.shared.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn reserve(&self) -> Result<(), RejectReason> {
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.shared.accepting.load(Ordering::SeqCst) {
            Ok(())
        } else {
            self.release();
            Err(RejectReason::ShuttingDown)
        }
    }

    fn release(&self) {
        if self.shared.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.idle.notify_waiters();
        }
    }
}

impl Frontier for DispatchHandle {
    fn submit(&self, request: CrawlRequest) -> Submission {
        if let Err(reason) = self.reserve() {
            return Submission::Rejected(reason);
        }

        let job = CrawlJob::new(request, self.shared.max_attempts);
        match self.tx.try_send(Message::Run(job)) {
            Ok(()) => Submission::Accepted,
            Err(TrySendError::Full(_)) => {
                self.release();
                Submission::Rejected(RejectReason::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.release();
                Submission::Rejected(RejectReason::ShuttingDown)
            }
        }
    }

    fn retry(&self, job: CrawlJob, delay: Duration) -> Submission {
        // The job keeps the in-flight slot it already holds, so retries
        // are not subject to the accepting flag.
        if self.tx.is_closed() {
            return Submission::Rejected(RejectReason::ShuttingDown);
        }

        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let url = job.request.url.clone();
            if handle.tx.send(Message::Run(job)).await.is_err() {
                tracing::warn!("Dropped retry of {}: queue closed", url);
                handle.release();
            }
        });

        Submission::Accepted
    }
}

/// Owns the worker pool
pub struct Dispatcher {
    handle: DispatchHandle,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Starts `options.workers` workers executing jobs against `ctx`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(ctx: TaskContext, options: DispatchOptions, stats: Arc<CrawlStats>) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let handle = DispatchHandle {
            tx,
            shared: Arc::new(Shared {
                accepting: AtomicBool::new(true),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                max_attempts: options.max_attempts,
                stats,
            }),
        };

        let rx = Arc::new(Mutex::new(rx));
        let ctx = Arc::new(ctx);
        let workers = (0..options.workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&rx),
                    Arc::clone(&ctx),
                    handle.clone(),
                ))
            })
            .collect();

        tracing::info!(
            "Dispatcher started: {} workers, queue capacity {}",
            options.workers,
            options.queue_capacity
        );

        Self { handle, workers }
    }

    /// A cloneable submission handle
    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    /// Resolves once the crawl frontier has drained
    pub async fn wait_idle(&self) {
        self.handle.wait_idle().await
    }

    /// Stops accepting work, drains everything in flight, then stops the workers
    pub async fn shutdown(self) {
        self.handle.shared.accepting.store(false, Ordering::SeqCst);
        tracing::info!(
            "Dispatcher draining {} in-flight jobs",
            self.handle.in_flight()
        );

        self.handle.wait_idle().await;

        for _ in 0..self.workers.len() {
            if self.handle.tx.send(Message::Stop).await.is_err() {
                break;
            }
        }

        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!("Worker panicked: {}", e);
            }
        }

        tracing::info!("Dispatcher stopped");
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Message>>>,
    ctx: Arc<TaskContext>,
    handle: DispatchHandle,
) {
    tracing::debug!("Worker {} started", id);

    loop {
        let message = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        match message {
            Some(Message::Run(job)) => {
                let url = job.request.url.clone();
                // A panicking task must still give back its in-flight slot
                let task = {
                    let ctx = Arc::clone(&ctx);
                    let handle = handle.clone();
                    tokio::spawn(async move { run_task(&ctx, job, &handle).await })
                };

                match task.await {
                    Ok(report) => {
                        handle.stats().record(&report);
                        if !report.is_retrying() {
                            handle.release();
                        }
                    }
                    Err(e) => {
                        tracing::error!("Crawl task for {} aborted: {}", url, e);
                        handle.stats().record_aborted();
                        handle.release();
                    }
                }
            }
            Some(Message::Stop) | None => break,
        }
    }

    tracing::debug!("Worker {} stopped", id);
}
