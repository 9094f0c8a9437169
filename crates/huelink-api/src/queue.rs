//! Rate-limited task queue.
//!
//! Serializes asynchronous operations to at most `requests_per_second`,
//! strictly FIFO, one at a time. Each queue owns its own drain task, so two
//! queues never share a rate limit.
//!
//! A queue may bound its backlog. A task admitted past the bound is refused
//! immediately with [`Error::Backpressure`] instead of being silently
//! dropped, so callers never wait on a request that will not run.
//!
//! ```rust,ignore
//! let queue = RateLimitedQueue::new("lights", QueueConfig::per_second(10));
//! let ack = queue.enqueue(async move { client.put(path, &body).await }).await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Error;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

// ── QueueConfig ──────────────────────────────────────────────────────

/// Rate and backlog limits for one queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueConfig {
    pub requests_per_second: f64,
    /// Maximum number of admitted tasks that have not yet settled.
    /// `None` means unbounded.
    pub max_queue_length: Option<usize>,
}

impl QueueConfig {
    pub fn per_second(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            max_queue_length: None,
        }
    }

    pub fn with_max_queue_length(mut self, max: usize) -> Self {
        self.max_queue_length = Some(max);
        self
    }

    /// Minimum spacing between two dispatches.
    pub fn interval(&self) -> Duration {
        if self.requests_per_second > 0.0 && self.requests_per_second.is_finite() {
            Duration::from_secs_f64(1.0 / self.requests_per_second)
        } else {
            Duration::ZERO
        }
    }
}

// ── RateLimitedQueue ─────────────────────────────────────────────────

/// FIFO queue that dispatches at most one task per interval.
///
/// Must be created inside a Tokio runtime; the drain task is spawned on
/// construction and exits once the queue is dropped and its backlog drained.
#[derive(Debug)]
pub struct RateLimitedQueue {
    name: &'static str,
    config: QueueConfig,
    jobs: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
}

impl RateLimitedQueue {
    pub fn new(name: &'static str, config: QueueConfig) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(name, config.interval(), rx));

        Self {
            name,
            config,
            jobs,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> QueueConfig {
        self.config
    }

    /// Number of admitted tasks that have not settled yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Admit `task` and return a future that resolves with its output.
    ///
    /// Admission happens at call time, not on first poll, so the order of
    /// `enqueue` calls is the dispatch order. When the backlog is full the
    /// returned future resolves to [`Error::Backpressure`] and `task` is
    /// dropped without running.
    pub fn enqueue<F, T>(&self, task: F) -> impl Future<Output = Result<T, Error>> + Send + 'static
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        let name = self.name;
        let admitted = self.admit(task);
        async move {
            let rx = admitted?;
            rx.await.map_err(|_| Error::QueueClosed { queue: name })?
        }
    }

    fn admit<F, T>(&self, task: F) -> Result<oneshot::Receiver<Result<T, Error>>, Error>
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        let limit = self.config.max_queue_length.unwrap_or(usize::MAX);
        let reserved = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1));
        if reserved.is_err() {
            debug!(queue = self.name, capacity = limit, "queue full, refusing task");
            return Err(Error::Backpressure {
                queue: self.name,
                capacity: limit,
            });
        }

        let (tx, rx) = oneshot::channel();
        let pending = Arc::clone(&self.pending);
        let job: Job = Box::pin(async move {
            let output = task.await;
            pending.fetch_sub(1, Ordering::AcqRel);
            // Receiver gone means the caller stopped waiting; the work still ran.
            let _ = tx.send(output);
        });

        if self.jobs.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::QueueClosed { queue: self.name });
        }
        Ok(rx)
    }
}

/// Single drain loop: wait out the interval since the last dispatch, run the
/// oldest job to completion, repeat.
async fn drain(name: &'static str, interval: Duration, mut rx: mpsc::UnboundedReceiver<Job>) {
    let mut last_dispatch: Option<Instant> = None;

    while let Some(job) = rx.recv().await {
        if let Some(last) = last_dispatch {
            let wait = interval.saturating_sub(last.elapsed());
            if !wait.is_zero() {
                trace!(queue = name, ?wait, "throttling");
                tokio::time::sleep(wait).await;
            }
        }
        last_dispatch = Some(Instant::now());
        job.await;
    }

    debug!(queue = name, "queue drained and closed");
}

// ── Tests ────────────────────────────────────────────────────────────
