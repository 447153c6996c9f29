//! Worker Pool
//!
//! A fixed number of workers pulling jobs from a shared queue. Jobs carry a
//! scheduling priority and an optional execution timeout:
//! - **Standard** jobs queue at the back, **First** jobs at the front, and
//!   **Immediate** jobs skip the queue and start on a fresh task.
//! - A job that waited in the queue longer than its execution timeout is
//!   canceled without running.
//! - A job that runs longer than its execution timeout is abandoned: its future
//!   is dropped and the job is told so.

use crate::invocation::task::SchedulingPriority;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Unit of work accepted by the pool.
pub trait Job: Send + 'static {
    fn priority(&self) -> SchedulingPriority {
        SchedulingPriority::Standard
    }

    fn execution_timeout(&self) -> Option<Duration> {
        None
    }

    fn description(&self) -> String;

    /// Produces the job's work. Called at most once.
    fn start(&mut self) -> JobFuture;

    /// Called instead of, or after dropping, the future from `start`.
    fn run_canceled(&mut self, abandoned: bool);
}

struct Queued {
    job: Box<dyn Job>,
    enqueued_at: Instant,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub worker_count: usize,
    pub queued: usize,
    pub active: usize,
    pub completed: u64,
    pub canceled: u64,
    pub abandoned: u64,
}

pub struct WorkerPool {
    worker_count: usize,
    queue: Mutex<VecDeque<Queued>>,
    available: Notify,
    started: AtomicBool,
    stopped: AtomicBool,
    active: AtomicUsize,
    completed: AtomicU64,
    canceled: AtomicU64,
    abandoned: AtomicU64,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Arc<Self> {
        Arc::new(Self {
            worker_count,
            queue: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            canceled: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
        })
    }

    /// Spawns the workers. A pool with zero workers never starts.
    pub fn start(self: &Arc<Self>) {
        if self.worker_count == 0 || self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::info!("Starting {} invocation workers", self.worker_count);

        for worker_id in 0..self.worker_count {
            let pool = self.clone();
            tokio::spawn(async move {
                pool.worker_loop(worker_id).await;
            });
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.stopped.load(Ordering::Acquire)
    }

    /// Stops the workers once their current job finishes. Queued jobs are
    /// canceled.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<Queued> = self.queue.lock().drain(..).collect();
        for mut queued in drained {
            queued.job.run_canceled(false);
            self.canceled.fetch_add(1, Ordering::Relaxed);
        }
        self.available.notify_waiters();
    }

    pub fn submit(self: &Arc<Self>, job: Box<dyn Job>) {
        let queued = Queued {
            job,
            enqueued_at: Instant::now(),
        };

        match queued.job.priority() {
            SchedulingPriority::Immediate => {
                let pool = self.clone();
                tokio::spawn(async move {
                    pool.run_job(queued).await;
                });
                return;
            }
            SchedulingPriority::First => self.queue.lock().push_front(queued),
            SchedulingPriority::Standard => self.queue.lock().push_back(queued),
        }

        self.available.notify_one();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            worker_count: self.worker_count,
            queued: self.queue.lock().len(),
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }

    async fn worker_loop(&self, worker_id: usize) {
        tracing::debug!("Worker {} started", worker_id);

        loop {
            if self.stopped.load(Ordering::Acquire) {
                break;
            }

            let next = self.queue.lock().pop_front();
            match next {
                Some(queued) => self.run_job(queued).await,
                None => self.available.notified().await,
            }
        }

        tracing::debug!("Worker {} stopped", worker_id);
    }

    async fn run_job(&self, queued: Queued) {
        let Queued {
            mut job,
            enqueued_at,
        } = queued;
        let limit = job.execution_timeout();

        if let Some(limit) = limit
            && enqueued_at.elapsed() >= limit
        {
            tracing::debug!("Canceling {} after {:?} in queue", job.description(), enqueued_at.elapsed());
            job.run_canceled(false);
            self.canceled.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.active.fetch_add(1, Ordering::Relaxed);
        let work = AbortOnDrop(tokio::spawn(job.start()));

        let finished = match limit {
            Some(limit) => tokio::time::timeout(limit, work).await.ok(),
            None => Some(work.await),
        };
        self.active.fetch_sub(1, Ordering::Relaxed);

        match finished {
            Some(Ok(())) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Some(Err(e)) => {
                tracing::error!("Job {} failed: {}", job.description(), e);
            }
            None => {
                tracing::warn!("Abandoning {} after {:?}", job.description(), limit.unwrap_or_default());
                job.run_canceled(true);
                self.abandoned.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Aborts the spawned task if the handle is dropped before it finishes.
pub(crate) struct AbortOnDrop<T>(pub(crate) JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, tokio::task::JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
