mod task;

pub use task::{ProcessingTask, TaskStatus};

use crate::config::QueueConfig;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::watcher::PathSink;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Work run by queue workers for every submitted path.
pub trait TaskProcessor: Send + Sync {
    fn process(&self, path: &Path) -> Result<(), Error>;
}

impl<F> TaskProcessor for F
where
    F: Fn(&Path) -> Result<(), Error> + Send + Sync,
{
    fn process(&self, path: &Path) -> Result<(), Error> {
        self(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before a retried task is enqueued again. Zero re-enqueues at
    /// once.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::ZERO,
        }
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// Snapshot of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Queued or waiting out a retry backoff.
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Re-enqueues, not distinct tasks.
    pub retried: u64,
}

#[derive(Default)]
struct QueueCounters {
    pending: AtomicU64,
    processing: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

struct Shared {
    policy: RetryPolicy,
    poll_interval: Duration,
    stop: AtomicBool,
    counters: QueueCounters,
    processor: Arc<dyn TaskProcessor>,
    reporter: Arc<dyn ProgressReporter>,
}

/// FIFO task queue drained by a fixed pool of worker threads.
///
/// Failed attempts with a retryable error go back to the tail of the queue
/// until the retry budget is spent; everything else is terminal.
pub struct IngestionQueue {
    sender: Sender<ProcessingTask>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl IngestionQueue {
    pub fn new(
        config: &QueueConfig,
        processor: Arc<dyn TaskProcessor>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, Error> {
        Self::with_policy(
            config.workers,
            RetryPolicy::from(config),
            Duration::from_millis(config.poll_interval_ms),
            processor,
            reporter,
        )
    }

    pub fn with_policy(
        workers: usize,
        policy: RetryPolicy,
        poll_interval: Duration,
        processor: Arc<dyn TaskProcessor>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, Error> {
        let (sender, receiver) = unbounded();
        let shared = Arc::new(Shared {
            policy,
            poll_interval,
            stop: AtomicBool::new(false),
            counters: QueueCounters::default(),
            processor,
            reporter,
        });

        let worker_count = workers.max(1);
        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let shared = Arc::clone(&shared);
            let receiver = receiver.clone();
            let sender = sender.clone();
            let handle = thread::Builder::new()
                .name(format!("ingest-worker-{}", id))
                .spawn(move || worker_loop(id, &shared, &receiver, &sender))
                .map_err(|e| Error::Other(format!("Failed to spawn worker {}: {}", id, e)))?;
            handles.push(handle);
        }
        info!(
            "Ingestion queue started with {} worker(s), max_retries={}",
            worker_count, policy.max_retries
        );

        Ok(Self {
            sender,
            shared,
            workers: Mutex::new(handles),
        })
    }

    /// Enqueue `path` as a new pending task. Ignored after shutdown.
    pub fn submit(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        if self.shared.stop.load(Ordering::Acquire) {
            warn!("Queue stopped, dropping {}", path.display());
            return;
        }
        let task = ProcessingTask::new(&path, self.shared.policy.max_retries);
        self.shared.counters.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.reporter.on_task_submitted(&path);
        if self.sender.send(task).is_err() {
            self.shared.counters.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("Queue closed, dropping {}", path.display());
            return;
        }
        debug!("Submitted {}", path.display());
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.shared.counters;
        QueueStats {
            pending: c.pending.load(Ordering::SeqCst),
            processing: c.processing.load(Ordering::SeqCst),
            completed: c.completed.load(Ordering::SeqCst),
            failed: c.failed.load(Ordering::SeqCst),
            retried: c.retried.load(Ordering::SeqCst),
        }
    }

    /// No task queued, backing off or in flight.
    pub fn is_idle(&self) -> bool {
        let stats = self.stats();
        stats.pending == 0 && stats.processing == 0
    }

    /// Block until the queue is idle or `timeout` passes. Returns whether it
    /// went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Stop the workers after their current task and join them. Tasks still
    /// queued are abandoned.
    pub fn shutdown(&self) {
        if self.shared.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("Ingestion worker panicked");
            }
        }
        let abandoned = self.shared.counters.pending.load(Ordering::SeqCst);
        if abandoned > 0 {
            warn!("Ingestion queue stopped with {} task(s) unprocessed", abandoned);
        } else {
            info!("Ingestion queue stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }
}

impl PathSink for IngestionQueue {
    fn submit(&self, path: PathBuf) {
        IngestionQueue::submit(self, path);
    }
}

impl Drop for IngestionQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    id: usize,
    shared: &Shared,
    receiver: &Receiver<ProcessingTask>,
    sender: &Sender<ProcessingTask>,
) {
    debug!("Worker {} started", id);
    while !shared.stop.load(Ordering::Acquire) {
        let task = match receiver.recv_timeout(shared.poll_interval) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        shared.counters.processing.fetch_add(1, Ordering::SeqCst);
        shared.counters.pending.fetch_sub(1, Ordering::SeqCst);
        run_task(shared, task, sender);
    }
    debug!("Worker {} stopped", id);
}

fn run_task(shared: &Shared, mut task: ProcessingTask, sender: &Sender<ProcessingTask>) {
    let counters = &shared.counters;
    task.start();

    let err = match shared.processor.process(&task.path) {
        Ok(()) => {
            task.complete();
            counters.completed.fetch_add(1, Ordering::SeqCst);
            counters.processing.fetch_sub(1, Ordering::SeqCst);
            debug!(
                "Completed {} after {} retries",
                task.path.display(),
                task.retry_count
            );
            shared.reporter.on_task_completed(&task.path, task.retry_count);
            return;
        }
        Err(err) => err,
    };

    if task.fail(&err) {
        warn!(
            "Retrying {} ({}/{}): {}",
            task.path.display(),
            task.retry_count,
            task.max_retries,
            err
        );
        shared
            .reporter
            .on_task_retrying(&task.path, task.retry_count, &err.to_string());
        counters.retried.fetch_add(1, Ordering::SeqCst);
        // counted pending before it stops counting as processing, so the
        // queue never looks idle in between
        counters.pending.fetch_add(1, Ordering::SeqCst);
        counters.processing.fetch_sub(1, Ordering::SeqCst);
        task.requeue();
        requeue(shared, task, sender);
    } else {
        error!(
            "Failed {} after {} retries: {}",
            task.path.display(),
            task.retry_count,
            err
        );
        counters.failed.fetch_add(1, Ordering::SeqCst);
        counters.processing.fetch_sub(1, Ordering::SeqCst);
        shared
            .reporter
            .on_task_failed(&task.path, task.retry_count, &err.to_string());
    }
}

fn requeue(shared: &Shared, task: ProcessingTask, sender: &Sender<ProcessingTask>) {
    let backoff = shared.policy.backoff;
    if backoff.is_zero() {
        if sender.send(task).is_err() {
            shared.counters.pending.fetch_sub(1, Ordering::SeqCst);
        }
        return;
    }

    let sender = sender.clone();
    let spawned = thread::Builder::new()
        .name("ingest-backoff".into())
        .spawn(move || {
            thread::sleep(backoff);
            // a closed channel only means the queue is gone
            let _ = sender.send(task);
        });
    if let Err(e) = spawned {
        error!("Failed to schedule retry: {}", e);
        shared.counters.pending.fetch_sub(1, Ordering::SeqCst);
    }
}
