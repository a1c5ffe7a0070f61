use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dupe_watch_core::{
    Error, IngestionQueue, ProgressReporter, RetryPolicy, SilentReporter, TaskProcessor,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Submitted(PathBuf),
    Completed(PathBuf, u32),
    Retrying(PathBuf, u32),
    Failed(PathBuf, u32),
}

#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_task_submitted(&self, path: &Path) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Submitted(path.to_path_buf()));
    }

    fn on_task_completed(&self, path: &Path, retries: u32) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Completed(path.to_path_buf(), retries));
    }

    fn on_task_retrying(&self, path: &Path, attempt: u32, _error: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Retrying(path.to_path_buf(), attempt));
    }

    fn on_task_failed(&self, path: &Path, retries: u32, _error: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Failed(path.to_path_buf(), retries));
    }
}

/// Fails the first `failures` attempts with `kind`, then succeeds.
struct Scripted {
    failures: u32,
    kind: io::ErrorKind,
    attempts: AtomicU32,
}

impl Scripted {
    fn new(failures: u32, kind: io::ErrorKind) -> Arc<Self> {
        Arc::new(Self {
            failures,
            kind,
            attempts: AtomicU32::new(0),
        })
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl TaskProcessor for Scripted {
    fn process(&self, path: &Path) -> Result<(), Error> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            Err(Error::io(path, io::Error::new(self.kind, "scripted failure")))
        } else {
            Ok(())
        }
    }
}

fn queue_with(
    processor: Arc<dyn TaskProcessor>,
    reporter: Arc<dyn ProgressReporter>,
    workers: usize,
    backoff: Duration,
) -> IngestionQueue {
    IngestionQueue::with_policy(
        workers,
        RetryPolicy {
            max_retries: 3,
            backoff,
        },
        Duration::from_millis(20),
        processor,
        reporter,
    )
    .unwrap()
}

#[test]
fn test_scenario_c_succeeds_on_third_attempt() {
    let processor = Scripted::new(2, io::ErrorKind::Other);
    let reporter = Arc::new(RecordingReporter::default());
    let queue = queue_with(processor.clone(), reporter.clone(), 1, Duration::ZERO);

    queue.submit("/in/c.bin");
    assert!(queue.wait_idle(Duration::from_secs(10)));

    assert_eq!(processor.attempts(), 3);
    let stats = queue.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.retried, 2);
    assert_eq!(
        reporter.events(),
        vec![
            Event::Submitted(PathBuf::from("/in/c.bin")),
            Event::Retrying(PathBuf::from("/in/c.bin"), 1),
            Event::Retrying(PathBuf::from("/in/c.bin"), 2),
            Event::Completed(PathBuf::from("/in/c.bin"), 2),
        ]
    );
}

#[test]
fn test_scenario_d_fails_after_third_retry() {
    let processor = Scripted::new(u32::MAX, io::ErrorKind::Other);
    let reporter = Arc::new(RecordingReporter::default());
    let queue = queue_with(processor.clone(), reporter.clone(), 2, Duration::ZERO);

    queue.submit("/in/d.bin");
    assert!(queue.wait_idle(Duration::from_secs(10)));

    // initial attempt plus three retries, never a fourth re-enqueue
    assert_eq!(processor.attempts(), 4);
    let stats = queue.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.retried, 3);
    assert_eq!(reporter.count(|e| matches!(e, Event::Retrying(..))), 3);
    assert!(reporter
        .events()
        .contains(&Event::Failed(PathBuf::from("/in/d.bin"), 3)));
}

#[test]
fn test_permission_denied_is_not_retried() {
    let processor = Scripted::new(u32::MAX, io::ErrorKind::PermissionDenied);
    let reporter = Arc::new(RecordingReporter::default());
    let queue = queue_with(processor.clone(), reporter.clone(), 1, Duration::ZERO);

    queue.submit("/in/locked.bin");
    assert!(queue.wait_idle(Duration::from_secs(10)));

    assert_eq!(processor.attempts(), 1);
    assert_eq!(queue.stats().retried, 0);
    assert_eq!(
        reporter.events().last(),
        Some(&Event::Failed(PathBuf::from("/in/locked.bin"), 0))
    );
}

#[test]
fn test_backoff_delays_retry() {
    let processor = Scripted::new(1, io::ErrorKind::Interrupted);
    let queue = queue_with(
        processor.clone(),
        Arc::new(SilentReporter),
        1,
        Duration::from_millis(100),
    );

    let start = Instant::now();
    queue.submit("/in/slow.bin");
    assert!(queue.wait_idle(Duration::from_secs(10)));

    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(processor.attempts(), 2);
    assert_eq!(queue.stats().completed, 1);
}

#[test]
fn test_many_tasks_across_workers() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let processor = move |path: &Path| -> Result<(), Error> {
        recorder.lock().unwrap().push(path.to_path_buf());
        Ok(())
    };
    let queue = queue_with(Arc::new(processor), Arc::new(SilentReporter), 4, Duration::ZERO);

    for i in 0..50 {
        queue.submit(format!("/in/{}.bin", i));
    }
    assert!(queue.wait_idle(Duration::from_secs(10)));

    let stats = queue.stats();
    assert_eq!(stats.completed, 50);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processing, 0);
    let mut processed = seen.lock().unwrap().clone();
    processed.sort();
    processed.dedup();
    assert_eq!(processed.len(), 50);
}

#[test]
fn test_submit_after_shutdown_is_dropped() {
    let processor = Scripted::new(0, io::ErrorKind::Other);
    let queue = queue_with(processor.clone(), Arc::new(SilentReporter), 2, Duration::ZERO);

    queue.shutdown();
    assert!(queue.is_stopped());
    queue.submit("/in/late.bin");

    assert!(queue.is_idle());
    assert_eq!(processor.attempts(), 0);
    // second shutdown is a no-op
    queue.shutdown();
}
