mod filter;
mod settle;

pub use filter::{Admission, WatchFilter};
pub use settle::{Settle, SettlingChecker};

use crate::config::{self, WatcherConfig};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Receives paths that have settled.
pub trait PathSink: Send + Sync {
    fn submit(&self, path: PathBuf);
}

struct EventContext {
    filter: Arc<WatchFilter>,
    checker: SettlingChecker,
    sink: Arc<dyn PathSink>,
    reporter: Arc<dyn ProgressReporter>,
    stop: Arc<AtomicBool>,
}

/// Watches directories and hands each new or modified file to a
/// [`PathSink`] once it is stable.
///
/// Raw events are read on a dedicated thread; each accepted path settles on
/// its own helper thread so one slow writer does not hold up the rest.
pub struct FilesystemWatcher {
    watcher: Option<RecommendedWatcher>,
    event_thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    roots: Vec<PathBuf>,
}

impl FilesystemWatcher {
    pub fn start(
        config: &WatcherConfig,
        sink: Arc<dyn PathSink>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, Error> {
        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let mut roots: Vec<PathBuf> = config
            .watch_directories
            .iter()
            .filter(|dir| {
                let exists = dir.is_dir();
                if !exists {
                    warn!("Watch directory does not exist: {}", dir.display());
                }
                exists
            })
            .cloned()
            .collect();
        if config.recursive {
            roots = config::non_overlapping_directories(roots);
        }
        if roots.is_empty() {
            return Err(Error::Other("No watch directories available".into()));
        }

        let (event_tx, event_rx) = unbounded::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // receiver is gone only after stop
                let _ = event_tx.send(res);
            },
            Config::default(),
        )?;
        for root in &roots {
            watcher.watch(root, mode)?;
            info!("Watching {} ({:?})", root.display(), mode);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let context = EventContext {
            filter: Arc::new(WatchFilter::new(&config.ignore_patterns, config.debounce())),
            checker: SettlingChecker::from_config(config),
            sink,
            reporter,
            stop: Arc::clone(&stop),
        };
        let event_thread = thread::Builder::new()
            .name("watch-events".into())
            .spawn(move || event_loop(&context, &event_rx))
            .map_err(|e| Error::Other(format!("Failed to spawn watcher thread: {}", e)))?;

        Ok(Self {
            watcher: Some(watcher),
            event_thread: Some(event_thread),
            stop,
            roots,
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Drop the OS watches and join the event thread. Paths already
    /// settling are not submitted afterwards.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.watcher.take();
        if let Some(handle) = self.event_thread.take() {
            if handle.join().is_err() {
                error!("Watcher event thread panicked");
            }
            info!("Filesystem watcher stopped");
        }
    }
}

impl Drop for FilesystemWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn event_loop(context: &EventContext, events: &Receiver<notify::Result<Event>>) {
    while !context.stop.load(Ordering::Acquire) {
        match events.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(Ok(event)) => handle_event(context, event),
            Ok(Err(e)) => warn!("Watch backend error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn handle_event(context: &EventContext, event: Event) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }

    for path in event.paths {
        if path.is_dir() {
            continue;
        }
        match context.filter.admit(&path) {
            Admission::Accepted => spawn_settle(context, path),
            Admission::Ignored => debug!("Ignored {}", path.display()),
            Admission::Debounced => debug!("Debounced {}", path.display()),
        }
    }
}

fn spawn_settle(context: &EventContext, path: PathBuf) {
    let checker = context.checker;
    let filter = Arc::clone(&context.filter);
    let sink = Arc::clone(&context.sink);
    let reporter = Arc::clone(&context.reporter);
    let stop = Arc::clone(&context.stop);
    let settling = path.clone();

    let spawned = thread::Builder::new()
        .name("watch-settle".into())
        .spawn(move || {
            let settled = checker.settle(&path);
            filter.finish(&path);
            match settled {
                Settle::Stable => {
                    if stop.load(Ordering::Acquire) {
                        return;
                    }
                    debug!("Settled {}", path.display());
                    sink.submit(path);
                }
                Settle::Vanished => debug!("Vanished before settling: {}", path.display()),
                Settle::TimedOut => {
                    let err = Error::SettleTimeout(path.clone());
                    warn!("{}", err);
                    filter.forget(&path);
                    reporter.on_settle_timeout(&path);
                }
            }
        });
    if let Err(e) = spawned {
        error!("Failed to spawn settle thread: {}", e);
        context.filter.finish(&settling);
    }
}
