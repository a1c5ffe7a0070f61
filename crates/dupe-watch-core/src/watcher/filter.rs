use glob::Pattern;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::error;

const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Ignored,
    Debounced,
}

#[derive(Default)]
struct AdmissionState {
    last_accepted: HashMap<PathBuf, Instant>,
    /// Accepted paths whose settle check has not finished yet.
    settling: HashSet<PathBuf>,
}

/// Ignore globs plus per-path debounce for raw watch events.
///
/// An accepted path stays admitted-once until [`finish`](Self::finish) is
/// called for it, however many debounce windows its writer spans.
pub struct WatchFilter {
    patterns: Vec<Pattern>,
    debounce: Duration,
    state: Mutex<AdmissionState>,
}

impl WatchFilter {
    /// Invalid globs are logged and skipped.
    pub fn new(ignore_globs: &[String], debounce: Duration) -> Self {
        let patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            patterns,
            debounce,
            state: Mutex::new(AdmissionState::default()),
        }
    }

    /// Matches against the file name and the full path.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str());
        self.patterns.iter().any(|pattern| {
            name.map_or(false, |n| pattern.matches(n)) || pattern.matches_path(path)
        })
    }

    pub fn admit(&self, path: &Path) -> Admission {
        self.admit_at(path, Instant::now())
    }

    pub fn admit_at(&self, path: &Path, now: Instant) -> Admission {
        if self.is_ignored(path) {
            return Admission::Ignored;
        }

        let mut state = self.lock();
        if state.settling.contains(path) {
            return Admission::Debounced;
        }
        if let Some(last) = state.last_accepted.get(path) {
            if now.saturating_duration_since(*last) < self.debounce {
                return Admission::Debounced;
            }
        }

        if state.last_accepted.len() >= PRUNE_THRESHOLD {
            let debounce = self.debounce;
            state
                .last_accepted
                .retain(|_, last| now.saturating_duration_since(*last) < debounce);
        }
        state.last_accepted.insert(path.to_path_buf(), now);
        state.settling.insert(path.to_path_buf());
        Admission::Accepted
    }

    /// The settle check for `path` is over, whatever its result. Later
    /// events are debounced from the last accepted one as usual.
    pub fn finish(&self, path: &Path) {
        self.lock().settling.remove(path);
    }

    pub fn is_settling(&self, path: &Path) -> bool {
        self.lock().settling.contains(path)
    }

    /// Drop the debounce entry so the next event for `path` is accepted.
    pub fn forget(&self, path: &Path) {
        let mut state = self.lock();
        state.last_accepted.remove(path);
        state.settling.remove(path);
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
