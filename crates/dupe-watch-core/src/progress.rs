use std::path::Path;

/// Observer for queue, watcher and scan events.
///
/// CLI implements with tracing/indicatif. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_task_submitted(&self, _path: &Path) {}
    fn on_task_completed(&self, _path: &Path, _retries: u32) {}
    fn on_task_retrying(&self, _path: &Path, _attempt: u32, _error: &str) {}
    fn on_task_failed(&self, _path: &Path, _retries: u32, _error: &str) {}
    fn on_settle_timeout(&self, _path: &Path) {}
    fn on_scan_start(&self, _total_files: usize) {}
    fn on_scan_progress(&self, _files_checked: usize, _total_files: usize) {}
    fn on_scan_complete(&self, _duplicates: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
