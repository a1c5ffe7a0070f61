use colored::*;
use dupe_watch_core::{Action, Outcome, ProgressReporter, VerdictSink};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter.
///
/// - Scan: progress bar over the collected file list
/// - Watch: one line per failed task or unsettled file
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.bar().take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_task_retrying(&self, path: &Path, attempt: u32, error: &str) {
        eprintln!(
            "  {} retry {} for {}: {}",
            "↻".yellow(),
            attempt,
            path.display(),
            error
        );
    }

    fn on_task_failed(&self, path: &Path, retries: u32, error: &str) {
        eprintln!(
            "  {} {} failed after {} retries: {}",
            "✗".red(),
            path.display(),
            retries,
            error
        );
    }

    fn on_settle_timeout(&self, path: &Path) {
        eprintln!("  {} {} never settled", "…".yellow(), path.display());
    }

    fn on_scan_start(&self, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        let style = ProgressStyle::with_template(
            "  {spinner:.cyan} Checking [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        )
        .map(|style| style.progress_chars("━╸─").tick_chars(TICK_CHARS))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));

        let mut guard = self.bar();
        if let Some(old) = guard.replace(pb) {
            old.finish_and_clear();
        }
    }

    fn on_scan_progress(&self, files_checked: usize, _total_files: usize) {
        if let Some(pb) = self.bar().as_ref() {
            pb.set_position(files_checked as u64);
        }
    }

    fn on_scan_complete(&self, duplicates: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Scan complete: {} duplicates in {:.2}s",
            "✓".green(),
            duplicates,
            duration_secs
        );
    }
}

/// Prints one colored line per processed file.
pub struct ConsoleSink;

impl VerdictSink for ConsoleSink {
    fn accept(&self, outcome: Outcome) {
        match &outcome.action {
            Action::Proceed => println!("  {} {}", "new".green(), outcome.path.display()),
            action => println!(
                "  {} {} ({}) -> {}",
                action.name().red(),
                outcome.path.display(),
                outcome.verdict,
                action_target(action).cyan()
            ),
        }
    }
}

fn action_target(action: &Action) -> String {
    match action {
        Action::Proceed => String::new(),
        Action::Quarantine { original }
        | Action::Delete { original }
        | Action::Skip { original } => original.display().to_string(),
        Action::Hardlink { target } => target.display().to_string(),
    }
}
