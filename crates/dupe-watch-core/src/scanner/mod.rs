//! One-shot directory scans feeding the same engine as the watcher.

pub mod walk;

pub use walk::collect_files;

use crate::engine::{DedupProcessor, Outcome};
use crate::progress::ProgressReporter;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct ScanReport {
    pub outcomes: Vec<Outcome>,
    pub failures: Vec<(PathBuf, String)>,
    pub duration: Duration,
}

impl ScanReport {
    pub fn duplicates(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.verdict.is_unique())
    }

    pub fn unique_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.verdict.is_unique()).count()
    }

    /// Bytes held by exact duplicates beyond their canonical copy.
    pub fn wasted_bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.verdict, crate::dedup::Verdict::ExactDuplicate { .. }))
            .map(|o| o.size)
            .sum()
    }
}

/// Check every file under `roots` in parallel. Which of several identical
/// files becomes canonical depends on scheduling.
pub fn scan(
    processor: &DedupProcessor,
    roots: &[PathBuf],
    ignore_globs: &[String],
    recursive: bool,
    reporter: &dyn ProgressReporter,
) -> ScanReport {
    let start = Instant::now();
    let files = collect_files(roots, ignore_globs, recursive);
    info!("Scanning {} file(s)", files.len());
    reporter.on_scan_start(files.len());

    let checked = AtomicUsize::new(0);
    let results: Vec<_> = files
        .par_iter()
        .map(|path| {
            let result = processor.evaluate(path);
            let done = checked.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_scan_progress(done, files.len());
            (path, result)
        })
        .collect();

    let mut report = ScanReport::default();
    for (path, result) in results {
        match result {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(e) => {
                warn!("Scan failed for {}: {}", path.display(), e);
                report.failures.push((path.clone(), e.to_string()));
            }
        }
    }
    report.duration = start.elapsed();

    let duplicates = report.duplicates().count();
    debug!(
        "Scan completed in {:.2}s: {} files, {} duplicates, {} failures",
        report.duration.as_secs_f64(),
        report.outcomes.len(),
        duplicates,
        report.failures.len()
    );
    reporter.on_scan_complete(duplicates, report.duration.as_secs_f64());
    report
}

/// Index files already in place without producing outcomes. Returns the
/// number indexed.
pub fn seed(
    processor: &DedupProcessor,
    roots: &[PathBuf],
    ignore_globs: &[String],
) -> usize {
    let files = collect_files(roots, ignore_globs, true);
    let indexed = files
        .par_iter()
        .filter(|path| match processor.seed_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not seed {}: {}", path.display(), e);
                false
            }
        })
        .count();
    info!("Seeded index with {} of {} file(s)", indexed, files.len());
    indexed
}
