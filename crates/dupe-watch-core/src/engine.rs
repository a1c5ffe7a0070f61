use crate::config::{AppConfig, DedupConfig};
use crate::dedup::{DeduplicationEngine, FileRecord, Verdict};
use crate::error::Error;
use crate::filetype::{self, FileKind};
use crate::perceptual::PerceptualIndex;
use crate::progress::ProgressReporter;
use crate::queue::{IngestionQueue, TaskProcessor};
use crate::resolver::{Action, ConflictResolver};
use crate::watcher::{FilesystemWatcher, PathSink};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Final decision for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub path: PathBuf,
    pub size: u64,
    pub kind: FileKind,
    pub verdict: Verdict,
    pub action: Action,
}

/// Classification and placement side. Receives every processed file.
pub trait VerdictSink: Send + Sync {
    fn accept(&self, outcome: Outcome);
}

/// Sink that only logs.
pub struct LoggingSink;

impl VerdictSink for LoggingSink {
    fn accept(&self, outcome: Outcome) {
        match outcome.action {
            Action::Proceed => info!("{}: unique, proceed", outcome.path.display()),
            ref action => info!(
                "{}: {}, action {}",
                outcome.path.display(),
                outcome.verdict,
                action.name()
            ),
        }
    }
}

/// Work done per file by the queue workers: exact dedup, then
/// near-duplicate lookup for unique images, then the duplicate policy.
pub struct DedupProcessor {
    enabled: bool,
    engine: DeduplicationEngine,
    perceptual: PerceptualIndex,
    resolver: ConflictResolver,
    sink: Arc<dyn VerdictSink>,
}

impl DedupProcessor {
    pub fn new(config: &DedupConfig, sink: Arc<dyn VerdictSink>) -> Self {
        Self {
            enabled: config.enabled,
            engine: DeduplicationEngine::new(config),
            perceptual: PerceptualIndex::with_algorithm(
                config.perceptual_threshold,
                config.perceptual_algorithm,
            ),
            resolver: ConflictResolver::new(config.duplicate_action),
            sink,
        }
    }

    pub fn engine(&self) -> &DeduplicationEngine {
        &self.engine
    }

    pub fn perceptual(&self) -> &PerceptualIndex {
        &self.perceptual
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Decide the outcome for `path` without handing it to the sink.
    pub fn evaluate(&self, path: &Path) -> Result<Outcome, Error> {
        let kind = filetype::detect(path);

        if !self.enabled {
            let size = fs::metadata(path).map_err(|e| Error::io(path, e))?.len();
            return Ok(Outcome {
                path: path.to_path_buf(),
                size,
                kind,
                verdict: Verdict::Unique,
                action: Action::Proceed,
            });
        }

        let FileRecord {
            size,
            status: mut verdict,
            ..
        } = self.engine.check_record(path)?;

        if verdict.is_unique() && kind.is_image() {
            verdict = self.near_duplicate_verdict(path)?;
        }

        let action = self.resolver.resolve(&verdict);
        debug!("{} -> {} ({})", path.display(), verdict.label(), action.name());

        Ok(Outcome {
            path: path.to_path_buf(),
            size,
            kind,
            verdict,
            action,
        })
    }

    /// Register an already-organized file so new arrivals can match it.
    pub fn seed_file(&self, path: &Path) -> Result<(), Error> {
        self.engine.index_existing(path)?;
        if filetype::detect(path).is_image() {
            match self.perceptual.fingerprint(path) {
                Ok(fingerprint) => {
                    self.perceptual.record(path, fingerprint);
                }
                Err(e) => warn!("No fingerprint for {}: {}", path.display(), e),
            }
        }
        Ok(())
    }

    /// An image that will not decode is reported unique. Any other failure
    /// (the file vanished or became unreadable) goes back to the queue.
    fn near_duplicate_verdict(&self, path: &Path) -> Result<Verdict, Error> {
        let matches = match self.perceptual.find_near_duplicates(path) {
            Ok(matches) => matches,
            Err(e @ Error::ImageDecode { .. }) => {
                warn!("Perceptual check skipped: {}", e);
                return Ok(Verdict::Unique);
            }
            Err(e) => return Err(e),
        };

        Ok(matches
            .into_iter()
            .next()
            .map(|closest| Verdict::LikelyDuplicate {
                of: closest.path,
                distance: closest.distance,
            })
            .unwrap_or(Verdict::Unique))
    }
}

impl TaskProcessor for DedupProcessor {
    fn process(&self, path: &Path) -> Result<(), Error> {
        let outcome = self.evaluate(path)?;
        self.sink.accept(outcome);
        Ok(())
    }
}

/// Watcher, queue and processor wired together.
pub struct IngestService {
    processor: Arc<DedupProcessor>,
    queue: Arc<IngestionQueue>,
    watcher: Option<FilesystemWatcher>,
}

impl IngestService {
    pub fn start(
        config: &AppConfig,
        sink: Arc<dyn VerdictSink>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, Error> {
        let processor = Arc::new(DedupProcessor::new(&config.dedup, sink));
        Self::start_with(config, processor, reporter)
    }

    /// Start around an existing processor, e.g. one already seeded.
    pub fn start_with(
        config: &AppConfig,
        processor: Arc<DedupProcessor>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, Error> {
        let queue = Arc::new(IngestionQueue::new(
            &config.queue,
            Arc::clone(&processor) as Arc<dyn TaskProcessor>,
            Arc::clone(&reporter),
        )?);
        let sink: Arc<dyn PathSink> = Arc::clone(&queue) as Arc<dyn PathSink>;
        let watcher = match FilesystemWatcher::start(&config.watcher, sink, reporter) {
            Ok(watcher) => watcher,
            Err(e) => {
                queue.shutdown();
                return Err(e);
            }
        };
        info!("Ingest service started on {} root(s)", watcher.roots().len());

        Ok(Self {
            processor,
            queue,
            watcher: Some(watcher),
        })
    }

    pub fn processor(&self) -> &DedupProcessor {
        &self.processor
    }

    pub fn queue(&self) -> &IngestionQueue {
        &self.queue
    }

    /// Stop intake first, then let the workers finish their current task.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
            self.queue.shutdown();
        }
    }
}

impl Drop for IngestService {
    fn drop(&mut self) {
        self.stop();
    }
}
