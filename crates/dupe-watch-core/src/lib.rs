pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod filetype;
pub mod hasher;
pub mod perceptual;
pub mod progress;
pub mod queue;
pub mod resolver;
pub mod scanner;
pub mod watcher;

pub use config::AppConfig;
pub use dedup::{DeduplicationEngine, EngineStats, FileRecord, Verdict};
pub use engine::{DedupProcessor, IngestService, LoggingSink, Outcome, VerdictSink};
pub use error::Error;
pub use filetype::{FileKind, ImageKind};
pub use perceptual::{NearDuplicate, PerceptualAlgorithm, PerceptualIndex};
pub use progress::{ProgressReporter, SilentReporter};
pub use queue::{IngestionQueue, ProcessingTask, QueueStats, RetryPolicy, TaskProcessor, TaskStatus};
pub use resolver::{Action, ConflictResolver, DuplicatePolicy};
pub use watcher::{FilesystemWatcher, PathSink, Settle, SettlingChecker, WatchFilter};
