use crate::perceptual::PerceptualAlgorithm;
use crate::resolver::DuplicatePolicy;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "Config";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub watcher: WatcherConfig,
    pub dedup: DedupConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub watch_directories: Vec<PathBuf>,
    pub ignore_patterns: Vec<String>,
    pub recursive: bool,
    pub debounce_ms: u64,
    pub settle_interval_ms: u64,
    pub settle_max_checks: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_directories: Vec::new(),
            ignore_patterns: [
                "*.tmp",
                "*.crdownload",
                "~$*",
                ".DS_Store",
                "Thumbs.db",
                "*.part",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            recursive: false,
            debounce_ms: 1000,
            settle_interval_ms: 500,
            settle_max_checks: 60,
        }
    }
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    /// Bytes per sampled chunk in the partial hash.
    pub chunk_size: u64,
    /// Files up to `small_file_chunks * chunk_size` bytes are hashed whole.
    pub small_file_chunks: u64,
    /// Maximum Hamming distance (0-64) for a near-duplicate image.
    pub perceptual_threshold: u32,
    pub perceptual_algorithm: PerceptualAlgorithm,
    pub duplicate_action: DuplicatePolicy,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: 4096,
            small_file_chunks: 3,
            perceptual_threshold: 5,
            perceptual_algorithm: PerceptualAlgorithm::Phash,
            duplicate_action: DuplicatePolicy::Quarantine,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub workers: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_retries: 3,
            retry_backoff_ms: 0,
            poll_interval_ms: 1000,
        }
    }
}

/// Load `Config.{toml,yaml,json}` from the working directory (optional),
/// overridden by `DUPE_WATCH__<SECTION>__<KEY>` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_configuration_from(DEFAULT_CONFIG_NAME)
}

pub fn load_configuration_from(name: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(name).required(false))
        .add_source(
            Environment::with_prefix("DUPE_WATCH")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("watcher.watch_directories")
                .with_list_parse_key("watcher.ignore_patterns")
                .try_parsing(true),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for dir in dirs {
        let dir_path: &Path = &dir;
        if result.iter().any(|kept| dir_path.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !kept.starts_with(dir_path));
        result.push(dir);
    }

    result
}
