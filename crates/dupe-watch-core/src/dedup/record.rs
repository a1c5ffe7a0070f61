use crate::hasher::{Digest, PartialHash};
use crate::perceptual::Fingerprint;
use std::fmt;
use std::path::{Path, PathBuf};

/// Duplicate verdict handed to the classification/placement side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Unique,
    /// Byte-identical to the canonical path.
    ExactDuplicate { of: PathBuf },
    /// Visually close to `of`; content differs.
    LikelyDuplicate { of: PathBuf, distance: u32 },
}

impl Verdict {
    pub fn is_unique(&self) -> bool {
        matches!(self, Verdict::Unique)
    }

    pub fn duplicate_of(&self) -> Option<&Path> {
        match self {
            Verdict::Unique => None,
            Verdict::ExactDuplicate { of } | Verdict::LikelyDuplicate { of, .. } => Some(of),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Unique => "unique",
            Verdict::ExactDuplicate { .. } => "exact_duplicate",
            Verdict::LikelyDuplicate { .. } => "likely_duplicate",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Unique => f.write_str("unique"),
            Verdict::ExactDuplicate { of } => write!(f, "exact duplicate of {}", of.display()),
            Verdict::LikelyDuplicate { of, distance } => write!(
                f,
                "likely duplicate of {} (distance {})",
                of.display(),
                distance
            ),
        }
    }
}

/// Everything known about one observed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub partial_hash: Option<PartialHash>,
    pub full_hash: Option<Digest>,
    pub fingerprint: Option<Fingerprint>,
    pub status: Verdict,
}

impl FileRecord {
    pub fn new(path: &Path, size: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            size,
            partial_hash: None,
            full_hash: None,
            fingerprint: None,
            status: Verdict::Unique,
        }
    }
}

/// Snapshot of engine counters and index sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub files_checked: u64,
    pub stat_calls: u64,
    pub distinct_sizes: usize,
    pub canonical_hashes: usize,
    pub partial_hashes: u64,
    /// Whole-file streaming passes (not counting promoted partial hashes).
    pub full_hash_passes: u64,
    pub promotions: u64,
    pub bytes_read: u64,
}
