mod record;

pub use record::{EngineStats, FileRecord, Verdict};

use crate::config::DedupConfig;
use crate::error::Error;
use crate::hasher::{self, Digest, PartialHash, StagedHasher};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Every path seen at one file size, in arrival order.
#[derive(Debug, Default)]
struct SizeBucket {
    records: Vec<FileRecord>,
}

type SharedBucket = Arc<Mutex<SizeBucket>>;

fn lock_bucket(bucket: &SharedBucket) -> MutexGuard<'_, SizeBucket> {
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What hydration learned about one earlier same-size file.
enum CandidateUpdate {
    Hashed {
        idx: usize,
        partial: PartialHash,
        full: Option<Digest>,
    },
    /// Deleted since it was recorded; dropped from the bucket.
    Vanished { idx: usize },
}

#[derive(Debug, Default)]
struct EngineCounters {
    files_checked: AtomicU64,
    stat_calls: AtomicU64,
    partial_hashes: AtomicU64,
    full_hash_passes: AtomicU64,
    promotions: AtomicU64,
    bytes_read: AtomicU64,
}

impl EngineCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Exact-duplicate detection with lazily evaluated stages:
/// 1. Size - a file whose size was never seen is unique, no content read
/// 2. Partial hash - only on size collision
/// 3. Full hash - promoted from a complete partial hash, else one stream pass
/// 4. First-seen full hash wins as canonical
///
/// Each size bucket has its own mutex, held for the whole collision
/// decision. The DashMap shard guard is only held long enough to find or
/// create the bucket, so same-sized checks are serialized while checks of
/// other sizes (and `stats`) never wait on a collision being hashed.
pub struct DeduplicationEngine {
    hasher: StagedHasher,
    size_index: DashMap<u64, SharedBucket>,
    hash_index: DashMap<Digest, PathBuf>,
    counters: EngineCounters,
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::new(&DedupConfig::default())
    }
}

impl DeduplicationEngine {
    pub fn new(config: &DedupConfig) -> Self {
        Self::with_hasher(StagedHasher::new(
            config.chunk_size,
            config.small_file_chunks,
        ))
    }

    pub fn with_hasher(hasher: StagedHasher) -> Self {
        Self {
            hasher,
            size_index: DashMap::new(),
            hash_index: DashMap::new(),
            counters: EngineCounters::default(),
        }
    }

    /// Decide whether `path` duplicates content already seen.
    ///
    /// Never returns [`Verdict::LikelyDuplicate`]; that comes from the
    /// perceptual stage.
    pub fn check(&self, path: &Path) -> Result<Verdict, Error> {
        self.check_record(path).map(|record| record.status)
    }

    /// Like [`check`](Self::check) but returns the hashes computed on the way.
    pub fn check_record(&self, path: &Path) -> Result<FileRecord, Error> {
        let size = self.stat_size(path)?;
        self.check_sized(path, size)
    }

    fn check_sized(&self, path: &Path, size: u64) -> Result<FileRecord, Error> {
        EngineCounters::bump(&self.counters.files_checked, 1);
        let mut record = FileRecord::new(path, size);

        let shared = match self.size_index.entry(size) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(SizeBucket {
                    records: vec![record.clone()],
                })));
                debug!("Unique (first of size {}): {}", size, path.display());
                return Ok(record);
            }
            Entry::Occupied(slot) => Arc::clone(slot.get()),
        };
        let mut bucket = lock_bucket(&shared);

        // All hashing happens before any index is touched, so a failed read
        // leaves the indices as they were.
        let partial = self.partial_hash(path, size)?;
        let full = self.full_hash(path, size, &partial)?;

        let updates = self.hydrate_candidates(&bucket.records, path, size, &partial);
        let mut vanished = Vec::new();
        for update in updates {
            match update {
                CandidateUpdate::Hashed {
                    idx,
                    partial: candidate_partial,
                    full: candidate_full,
                } => {
                    let candidate = &mut bucket.records[idx];
                    candidate.partial_hash = Some(candidate_partial);
                    if let Some(digest) = candidate_full {
                        candidate.full_hash = Some(digest);
                        let candidate_path = candidate.path.clone();
                        self.hash_index.entry(digest).or_insert(candidate_path);
                    }
                }
                CandidateUpdate::Vanished { idx } => vanished.push(idx),
            }
        }
        for idx in vanished.into_iter().rev() {
            let gone = bucket.records.remove(idx);
            debug!("Dropped vanished candidate {}", gone.path.display());
        }

        record.partial_hash = Some(partial);
        record.full_hash = Some(full);

        let canonical = match self.hash_index.entry(full) {
            Entry::Occupied(slot) => slot.get().clone(),
            Entry::Vacant(slot) => {
                slot.insert(path.to_path_buf());
                path.to_path_buf()
            }
        };

        if canonical == path {
            debug!("Unique (full hash {:?}): {}", full, path.display());
        } else {
            info!(
                "Duplicate found: {} = {}",
                path.display(),
                canonical.display()
            );
            record.status = Verdict::ExactDuplicate { of: canonical };
        }

        upsert(&mut bucket, &record);
        Ok(record)
    }

    /// Register a file as already present (e.g. an organized library)
    /// without treating it as a new arrival. The file is fully hashed so
    /// later arrivals can match it.
    pub fn index_existing(&self, path: &Path) -> Result<FileRecord, Error> {
        let size = self.stat_size(path)?;
        let full = hasher::hash_file(path)?;
        EngineCounters::bump(&self.counters.full_hash_passes, 1);
        EngineCounters::bump(&self.counters.bytes_read, size);

        let mut record = FileRecord::new(path, size);
        record.full_hash = Some(full);

        let shared = Arc::clone(self.size_index.entry(size).or_default().value());
        let mut bucket = lock_bucket(&shared);
        let canonical = self
            .hash_index
            .entry(full)
            .or_insert_with(|| path.to_path_buf())
            .value()
            .clone();
        if canonical != path {
            record.status = Verdict::ExactDuplicate { of: canonical };
        }

        upsert(&mut bucket, &record);
        Ok(record)
    }

    /// Paths currently tracked at `size`, in arrival order.
    pub fn paths_with_size(&self, size: u64) -> Vec<PathBuf> {
        let shared = match self.size_index.get(&size) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Vec::new(),
        };
        let bucket = lock_bucket(&shared);
        bucket.records.iter().map(|r| r.path.clone()).collect()
    }

    pub fn canonical_for(&self, digest: &Digest) -> Option<PathBuf> {
        self.hash_index.get(digest).map(|entry| entry.value().clone())
    }

    pub fn stats(&self) -> EngineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        EngineStats {
            files_checked: load(&self.counters.files_checked),
            stat_calls: load(&self.counters.stat_calls),
            distinct_sizes: self.size_index.len(),
            canonical_hashes: self.hash_index.len(),
            partial_hashes: load(&self.counters.partial_hashes),
            full_hash_passes: load(&self.counters.full_hash_passes),
            promotions: load(&self.counters.promotions),
            bytes_read: load(&self.counters.bytes_read),
        }
    }

    /// Drop all indexed state. Counters are kept.
    pub fn clear(&self) {
        self.size_index.clear();
        self.hash_index.clear();
    }

    fn stat_size(&self, path: &Path) -> Result<u64, Error> {
        EngineCounters::bump(&self.counters.stat_calls, 1);
        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if metadata.is_dir() {
            return Err(Error::Other(format!("{} is a directory", path.display())));
        }
        Ok(metadata.len())
    }

    fn partial_hash(&self, path: &Path, size: u64) -> Result<PartialHash, Error> {
        let partial = self.hasher.partial_hash(path, size)?;
        EngineCounters::bump(&self.counters.partial_hashes, 1);
        EngineCounters::bump(
            &self.counters.bytes_read,
            self.hasher.partial_read_len(size),
        );
        Ok(partial)
    }

    fn full_hash(&self, path: &Path, size: u64, partial: &PartialHash) -> Result<Digest, Error> {
        let full = self.hasher.full_hash(path, partial)?;
        if partial.complete {
            EngineCounters::bump(&self.counters.promotions, 1);
        } else {
            EngineCounters::bump(&self.counters.full_hash_passes, 1);
            EngineCounters::bump(&self.counters.bytes_read, size);
        }
        Ok(full)
    }

    /// Compute missing hashes for earlier same-size files. Only candidates
    /// whose partial hash matches the incoming file get a full hash.
    /// Candidates that are gone from disk come back as `Vanished`; other
    /// read failures are logged and the candidate is left for a later pass.
    fn hydrate_candidates(
        &self,
        records: &[FileRecord],
        incoming: &Path,
        size: u64,
        incoming_partial: &PartialHash,
    ) -> Vec<CandidateUpdate> {
        let mut updates = Vec::new();

        for (idx, candidate) in records.iter().enumerate() {
            if candidate.path == incoming || candidate.full_hash.is_some() {
                continue;
            }

            let partial = match candidate.partial_hash {
                Some(partial) => partial,
                None => match self.partial_hash(&candidate.path, size) {
                    Ok(partial) => partial,
                    Err(e) if e.is_not_found() => {
                        updates.push(CandidateUpdate::Vanished { idx });
                        continue;
                    }
                    Err(e) => {
                        warn!("Skipping candidate {}: {}", candidate.path.display(), e);
                        continue;
                    }
                },
            };

            if partial.digest != incoming_partial.digest {
                updates.push(CandidateUpdate::Hashed {
                    idx,
                    partial,
                    full: None,
                });
                continue;
            }

            match self.full_hash(&candidate.path, size, &partial) {
                Ok(full) => updates.push(CandidateUpdate::Hashed {
                    idx,
                    partial,
                    full: Some(full),
                }),
                Err(e) if e.is_not_found() => updates.push(CandidateUpdate::Vanished { idx }),
                Err(e) => {
                    warn!("Skipping candidate {}: {}", candidate.path.display(), e);
                    updates.push(CandidateUpdate::Hashed {
                        idx,
                        partial,
                        full: None,
                    });
                }
            }
        }

        updates
    }
}

fn upsert(bucket: &mut SizeBucket, record: &FileRecord) {
    match bucket.records.iter_mut().find(|r| r.path == record.path) {
        Some(existing) => *existing = record.clone(),
        None => bucket.records.push(record.clone()),
    }
}
