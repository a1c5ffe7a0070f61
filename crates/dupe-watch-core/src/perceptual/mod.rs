mod fingerprint;

pub use fingerprint::{
    compare_images, fingerprint_file, fingerprint_image, Fingerprint, PerceptualAlgorithm,
    HASH_SIZE,
};

use crate::error::Error;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// A stored image within the distance threshold of a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearDuplicate {
    pub path: PathBuf,
    pub distance: u32,
}

/// Near-duplicate lookup for images that already passed exact dedup as
/// unique. Every fingerprint is kept, matched or not, and compared by a
/// linear scan.
pub struct PerceptualIndex {
    threshold: u32,
    algorithm: PerceptualAlgorithm,
    store: Mutex<Vec<(PathBuf, Fingerprint)>>,
}

impl PerceptualIndex {
    pub fn new(threshold: u32) -> Self {
        Self::with_algorithm(threshold, PerceptualAlgorithm::default())
    }

    pub fn with_algorithm(threshold: u32, algorithm: PerceptualAlgorithm) -> Self {
        Self {
            threshold: threshold.min(64),
            algorithm,
            store: Mutex::new(Vec::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn algorithm(&self) -> PerceptualAlgorithm {
        self.algorithm
    }

    /// Fingerprint `path` with this index's algorithm without storing it.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint, Error> {
        fingerprint_file(path, self.algorithm)
    }

    /// Fingerprint `path`, report stored images within the threshold
    /// (closest first) and add the fingerprint to the store.
    ///
    /// Decoding happens before the store is locked; a file that fails to
    /// decode leaves the store unchanged.
    pub fn find_near_duplicates(&self, path: &Path) -> Result<Vec<NearDuplicate>, Error> {
        let fingerprint = self.fingerprint(path)?;
        debug!(
            "Fingerprint {} ({}) for {}",
            fingerprint,
            self.algorithm,
            path.display()
        );
        Ok(self.record(path, fingerprint))
    }

    /// Same as [`find_near_duplicates`](Self::find_near_duplicates) for a
    /// fingerprint computed elsewhere.
    pub fn record(&self, path: &Path, fingerprint: Fingerprint) -> Vec<NearDuplicate> {
        let mut store = self.lock();

        let mut matches: Vec<NearDuplicate> = store
            .iter()
            .filter(|(stored_path, _)| stored_path != path)
            .filter_map(|(stored_path, stored)| {
                let distance = fingerprint.distance(stored);
                (distance <= self.threshold).then(|| NearDuplicate {
                    path: stored_path.clone(),
                    distance,
                })
            })
            .collect();

        // a re-submitted path replaces its old fingerprint
        match store.iter_mut().find(|(stored_path, _)| stored_path == path) {
            Some(entry) => entry.1 = fingerprint,
            None => store.push((path.to_path_buf(), fingerprint)),
        }
        drop(store);

        matches.sort_by_key(|m| m.distance);
        if let Some(closest) = matches.first() {
            info!(
                "Found {} similar image(s) for {}, closest distance: {}",
                matches.len(),
                path.display(),
                closest.distance
            );
        }
        matches
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(PathBuf, Fingerprint)>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_image_has_no_matches_but_is_stored() {
        let index = PerceptualIndex::new(5);
        let found = index.record(Path::new("/a.jpg"), Fingerprint::from_bits(0xFF));
        assert!(found.is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_matches_within_threshold_sorted() {
        let index = PerceptualIndex::new(5);
        index.record(Path::new("/far.jpg"), Fingerprint::from_bits(0b1111));
        index.record(Path::new("/near.jpg"), Fingerprint::from_bits(0b0001));
        index.record(Path::new("/other.jpg"), Fingerprint::from_bits(u64::MAX));

        let found = index.record(Path::new("/new.jpg"), Fingerprint::from_bits(0));
        assert_eq!(
            found,
            vec![
                NearDuplicate {
                    path: PathBuf::from("/near.jpg"),
                    distance: 1
                },
                NearDuplicate {
                    path: PathBuf::from("/far.jpg"),
                    distance: 4
                },
            ]
        );
        // stored even though it matched
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let index = PerceptualIndex::new(3);
        index.record(Path::new("/a.png"), Fingerprint::from_bits(0b111));
        let found = index.record(Path::new("/b.png"), Fingerprint::from_bits(0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].distance, 3);

        let found = index.record(Path::new("/c.png"), Fingerprint::from_bits(0b1111 << 8));
        assert!(found.is_empty());
    }

    #[test]
    fn test_resubmitted_path_does_not_match_itself() {
        let index = PerceptualIndex::new(5);
        index.record(Path::new("/a.png"), Fingerprint::from_bits(1));
        let found = index.record(Path::new("/a.png"), Fingerprint::from_bits(1));
        assert!(found.is_empty());
        assert_eq!(index.len(), 1);
    }
}
