use crate::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Read buffer for whole-file hashing. Memory use is bounded by this,
/// independent of file size.
pub const FULL_HASH_BUFFER_SIZE: usize = 64 * 1024;

/// BLAKE3 digest of file content (or of a sampled subset of it).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl From<blake3::Hash> for Digest {
    fn from(hash: blake3::Hash) -> Self {
        Digest(*hash.as_bytes())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}..)", &self.to_hex()[..12])
    }
}

/// Result of the partial-hash stage. `complete` means the digest already
/// covers every byte of the file and may stand in for the full hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartialHash {
    pub digest: Digest,
    pub complete: bool,
}

/// Staged hashing strategy:
/// 1. Partial hash - whole file if small, otherwise three fixed chunks
///    (start, middle, end)
/// 2. Full hash - promoted from a complete partial hash, otherwise one
///    streaming pass over the file
#[derive(Debug, Clone, Copy)]
pub struct StagedHasher {
    chunk_size: u64,
    small_file_limit: u64,
}

impl StagedHasher {
    pub fn new(chunk_size: u64, small_file_chunks: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            small_file_limit: chunk_size.saturating_mul(small_file_chunks),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn is_small(&self, size: u64) -> bool {
        size <= self.small_file_limit
    }

    /// Bytes the partial stage reads for a file of `size` bytes.
    pub fn partial_read_len(&self, size: u64) -> u64 {
        if self.is_small(size) {
            size
        } else {
            self.chunk_size * 3
        }
    }

    pub fn partial_hash(&self, path: &Path, size: u64) -> Result<PartialHash, Error> {
        if self.is_small(size) {
            let digest = hash_file(path)?;
            return Ok(PartialHash {
                digest,
                complete: true,
            });
        }

        let digest = hash_chunks(path, size, self.chunk_size)?;
        Ok(PartialHash {
            digest,
            complete: false,
        })
    }

    /// Full-content hash. Returns the partial digest unchanged when it is
    /// already complete, so no second read happens.
    pub fn full_hash(&self, path: &Path, partial: &PartialHash) -> Result<Digest, Error> {
        if partial.complete {
            return Ok(partial.digest);
        }
        hash_file(path)
    }
}

/// Sample offsets in read order: start, middle, end (clamped to 0).
pub fn chunk_offsets(size: u64, chunk_size: u64) -> [u64; 3] {
    [0, size / 2, size.saturating_sub(chunk_size)]
}

fn hash_chunks(path: &Path, size: u64, chunk_size: u64) -> Result<Digest, Error> {
    let mut f = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; chunk_size as usize];

    for offset in chunk_offsets(size, chunk_size) {
        f.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io(path, e))?;
        let len = chunk_size.min(size - offset) as usize;
        f.read_exact(&mut buffer[..len])
            .map_err(|e| read_error(path, e))?;
        hasher.update(&buffer[..len]);
    }

    Ok(hasher.finalize().into())
}

/// Stream the whole file through BLAKE3 with a fixed buffer.
pub fn hash_file(path: &Path) -> Result<Digest, Error> {
    let mut f = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; FULL_HASH_BUFFER_SIZE];

    loop {
        let n = match f.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(path, e)),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

fn read_error(path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        // file shrank between stat and read
        Error::HashComputation {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    } else {
        Error::io(path, e)
    }
}

pub fn hash_data(data: &[u8]) -> Digest {
    blake3::hash(data).into()
}
