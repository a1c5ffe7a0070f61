pub mod digest;

pub use digest::{hash_data, hash_file, Digest, PartialHash, StagedHasher};
