use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error on {}: {source}", path.display())]
    TransientIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Permission denied on {}: {source}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("File never settled: {}", .0.display())]
    SettleTimeout(PathBuf),

    #[error("Hash computation failed for {}: {reason}", path.display())]
    HashComputation { path: PathBuf, reason: String },

    #[error("Image decode failed for {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify an I/O failure on `path`. Permission problems are terminal,
    /// everything else may be a race with a concurrent writer or delete.
    pub fn io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: path.to_path_buf(),
                source,
            },
            _ => Error::TransientIo {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// The file behind this error no longer exists.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::TransientIo { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientIo { .. } | Error::HashComputation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_terminal() {
        let err = Error::io(
            Path::new("/x"),
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_is_transient() {
        let err = Error::io(
            Path::new("/x"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_retryable());
        assert!(err.is_not_found());
        assert!(Error::HashComputation {
            path: PathBuf::from("/x"),
            reason: "short read".into(),
        }
        .is_retryable());
        assert!(!Error::SettleTimeout(PathBuf::from("/x")).is_retryable());
    }
}
