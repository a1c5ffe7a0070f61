use glob::Pattern;
use std::io;
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::{DirEntry, WalkDir};

/// Collect regular, non-empty files under `roots`, skipping anything that
/// matches an ignore glob (directories included). Symlinks are not followed.
/// Unreadable directories are logged and skipped.
pub fn collect_files(roots: &[PathBuf], ignore_globs: &[String], recursive: bool) -> Vec<PathBuf> {
    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let mut files = Vec::new();
    for root in roots {
        let mut walker = WalkDir::new(root).follow_links(false);
        if !recursive {
            walker = walker.max_depth(1);
        }

        let entries = walker
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_ignored(entry.path(), &ignore_patterns));

        for entry in entries {
            match entry {
                Ok(entry) => {
                    if let Some(path) = regular_non_empty(&entry) {
                        files.push(path);
                    }
                }
                Err(err) => {
                    let path = err.path().map(Path::display);
                    match err.io_error().map(io::Error::kind) {
                        Some(io::ErrorKind::PermissionDenied) => {
                            error!("Access denied reading {:?}: {}", path, err)
                        }
                        _ => error!("Error walking {:?}: {}", path, err),
                    }
                }
            }
        }
    }

    files
}

fn is_ignored(path: &Path, patterns: &[Pattern]) -> bool {
    let name = path.file_name().and_then(|n| n.to_str());
    patterns
        .iter()
        .any(|pattern| name.map_or(false, |n| pattern.matches(n)) || pattern.matches_path(path))
}

fn regular_non_empty(entry: &DirEntry) -> Option<PathBuf> {
    if !entry.file_type().is_file() {
        return None;
    }
    match entry.metadata() {
        Ok(metadata) if metadata.len() > 0 => Some(entry.path().to_path_buf()),
        Ok(_) => None,
        Err(err) => {
            error!("Error getting metadata for {}: {}", entry.path().display(), err);
            None
        }
    }
}
