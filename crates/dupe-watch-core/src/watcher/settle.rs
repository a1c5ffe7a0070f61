use crate::config::WatcherConfig;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Stable,
    /// Gone before it stabilized.
    Vanished,
    TimedOut,
}

/// Decides when a writer is done with a file by polling its size.
#[derive(Debug, Clone, Copy)]
pub struct SettlingChecker {
    interval: Duration,
    max_checks: u32,
}

impl SettlingChecker {
    pub fn new(interval: Duration, max_checks: u32) -> Self {
        Self {
            interval,
            max_checks: max_checks.max(2),
        }
    }

    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(config.settle_interval(), config.settle_max_checks)
    }

    pub fn is_stable(&self, path: &Path) -> bool {
        self.settle(path) == Settle::Stable
    }

    /// Stable means two consecutive polls saw the same non-zero size and
    /// the first byte could be read.
    pub fn settle(&self, path: &Path) -> Settle {
        let mut last_size: Option<u64> = None;

        for check in 0..self.max_checks {
            match fs::metadata(path) {
                Ok(metadata) => {
                    let size = metadata.len();
                    if size > 0 && last_size == Some(size) && can_read(path) {
                        return Settle::Stable;
                    }
                    last_size = Some(size);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Settle::Vanished,
                Err(_) => last_size = None,
            }

            if check + 1 < self.max_checks {
                thread::sleep(self.interval);
            }
        }

        Settle::TimedOut
    }
}

fn can_read(path: &Path) -> bool {
    let mut byte = [0u8; 1];
    File::open(path)
        .and_then(|mut f| f.read(&mut byte))
        .map(|n| n == 1)
        .unwrap_or(false)
}
