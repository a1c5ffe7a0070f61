use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use dupe_watch_core::config::WatcherConfig;
use dupe_watch_core::{Error, FilesystemWatcher, PathSink, SilentReporter};

#[derive(Default)]
struct Collect {
    paths: Mutex<Vec<PathBuf>>,
}

impl Collect {
    fn snapshot(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap().clone()
    }

    fn wait_for(&self, path: &PathBuf, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.snapshot().contains(path) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }
}

impl PathSink for Collect {
    fn submit(&self, path: PathBuf) {
        self.paths.lock().unwrap().push(path);
    }
}

fn fast_config(dirs: Vec<PathBuf>) -> WatcherConfig {
    WatcherConfig {
        watch_directories: dirs,
        debounce_ms: 2000,
        settle_interval_ms: 20,
        settle_max_checks: 50,
        ..WatcherConfig::default()
    }
}

#[test]
fn test_settled_file_is_submitted_once() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(Collect::default());
    let mut watcher = FilesystemWatcher::start(
        &fast_config(vec![dir.path().to_path_buf()]),
        sink.clone(),
        Arc::new(SilentReporter),
    )
    .unwrap();

    // let the backend register the watch
    thread::sleep(Duration::from_millis(200));
    let wanted = dir.path().join("photo.jpg");
    fs::write(&wanted, b"finished content").unwrap();
    fs::write(dir.path().join("download.tmp"), b"partial").unwrap();

    assert!(sink.wait_for(&wanted, Duration::from_secs(10)));
    thread::sleep(Duration::from_millis(300));
    watcher.stop();

    let seen = sink.snapshot();
    assert_eq!(seen.iter().filter(|p| **p == wanted).count(), 1);
    assert!(!seen.iter().any(|p| p.ends_with("download.tmp")));
}

#[test]
fn test_slow_writer_is_submitted_once() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(Collect::default());
    let config = WatcherConfig {
        watch_directories: vec![dir.path().to_path_buf()],
        debounce_ms: 300,
        settle_interval_ms: 200,
        settle_max_checks: 100,
        ..WatcherConfig::default()
    };
    let mut watcher =
        FilesystemWatcher::start(&config, sink.clone(), Arc::new(SilentReporter)).unwrap();

    thread::sleep(Duration::from_millis(200));
    let target = dir.path().join("video.mp4");
    let mut file = fs::File::create(&target).unwrap();
    // keeps writing across several debounce windows
    let writing_until = Instant::now() + Duration::from_millis(2000);
    while Instant::now() < writing_until {
        file.write_all(&[7u8; 512]).unwrap();
        file.flush().unwrap();
        thread::sleep(Duration::from_millis(100));
    }
    drop(file);

    assert!(sink.wait_for(&target, Duration::from_secs(10)));
    thread::sleep(Duration::from_millis(800));
    watcher.stop();

    let seen = sink.snapshot();
    assert_eq!(seen.iter().filter(|p| **p == target).count(), 1);
}

#[test]
fn test_subdirectory_ignored_when_not_recursive() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("nested");
    fs::create_dir(&nested).unwrap();
    let sink = Arc::new(Collect::default());
    let watcher = FilesystemWatcher::start(
        &fast_config(vec![dir.path().to_path_buf()]),
        sink.clone(),
        Arc::new(SilentReporter),
    )
    .unwrap();

    thread::sleep(Duration::from_millis(200));
    fs::write(nested.join("deep.bin"), b"deep").unwrap();
    let top = dir.path().join("top.bin");
    fs::write(&top, b"top").unwrap();

    assert!(sink.wait_for(&top, Duration::from_secs(10)));
    drop(watcher);
    assert!(!sink.snapshot().iter().any(|p| p.ends_with("deep.bin")));
}

#[test]
fn test_missing_directories_fail_to_start() {
    let dir = tempdir().unwrap();
    let result = FilesystemWatcher::start(
        &fast_config(vec![dir.path().join("nope")]),
        Arc::new(Collect::default()),
        Arc::new(SilentReporter),
    );
    assert!(matches!(result, Err(Error::Other(_))));
}

#[test]
fn test_overlapping_roots_collapse_when_recursive() {
    let dir = tempdir().unwrap();
    let child = dir.path().join("child");
    fs::create_dir(&child).unwrap();

    let mut config = fast_config(vec![child.clone(), dir.path().to_path_buf()]);
    config.recursive = true;
    let watcher = FilesystemWatcher::start(
        &config,
        Arc::new(Collect::default()),
        Arc::new(SilentReporter),
    )
    .unwrap();
    assert_eq!(watcher.roots(), &[dir.path().to_path_buf()]);
}
