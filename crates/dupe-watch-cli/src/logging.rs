use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/dupe-watch.log";

/// The watcher runs for days, so the file log rolls daily. `LOG_FILE_PATH`
/// names the directory and the file prefix; each day's file gets a
/// `.YYYY-MM-DD` suffix.
pub fn init_logger() -> impl Drop {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let log_file_path = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let (directory, prefix) = log_location(&log_file_path);

    let file_appender = tracing_appender::rolling::daily(&directory, &prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            // settle and worker threads are named, so keep them in the file
            fmt::layer()
                .with_writer(non_blocking)
                .with_thread_names(true)
                .with_target(true)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    info!(
        "Logging to stdout and {}/{}.<date>",
        directory.display(),
        prefix
    );

    guard
}

/// Split a log file path into the appender's directory and file prefix.
fn log_location(log_file_path: &str) -> (PathBuf, String) {
    let path = Path::new(log_file_path);
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dupe-watch.log".to_string());
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    (directory, prefix)
}
