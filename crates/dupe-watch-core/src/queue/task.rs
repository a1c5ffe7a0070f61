use crate::error::Error;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retrying => "retrying",
        };
        f.write_str(name)
    }
}

/// One file moving through the queue. Owned by the queue until it reaches
/// `Completed` or `Failed`.
#[derive(Debug, Clone)]
pub struct ProcessingTask {
    pub path: PathBuf,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ProcessingTask {
    pub fn new(path: &Path, max_retries: u32) -> Self {
        Self {
            path: path.to_path_buf(),
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed attempt. Returns `true` when the task should be
    /// re-enqueued; the budget is checked before the count is bumped, so a
    /// task gets at most `max_retries + 1` attempts.
    pub fn fail(&mut self, error: &Error) -> bool {
        self.last_error = Some(error.to_string());
        if error.is_retryable() && self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.status = TaskStatus::Retrying;
            true
        } else {
            self.status = TaskStatus::Failed;
            self.completed_at = Some(Utc::now());
            false
        }
    }

    pub fn requeue(&mut self) {
        self.status = TaskStatus::Pending;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn transient() -> Error {
        Error::io(
            Path::new("/in/a.bin"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        )
    }

    #[test]
    fn test_retry_budget_checked_before_increment() {
        let mut task = ProcessingTask::new(Path::new("/in/a.bin"), 3);
        let mut requeues = 0;
        loop {
            task.start();
            if !task.fail(&transient()) {
                break;
            }
            requeues += 1;
            assert_eq!(task.status, TaskStatus::Retrying);
            task.requeue();
        }
        assert_eq!(requeues, 3);
        assert_eq!(task.retry_count, 3);
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.is_terminal());
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_non_retryable_fails_first_time() {
        let mut task = ProcessingTask::new(Path::new("/in/a.bin"), 3);
        task.start();
        let denied = Error::io(
            Path::new("/in/a.bin"),
            io::Error::new(io::ErrorKind::PermissionDenied, "no"),
        );
        assert!(!task.fail(&denied));
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.last_error.unwrap().contains("Permission denied"));
    }

    #[test]
    fn test_complete_sets_timestamps() {
        let mut task = ProcessingTask::new(Path::new("/in/a.bin"), 0);
        assert_eq!(task.status, TaskStatus::Pending);
        task.start();
        assert!(task.started_at.is_some());
        task.complete();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.unwrap() >= task.created_at);
    }
}
