use crate::dedup::Verdict;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// What to do with a duplicate. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Quarantine,
    Delete,
    Skip,
    Hardlink,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DuplicatePolicy::Quarantine => "quarantine",
            DuplicatePolicy::Delete => "delete",
            DuplicatePolicy::Skip => "skip",
            DuplicatePolicy::Hardlink => "hardlink",
        };
        f.write_str(name)
    }
}

/// Instruction for the file-action side. Nothing here touches the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Not a duplicate; continue to classification and placement.
    Proceed,
    Quarantine { original: PathBuf },
    Delete { original: PathBuf },
    Skip { original: PathBuf },
    /// Replace the duplicate with a hard link to `target`.
    Hardlink { target: PathBuf },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Proceed => "proceed",
            Action::Quarantine { .. } => "quarantine",
            Action::Delete { .. } => "delete",
            Action::Skip { .. } => "skip",
            Action::Hardlink { .. } => "hardlink",
        }
    }
}

/// Map a verdict to an action under `policy`.
///
/// Near-duplicates are never deleted or hard-linked since their bytes
/// differ; those policies fall back to quarantine.
pub fn resolve(verdict: &Verdict, policy: DuplicatePolicy) -> Action {
    match verdict {
        Verdict::Unique => Action::Proceed,
        Verdict::ExactDuplicate { of } => {
            let original = of.clone();
            match policy {
                DuplicatePolicy::Quarantine => Action::Quarantine { original },
                DuplicatePolicy::Delete => Action::Delete { original },
                DuplicatePolicy::Skip => Action::Skip { original },
                DuplicatePolicy::Hardlink => Action::Hardlink { target: original },
            }
        }
        Verdict::LikelyDuplicate { of, .. } => {
            let original = of.clone();
            match policy {
                DuplicatePolicy::Skip => Action::Skip { original },
                DuplicatePolicy::Quarantine
                | DuplicatePolicy::Delete
                | DuplicatePolicy::Hardlink => Action::Quarantine { original },
            }
        }
    }
}

/// Stateless holder for the startup policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: DuplicatePolicy,
}

impl ConflictResolver {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn resolve(&self, verdict: &Verdict) -> Action {
        resolve(verdict, self.policy)
    }
}
