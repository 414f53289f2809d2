use std::fmt::Display;

use serde::Serialize;

use crate::commit::CommitInfo;

/// How a merge ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MergeStatus {
    /// Nothing to merge.
    UpToDate,
    /// The branch was moved forward to the upstream commit.
    FastForward,
    /// A merge commit was created.
    NonFastForward,
    /// The merge stopped on conflicts; nothing was written.
    Conflicts,
}

impl Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => f.write_str("up to date"),
            Self::FastForward => f.write_str("fast-forward"),
            Self::NonFastForward => f.write_str("merge commit"),
            Self::Conflicts => f.write_str("conflicts"),
        }
    }
}

/// The outcome of merging an upstream commit into a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub status: MergeStatus,
    /// The commit the branch now points at, when the merge moved it.
    pub commit: Option<CommitInfo>,
}

impl MergeResult {
    pub fn new(status: MergeStatus, commit: Option<CommitInfo>) -> Self {
        Self { status, commit }
    }

    pub fn has_conflicts(&self) -> bool {
        self.status == MergeStatus::Conflicts
    }
}
