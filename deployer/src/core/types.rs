//! Shared data model for a deployment run.

use std::fmt;
use std::path::PathBuf;

/// What a workspace is used for. Each run holds at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Build,
    Deploy,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Build => "build",
            Purpose::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A disposable working tree attached to the repository.
///
/// `path` is absolute and never equal to or nested under the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub path: PathBuf,
    pub purpose: Purpose,
    /// Branch checked out in the workspace, `None` while detached.
    pub bound_ref: Option<String>,
}

/// Identity and inputs of one invocation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRun {
    pub run_id: String,
    pub commit_message: String,
    pub publish_domain: String,
}

impl DeploymentRun {
    pub fn new(
        run_id: impl Into<String>,
        commit_message: impl Into<String>,
        publish_domain: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            commit_message: commit_message.into(),
            publish_domain: publish_domain.into(),
        }
    }
}

/// Where the publish branch currently exists, queried fresh for every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchLocation {
    /// Exists on the remote (and maybe locally).
    Remote,
    /// Exists only as a local branch.
    LocalOnly,
    /// Exists nowhere; the first publish creates it with no history.
    Nowhere,
}

impl BranchLocation {
    pub fn classify(on_remote: bool, local: bool) -> Self {
        match (on_remote, local) {
            (true, _) => BranchLocation::Remote,
            (false, true) => BranchLocation::LocalOnly,
            (false, false) => BranchLocation::Nowhere,
        }
    }
}

/// Result of a commit attempt. "Nothing to commit" is a success, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    NoChanges,
}

impl fmt::Display for CommitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitOutcome::Committed => f.write_str("committed"),
            CommitOutcome::NoChanges => f.write_str("no-changes"),
        }
    }
}
