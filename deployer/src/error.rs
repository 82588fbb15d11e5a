//! Typed failures raised by the deployer.
//!
//! Functions return `anyhow::Result` and attach context as the error travels up;
//! the binary recovers the [`DeployError`] by downcast and maps its [`ErrorClass`]
//! to a stable exit code.

use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

/// Coarse classification used to pick an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Nothing has been mutated yet (wrong branch, bad config, path inside repo).
    Precondition,
    /// A critical external command failed.
    Command,
    /// Artifacts or publish markers did not pass verification.
    Verification,
    /// A workspace could not be released.
    Release,
    /// The operator interrupted the run.
    Interrupted,
}

impl ErrorClass {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorClass::Precondition => exit_codes::PRECONDITION,
            ErrorClass::Command => exit_codes::FAILURE,
            ErrorClass::Verification => exit_codes::VERIFICATION,
            ErrorClass::Release => exit_codes::RELEASE,
            ErrorClass::Interrupted => exit_codes::INTERRUPTED,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("not inside a git repository: {detail}")]
    NotARepository { detail: String },

    #[error("remote '{remote}' is not configured for this repository")]
    MissingRemote { remote: String },

    #[error(
        "on branch '{actual}', deployments must run from '{expected}'.\n\
         Move your changes to '{expected}' first:\n  \
         git stash\n  \
         git checkout {expected}\n  \
         git pull {remote} {expected}\n  \
         git merge {actual}\n  \
         git stash apply\n  \
         git push {remote} {expected}"
    )]
    WrongBranch {
        expected: String,
        actual: String,
        remote: String,
    },

    #[error("HEAD is detached in {}", .path.display())]
    DetachedHead { path: PathBuf },

    #[error(
        "workspace path {} is inside the repository at {}",
        .path.display(),
        .root.display()
    )]
    WorkspaceInsideRepository { path: PathBuf, root: PathBuf },

    #[error("workspace path {} already exists", .path.display())]
    WorkspaceCollision { path: PathBuf },

    #[error("command failed ({}): {command}", describe_code(.code))]
    CommandFailed { command: String, code: Option<i32> },

    #[error("build step '{step}' failed")]
    BuildFailed { step: &'static str },

    #[error("required artifact missing: {artifact} ({})", .path.display())]
    ArtifactMissing { artifact: String, path: PathBuf },

    #[error("publish domain is empty")]
    EmptyDomain,

    #[error("publish domain '{domain}' is invalid: {reason}")]
    InvalidDomain { domain: String, reason: &'static str },

    #[error("domain binding {} holds '{found}', expected '{expected}'", .path.display())]
    DomainMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("publish marker missing: {}", .path.display())]
    MarkerMissing { path: PathBuf },

    #[error(
        "fallback document {} differs from entry document {}",
        .fallback.display(),
        .entry.display()
    )]
    FallbackMismatch { entry: PathBuf, fallback: PathBuf },

    #[error("publish workspace {} is not on branch '{branch}'", .path.display())]
    PublishBranchDetached { path: PathBuf, branch: String },

    #[error(
        "workspace {} still present after removal: {reason}; \
         check whether another process (editor, file watcher, shell) holds it open, \
         then remove it and run `git worktree prune`",
        .path.display()
    )]
    ReleaseFailed { path: PathBuf, reason: String },

    #[error(
        "branch '{branch}' is checked out in another working tree at {}; \
         remove it with `git worktree remove --force {}` and retry",
        .path.display(),
        .path.display()
    )]
    PublishBranchInUse { branch: String, path: PathBuf },

    #[error("interrupted")]
    Interrupted,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeployError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DeployError::NotARepository { .. }
            | DeployError::MissingRemote { .. }
            | DeployError::WrongBranch { .. }
            | DeployError::DetachedHead { .. }
            | DeployError::WorkspaceInsideRepository { .. }
            | DeployError::WorkspaceCollision { .. }
            | DeployError::EmptyDomain
            | DeployError::InvalidDomain { .. }
            | DeployError::InvalidConfig(_) => ErrorClass::Precondition,
            DeployError::CommandFailed { .. }
            | DeployError::BuildFailed { .. }
            | DeployError::PublishBranchDetached { .. } => ErrorClass::Command,
            DeployError::ArtifactMissing { .. }
            | DeployError::DomainMismatch { .. }
            | DeployError::MarkerMissing { .. }
            | DeployError::FallbackMismatch { .. } => ErrorClass::Verification,
            DeployError::ReleaseFailed { .. } | DeployError::PublishBranchInUse { .. } => {
                ErrorClass::Release
            }
            DeployError::Interrupted => ErrorClass::Interrupted,
        }
    }
}

/// Exit code for an error, using the outermost [`DeployError`] attached to it
/// (as the error itself or as context) and `FAILURE` when there is none.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<DeployError>()
        .map_or(exit_codes::FAILURE, |deploy| deploy.class().exit_code())
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
