//! Disposable working trees for the build and publish steps.
//!
//! Every workspace lives outside the repository root under a per-run unique name.
//! [`WorkspaceGuard`] owns one working tree: `release()` destroys it and reports
//! failure; dropping an unreleased guard destroys it on the error path and logs
//! anything that could not be cleaned up.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, error, info, instrument, warn};

use crate::core::paths::{assert_outside_repository, workspace_dir_name};
use crate::core::types::{Purpose, Workspace};
use crate::error::DeployError;
use crate::io::git::Git;

/// Allocates, creates, and destroys working trees for one repository.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    git: Git,
    repo_root: PathBuf,
    base_dir: PathBuf,
    prefix: String,
}

impl WorkspaceManager {
    /// `git` must run at the repository root. `base_dir` is created if missing and
    /// must resolve to a directory outside the repository.
    pub fn new(git: Git, base_dir: &Path, prefix: impl Into<String>) -> Result<Self> {
        let repo_root = git.repo_root()?;
        fs::create_dir_all(base_dir)
            .with_context(|| format!("create workspace base {}", base_dir.display()))?;
        let base_dir = base_dir
            .canonicalize()
            .with_context(|| format!("canonicalize {}", base_dir.display()))?;
        assert_outside_repository(&repo_root, &base_dir)?;
        Ok(Self {
            git,
            repo_root,
            base_dir,
            prefix: prefix.into(),
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Repository-level git handle (runs at the repository root).
    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Pick a fresh, unused path for a workspace of `purpose`.
    pub fn allocate_path(&self, purpose: Purpose) -> Result<PathBuf> {
        let name = workspace_dir_name(
            &self.prefix,
            purpose,
            std::process::id(),
            &generate_timestamp(),
            &generate_short_id(),
        );
        let path = self.base_dir.join(name);
        assert_outside_repository(&self.repo_root, &path)?;
        if path.exists() {
            return Err(DeployError::WorkspaceCollision { path }.into());
        }
        debug!(path = %path.display(), %purpose, "allocated workspace path");
        Ok(path)
    }

    /// Create a working tree at a fresh path with HEAD detached at `rev`.
    #[instrument(skip_all, fields(purpose = %purpose, rev = %rev))]
    pub fn create_detached(&self, purpose: Purpose, rev: &str) -> Result<WorkspaceGuard> {
        let path = self.allocate_path(purpose)?;
        self.git
            .worktree_add_detached(&path, rev)
            .with_context(|| format!("create {purpose} workspace"))?;
        info!(path = %path.display(), "created detached {purpose} workspace");
        Ok(self.guard(Workspace {
            path,
            purpose,
            bound_ref: None,
        }))
    }

    /// Create a working tree at a fresh path with `branch` checked out.
    #[instrument(skip_all, fields(purpose = %purpose, branch = %branch))]
    pub fn create_on_branch(&self, purpose: Purpose, branch: &str) -> Result<WorkspaceGuard> {
        let path = self.allocate_path(purpose)?;
        self.git
            .worktree_add_branch(&path, branch)
            .with_context(|| format!("create {purpose} workspace on {branch}"))?;
        info!(path = %path.display(), "created {purpose} workspace on {branch}");
        Ok(self.guard(Workspace {
            path,
            purpose,
            bound_ref: Some(branch.to_string()),
        }))
    }

    /// Deregister and delete the working tree at `path`, then confirm it is gone.
    pub fn destroy(&self, path: &Path) -> Result<()> {
        destroy_worktree(&self.git, path)
    }

    /// Free `branch` from working trees left behind by earlier runs.
    ///
    /// A run killed before its guards ran leaves its publish workspace on disk with
    /// the branch checked out, which blocks both moving the branch and attaching a
    /// new working tree to it. Trees under the base directory carrying this
    /// manager's prefix are destroyed; any other tree holding the branch belongs to
    /// someone else and is reported instead.
    #[instrument(skip_all, fields(branch = %branch))]
    pub fn reclaim_branch(&self, branch: &str) -> Result<usize> {
        let mut reclaimed = 0;
        for entry in self.git.worktrees()? {
            if entry.branch.as_deref() != Some(branch) {
                continue;
            }
            if !self.owns(&entry.path) {
                return Err(DeployError::PublishBranchInUse {
                    branch: branch.to_string(),
                    path: entry.path,
                }
                .into());
            }
            warn!(path = %entry.path.display(), "removing stale workspace from an earlier run");
            destroy_worktree(&self.git, &entry.path)?;
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    /// True if `path` looks like a workspace this manager allocates.
    fn owns(&self, path: &Path) -> bool {
        let lead = format!("{}-", self.prefix);
        path.parent() == Some(self.base_dir.as_path())
            && path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(&lead))
    }

    fn guard(&self, workspace: Workspace) -> WorkspaceGuard {
        WorkspaceGuard {
            git: self.git.clone(),
            workspace,
            released: false,
        }
    }
}

/// Scoped ownership of one working tree.
#[derive(Debug)]
pub struct WorkspaceGuard {
    git: Git,
    workspace: Workspace,
    released: bool,
}

impl WorkspaceGuard {
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn path(&self) -> &Path {
        &self.workspace.path
    }

    /// Git handle running inside this workspace.
    pub fn git(&self) -> Git {
        self.git.at(&self.workspace.path)
    }

    /// Record the branch now checked out (after an orphan switch, for example).
    pub fn bind(&mut self, branch: impl Into<String>) {
        self.workspace.bound_ref = Some(branch.into());
    }

    /// Destroy the working tree, surfacing any failure.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        destroy_worktree(&self.git, &self.workspace.path)
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            path = %self.workspace.path.display(),
            purpose = %self.workspace.purpose,
            "releasing workspace on early exit"
        );
        if let Err(err) = destroy_worktree(&self.git, &self.workspace.path) {
            let msg = format!("{err:#}");
            error!(err = %msg, "workspace cleanup failed");
        }
    }
}

/// Deregister, prune, delete, then verify the working tree is really gone.
///
/// Deregistration failures are tolerated (the tree may never have been fully
/// created); a path that still exists or is still registered afterwards is an
/// error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn destroy_worktree(git: &Git, path: &Path) -> Result<()> {
    if !git.worktree_remove(path)? {
        debug!("git worktree remove did not succeed, falling back to delete + prune");
    }
    if path.exists()
        && let Err(err) = fs::remove_dir_all(path)
    {
        warn!(err = %err, "remove_dir_all failed");
    }
    git.worktree_prune()?;

    let registered = git.worktree_paths()?;
    check_released(path, &registered)?;
    info!("workspace released");
    Ok(())
}

/// Fail unless `path` is absent on disk and absent from `registered`.
pub fn check_released(path: &Path, registered: &[PathBuf]) -> Result<(), DeployError> {
    if path.exists() {
        return Err(DeployError::ReleaseFailed {
            path: path.to_path_buf(),
            reason: "directory still exists".to_string(),
        });
    }
    if registered.iter().any(|candidate| candidate == path) {
        return Err(DeployError::ReleaseFailed {
            path: path.to_path_buf(),
            reason: "still registered as a git working tree".to_string(),
        });
    }
    Ok(())
}

/// Identifier for one invocation: UTC timestamp plus a random suffix.
pub fn generate_run_id() -> String {
    format!("{}-{}", generate_timestamp(), generate_short_id())
}

fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}
