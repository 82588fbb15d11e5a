//! Git adapter for the deployer.
//!
//! Read-only queries (current branch, repository root, branch existence locally
//! and on the remote) are never cached: remote state may change between two
//! queries within one run. Mutations are explicit wrappers around single `git`
//! invocations routed through [`CommandRunner`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::types::CommitOutcome;
use crate::error::DeployError;
use crate::io::process::{CommandOutcome, CommandRunner, CommandSpec, Mode, Output};

const CAPTURE: Mode = Mode::critical(Output::Capture);
const QUIET: Mode = Mode::critical(Output::Quiet);
const PROBE: Mode = Mode::tolerated(Output::Quiet);

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Short branch name, `None` when detached or bare.
    pub branch: Option<String>,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    runner: CommandRunner,
    workdir: PathBuf,
}

impl Git {
    pub fn new(runner: CommandRunner, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// Same runner, different working directory (e.g. inside a workspace).
    pub fn at(&self, workdir: impl Into<PathBuf>) -> Self {
        Self::new(self.runner.clone(), workdir)
    }

    // ---- RepositoryState -------------------------------------------------

    /// Canonical top-level directory of the repository containing `workdir`.
    #[instrument(skip_all)]
    pub fn repo_root(&self) -> Result<PathBuf> {
        let out = self.run(
            &["rev-parse", "--show-toplevel"],
            Mode::tolerated(Output::Capture),
        )?;
        if !out.success() || out.stdout_trimmed().is_empty() {
            return Err(DeployError::NotARepository {
                detail: format!("{} is not inside a work tree", self.workdir.display()),
            }
            .into());
        }
        let root = PathBuf::from(out.stdout_trimmed());
        let root = root
            .canonicalize()
            .with_context(|| format!("canonicalize {}", root.display()))?;
        debug!(root = %root.display(), "repository root");
        Ok(root)
    }

    /// Branch checked out at HEAD, or `None` when detached.
    ///
    /// Works on unborn branches (fresh orphan) where `rev-parse HEAD` would fail.
    pub fn head_branch(&self) -> Result<Option<String>> {
        let out = self.run(
            &["symbolic-ref", "--quiet", "--short", "HEAD"],
            Mode::tolerated(Output::Capture),
        )?;
        match out.code() {
            Some(0) => Ok(Some(out.stdout_trimmed().to_string())),
            Some(1) => Ok(None),
            code => Err(DeployError::CommandFailed {
                command: "git symbolic-ref --quiet --short HEAD".to_string(),
                code,
            }
            .into()),
        }
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        match self.head_branch()? {
            Some(name) => {
                debug!(branch = %name, "current branch");
                Ok(name)
            }
            None => {
                warn!("detached HEAD detected");
                Err(DeployError::DetachedHead {
                    path: self.workdir.clone(),
                }
                .into())
            }
        }
    }

    /// Check whether a local branch exists.
    pub fn has_local_branch(&self, branch: &str) -> Result<bool> {
        let refname = format!("refs/heads/{branch}");
        let out = self.run(&["show-ref", "--verify", "--quiet", &refname], PROBE)?;
        Ok(out.success())
    }

    /// Ask the remote (over the network) whether `branch` exists there.
    #[instrument(skip_all, fields(remote = %remote, branch = %branch))]
    pub fn has_remote_branch(&self, remote: &str, branch: &str) -> Result<bool> {
        let refname = format!("refs/heads/{branch}");
        let args: [&str; 5] = ["ls-remote", "--exit-code", "--heads", remote, &refname];
        let out = self.run(&args, PROBE)?;
        match out.code() {
            Some(0) => Ok(true),
            // `--exit-code` reports "no matching refs" as 2.
            Some(2) => Ok(false),
            code => {
                warn!(exit_code = ?code, "ls-remote failed");
                self.runner.show_failure(&self.spec(&args));
                Err(DeployError::CommandFailed {
                    command: format!("git {}", args.join(" ")),
                    code,
                }
                .into())
            }
        }
    }

    pub fn has_remote(&self, remote: &str) -> Result<bool> {
        let out = self.run(&["remote", "get-url", remote], PROBE)?;
        Ok(out.success())
    }

    /// Resolve a revision to a full commit id, `None` if it does not resolve.
    pub fn rev_parse(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{rev}^{{commit}}");
        let out = self.run(
            &["rev-parse", "--verify", "--quiet", &spec],
            Mode::tolerated(Output::Capture),
        )?;
        if out.success() {
            return Ok(Some(out.stdout_trimmed().to_string()));
        }
        Ok(None)
    }

    /// True if `ancestor` is reachable from `descendant`.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let out = self.run(&["merge-base", "--is-ancestor", ancestor, descendant], PROBE)?;
        Ok(out.success())
    }

    // ---- staging / commits / transport ------------------------------------

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run(&["add", "-A"], QUIET)?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"], CAPTURE)?;
        Ok(!out.stdout_trimmed().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// An empty index is reported as [`CommitOutcome::NoChanges`], not an error.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<CommitOutcome> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(CommitOutcome::NoChanges);
        }
        debug!("committing staged changes");
        self.run(&["commit", "--quiet", "-m", message], QUIET)?;
        Ok(CommitOutcome::Committed)
    }

    /// Push `branch` to the identically named remote branch.
    ///
    /// Uses an explicit `refs/heads/<b>:refs/heads/<b>` refspec and never forces,
    /// so a remote that moved independently rejects the push instead of losing
    /// history.
    #[instrument(skip_all, fields(remote = %remote, branch = %branch))]
    pub fn push_branch(&self, remote: &str, branch: &str) -> Result<()> {
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.run(&["push", "--quiet", remote, &refspec], QUIET)?;
        Ok(())
    }

    /// Update `refs/remotes/<remote>/<branch>` from the remote.
    #[instrument(skip_all, fields(remote = %remote, branch = %branch))]
    pub fn fetch_branch(&self, remote: &str, branch: &str) -> Result<()> {
        let refspec = format!("+refs/heads/{branch}:refs/remotes/{remote}/{branch}");
        self.run(&["fetch", "--quiet", remote, &refspec], QUIET)?;
        Ok(())
    }

    pub fn reset_hard(&self, rev: &str) -> Result<()> {
        self.run(&["reset", "--quiet", "--hard", rev], QUIET)?;
        Ok(())
    }

    // ---- branches ----------------------------------------------------------

    /// Create local `branch` tracking `upstream` (e.g. `origin/gh-pages`).
    pub fn create_tracking_branch(&self, branch: &str, upstream: &str) -> Result<()> {
        self.run(&["branch", "--quiet", "--track", branch, upstream], QUIET)?;
        Ok(())
    }

    /// Move local `branch` to `rev`. Callers only use this for fast-forwards.
    pub fn move_branch(&self, branch: &str, rev: &str) -> Result<()> {
        self.run(&["branch", "--quiet", "--force", branch, rev], QUIET)?;
        Ok(())
    }

    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", branch], QUIET)?;
        Ok(())
    }

    /// Switch to a new branch with no history, keeping the index.
    pub fn checkout_orphan(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", "--orphan", branch], QUIET)?;
        Ok(())
    }

    /// Remove every tracked file from the index and the working tree.
    pub fn remove_all_tracked(&self) -> Result<()> {
        self.run(&["rm", "-r", "-f", "--quiet", "--ignore-unmatch", "."], QUIET)?;
        Ok(())
    }

    // ---- working trees -----------------------------------------------------

    /// `git worktree add --detach <path> <rev>`.
    #[instrument(skip_all, fields(path = %path.display(), rev = %rev))]
    pub fn worktree_add_detached(&self, path: &Path, rev: &str) -> Result<()> {
        let spec = self
            .spec(&["worktree", "add", "--detach"])
            .arg(path)
            .arg(rev);
        self.runner.run(&spec, QUIET)?;
        Ok(())
    }

    /// `git worktree add <path> <branch>`, checking the branch out.
    #[instrument(skip_all, fields(path = %path.display(), branch = %branch))]
    pub fn worktree_add_branch(&self, path: &Path, branch: &str) -> Result<()> {
        let spec = self.spec(&["worktree", "add"]).arg(path).arg(branch);
        self.runner.run(&spec, QUIET)?;
        Ok(())
    }

    /// Deregister and delete a working tree. Failure is reported, not raised.
    pub fn worktree_remove(&self, path: &Path) -> Result<bool> {
        let spec = self.spec(&["worktree", "remove", "--force"]).arg(path);
        let out = self.runner.run(&spec, PROBE)?;
        Ok(out.success())
    }

    /// Drop registrations whose directories no longer exist.
    pub fn worktree_prune(&self) -> Result<()> {
        let out = self.run(&["worktree", "prune"], PROBE)?;
        if !out.success() {
            warn!("git worktree prune failed");
        }
        Ok(())
    }

    /// All registered working trees, the main one included.
    pub fn worktrees(&self) -> Result<Vec<WorktreeEntry>> {
        let out = self.run(&["worktree", "list", "--porcelain"], CAPTURE)?;
        Ok(parse_worktree_list(out.stdout.as_deref().unwrap_or_default()))
    }

    /// Paths of all registered working trees, the main one included.
    pub fn worktree_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .worktrees()?
            .into_iter()
            .map(|entry| entry.path)
            .collect())
    }

    fn spec(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new("git", &self.workdir).args(args)
    }

    fn run(&self, args: &[&str], mode: Mode) -> Result<CommandOutcome> {
        self.runner.run(&self.spec(args), mode)
    }
}

fn parse_worktree_list(porcelain: &str) -> Vec<WorktreeEntry> {
    let mut entries: Vec<WorktreeEntry> = Vec::new();
    for line in porcelain.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            entries.push(WorktreeEntry {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let Some(refname) = line.strip_prefix("branch ")
            && let Some(entry) = entries.last_mut()
        {
            let short = refname.strip_prefix("refs/heads/").unwrap_or(refname);
            entry.branch = Some(short.to_string());
        }
    }
    entries
}
