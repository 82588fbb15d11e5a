//! Reconcile the publish branch with its remote and publish verified build output.
//!
//! Working trees left holding the publish branch by an earlier, killed run are
//! reclaimed first. Obtaining the publish workspace then follows where the branch
//! exists:
//!
//! - on the remote: create or fast-forward a local tracking branch, then attach a
//!   working tree to it;
//! - only locally: attach a working tree to it;
//! - nowhere: attach a detached working tree, switch it to an orphan branch, and
//!   clear inherited tracked files.
//!
//! Whatever the path, the workspace must end up on the publish branch (never
//! detached) before anything is written. When the branch exists remotely the
//! workspace is reset to the remote tip before its contents are replaced, so the
//! push is always a fast-forward of remote truth.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::artifacts::{ArtifactSet, PublishMarkerSet};
use crate::core::domain::{normalize_domain, render_binding, verify_binding};
use crate::core::types::{BranchLocation, CommitOutcome, Purpose};
use crate::error::DeployError;
use crate::io::config::SiteConfig;
use crate::io::fsops::{GIT_METADATA, copy_tree, files_identical, wipe_except};
use crate::io::git::Git;
use crate::io::workspace::{WorkspaceGuard, WorkspaceManager};

/// Outcome of publishing one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub commit: CommitOutcome,
    /// Commit id at the tip of the publish branch after the push.
    pub head: String,
}

pub struct PublishReconciler<'a> {
    manager: &'a WorkspaceManager,
    remote: &'a str,
    branch: &'a str,
}

impl<'a> PublishReconciler<'a> {
    pub fn new(manager: &'a WorkspaceManager, remote: &'a str, branch: &'a str) -> Self {
        Self {
            manager,
            remote,
            branch,
        }
    }

    fn repo(&self) -> &Git {
        self.manager.git()
    }

    /// Where the publish branch exists right now (queried, never cached).
    pub fn locate(&self) -> Result<BranchLocation> {
        let on_remote = self.repo().has_remote_branch(self.remote, self.branch)?;
        let local = self.repo().has_local_branch(self.branch)?;
        Ok(BranchLocation::classify(on_remote, local))
    }

    /// Obtain a working tree with the publish branch checked out.
    #[instrument(skip_all, fields(remote = %self.remote, branch = %self.branch))]
    pub fn ensure_deploy_workspace(&self) -> Result<WorkspaceGuard> {
        let reclaimed = self.manager.reclaim_branch(self.branch)?;
        if reclaimed > 0 {
            info!(reclaimed, "released stale publish workspaces");
        }
        let location = self.locate()?;
        info!(?location, "publish branch located");
        let mut guard = match location {
            BranchLocation::Remote => {
                self.prepare_local_from_remote()?;
                self.manager.create_on_branch(Purpose::Deploy, self.branch)?
            }
            BranchLocation::LocalOnly => {
                self.manager.create_on_branch(Purpose::Deploy, self.branch)?
            }
            BranchLocation::Nowhere => {
                let mut guard = self.manager.create_detached(Purpose::Deploy, "HEAD")?;
                let git = guard.git();
                git.checkout_orphan(self.branch)
                    .with_context(|| format!("create orphan branch {}", self.branch))?;
                git.remove_all_tracked()
                    .context("clear files inherited by the orphan branch")?;
                guard.bind(self.branch);
                info!(branch = %self.branch, "started publish branch with no history");
                guard
            }
        };
        ensure_on_branch(&guard.git(), self.branch)?;
        guard.bind(self.branch);
        Ok(guard)
    }

    /// Fetch the remote branch and create or fast-forward the local one from it.
    fn prepare_local_from_remote(&self) -> Result<()> {
        let repo = self.repo();
        repo.fetch_branch(self.remote, self.branch)?;
        let upstream = self.upstream();
        if !repo.has_local_branch(self.branch)? {
            debug!(upstream = %upstream, "creating local tracking branch");
            return repo.create_tracking_branch(self.branch, &upstream);
        }
        if repo.rev_parse(self.branch)? == repo.rev_parse(&upstream)? {
            debug!(upstream = %upstream, "local publish branch already at remote tip");
            return Ok(());
        }
        if repo.is_ancestor(self.branch, &upstream)? {
            debug!(upstream = %upstream, "fast-forwarding local publish branch");
            return repo.move_branch(self.branch, &upstream);
        }
        warn!(
            branch = %self.branch,
            upstream = %upstream,
            "local publish branch diverged from remote; workspace will be reset to the remote tip"
        );
        Ok(())
    }

    /// If the branch exists remotely, fetch it and hard-reset the workspace to it.
    #[instrument(skip_all, fields(path = %workspace.path().display()))]
    pub fn synchronize(&self, workspace: &WorkspaceGuard) -> Result<bool> {
        if !self.repo().has_remote_branch(self.remote, self.branch)? {
            debug!("publish branch not on remote yet, nothing to synchronize");
            return Ok(false);
        }
        let git = workspace.git();
        git.fetch_branch(self.remote, self.branch)?;
        git.reset_hard(&self.upstream())
            .context("reset publish workspace to remote")?;
        info!(upstream = %self.upstream(), "publish workspace reset to remote tip");
        Ok(true)
    }

    /// Stage everything, commit if anything changed, and push branch-to-branch.
    #[instrument(skip_all, fields(path = %workspace.path().display()))]
    pub fn commit_and_push(
        &self,
        workspace: &WorkspaceGuard,
        message: &str,
    ) -> Result<PublishOutcome> {
        let git = workspace.git();
        ensure_on_branch(&git, self.branch)?;
        git.add_all()?;
        let commit = git.commit_staged(message)?;
        match commit {
            CommitOutcome::Committed => info!("committed new site content"),
            CommitOutcome::NoChanges => info!("site content unchanged, nothing to commit"),
        }
        git.push_branch(self.remote, self.branch)
            .with_context(|| format!("push {} to {}", self.branch, self.remote))?;
        let head = git
            .rev_parse("HEAD")?
            .with_context(|| format!("{} has no commits after publishing", self.branch))?;
        info!(head = %head, "publish branch pushed");
        Ok(PublishOutcome { commit, head })
    }

    /// Full publish sequence on an already obtained workspace.
    pub fn publish(
        &self,
        workspace: &WorkspaceGuard,
        artifacts: &ArtifactSet,
        site: &SiteConfig,
        domain: &str,
        message: &str,
    ) -> Result<PublishOutcome> {
        self.synchronize(workspace)?;
        replace_contents(workspace.path(), &artifacts.output_dir)?;
        enforce_markers(workspace.path(), site, domain)?;
        self.commit_and_push(workspace, message)
    }

    fn upstream(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }
}

/// Make sure HEAD in `git`'s workdir is `branch`, switching to it if needed.
pub fn ensure_on_branch(git: &Git, branch: &str) -> Result<()> {
    let head = git.head_branch()?;
    if head.as_deref() == Some(branch) {
        return Ok(());
    }
    warn!(?head, branch, "publish workspace not on the publish branch, switching");
    if let Err(err) = git.checkout(branch) {
        debug!(err = %err, "checkout of publish branch failed");
    }
    if git.head_branch()?.as_deref() == Some(branch) {
        return Ok(());
    }
    Err(DeployError::PublishBranchDetached {
        path: git.workdir().to_path_buf(),
        branch: branch.to_string(),
    }
    .into())
}

/// Wipe everything except git metadata, then copy the build output in.
///
/// Always wipe-then-copy: copying first would let the wipe delete fresh files.
#[instrument(skip_all, fields(workspace = %workspace.display()))]
pub fn replace_contents(workspace: &Path, output_dir: &Path) -> Result<()> {
    let removed = wipe_except(workspace, &[GIT_METADATA])?;
    let copied = copy_tree(output_dir, workspace, &[GIT_METADATA])?;
    info!(removed, copied, "replaced publish workspace contents");
    Ok(())
}

/// Write the domain binding: reject empty input before touching the file, then
/// read it back and compare.
pub fn write_domain_binding(path: &Path, domain: &str) -> Result<String> {
    let domain = normalize_domain(domain)?;
    fs::write(path, render_binding(&domain))
        .with_context(|| format!("write {}", path.display()))?;
    let written =
        fs::read_to_string(path).with_context(|| format!("read back {}", path.display()))?;
    verify_binding(path, &written, &domain)?;
    Ok(domain)
}

/// Write the preprocessing marker and domain binding, then verify the full
/// marker set. Runs after content replacement so build output cannot override it.
#[instrument(skip_all, fields(workspace = %workspace.display(), domain = %domain))]
pub fn enforce_markers(
    workspace: &Path,
    site: &SiteConfig,
    domain: &str,
) -> Result<PublishMarkerSet> {
    let markers = PublishMarkerSet {
        entry_document: workspace.join(&site.entry_document),
        fallback_document: workspace.join(&site.fallback_document),
        preprocessing_marker: workspace.join(&site.preprocessing_marker),
        domain_binding: workspace.join(&site.domain_file),
    };
    fs::write(&markers.preprocessing_marker, "")
        .with_context(|| format!("write {}", markers.preprocessing_marker.display()))?;
    let domain = write_domain_binding(&markers.domain_binding, domain)?;
    verify_markers(&markers, &domain)?;
    info!("publish markers verified");
    Ok(markers)
}

/// Every marker present, fallback identical to entry, domain binding exact.
pub fn verify_markers(markers: &PublishMarkerSet, domain: &str) -> Result<()> {
    for path in markers.all() {
        if !path.is_file() {
            return Err(DeployError::MarkerMissing {
                path: path.to_path_buf(),
            }
            .into());
        }
    }
    if !files_identical(&markers.entry_document, &markers.fallback_document)? {
        return Err(DeployError::FallbackMismatch {
            entry: markers.entry_document.clone(),
            fallback: markers.fallback_document.clone(),
        }
        .into());
    }
    let binding = fs::read_to_string(&markers.domain_binding)
        .with_context(|| format!("read {}", markers.domain_binding.display()))?;
    verify_binding(&markers.domain_binding, &binding, domain)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_workspace(root: &Path) {
        fs::write(root.join("index.html"), "<html>").expect("write");
        fs::write(root.join("404.html"), "<html>").expect("write");
    }

    #[test]
    fn domain_binding_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("CNAME");
        let domain = write_domain_binding(&path, "example.com").expect("write");
        assert_eq!(domain, "example.com");
        assert_eq!(fs::read_to_string(&path).expect("read").trim_end(), "example.com");
        assert_eq!(fs::read_to_string(&path).expect("read"), "example.com\n");
    }

    #[test]
    fn empty_domain_is_rejected_before_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("CNAME");
        let err = write_domain_binding(&path, "  ").expect_err("empty");
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::EmptyDomain)
        ));
        assert!(!path.exists());
    }

    #[test]
    fn markers_override_build_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        populated_workspace(temp.path());
        fs::write(temp.path().join("CNAME"), "stale.example.org\n").expect("write");

        let markers =
            enforce_markers(temp.path(), &SiteConfig::default(), "example.com").expect("markers");
        assert_eq!(
            fs::read_to_string(&markers.domain_binding).expect("read"),
            "example.com\n"
        );
        assert!(markers.preprocessing_marker.is_file());
    }

    #[test]
    fn missing_fallback_fails_verification() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("index.html"), "<html>").expect("write");
        let err = enforce_markers(temp.path(), &SiteConfig::default(), "example.com")
            .expect_err("missing fallback");
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::MarkerMissing { .. })
        ));
    }

    #[test]
    fn diverging_fallback_fails_verification() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("index.html"), "<html>").expect("write");
        fs::write(temp.path().join("404.html"), "<html>old").expect("write");
        let err = enforce_markers(temp.path(), &SiteConfig::default(), "example.com")
            .expect_err("mismatch");
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::FallbackMismatch { .. })
        ));
    }

    #[test]
    fn replace_wipes_old_files_and_keeps_git_metadata() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = temp.path().join("ws");
        let output = temp.path().join("dist");
        fs::create_dir_all(&workspace).expect("mkdir");
        fs::create_dir_all(output.join("assets")).expect("mkdir");
        fs::write(workspace.join(".git"), "gitdir: elsewhere\n").expect("write");
        fs::write(workspace.join("stale.html"), "old").expect("write");
        fs::write(output.join("index.html"), "<html>").expect("write");
        fs::write(output.join("assets/app.js"), "js").expect("write");

        replace_contents(&workspace, &output).expect("replace");
        assert!(!workspace.join("stale.html").exists());
        assert!(workspace.join("assets/app.js").is_file());
        assert_eq!(
            fs::read_to_string(workspace.join(".git")).expect("read"),
            "gitdir: elsewhere\n"
        );
    }
}
