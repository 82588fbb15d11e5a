//! Orchestration for one deployment run.
//!
//! Each step gates the next: source-branch check, source commit and push, build in
//! an isolated workspace, artifact verification, publish workspace reconciliation,
//! content replacement and marker verification, publish commit and push, then
//! release of both workspaces. Workspaces are held by guards, so they are released
//! on every exit path, including errors and interrupts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::builder;
use crate::core::domain::normalize_domain;
use crate::core::types::{CommitOutcome, DeploymentRun, Purpose};
use crate::error::DeployError;
use crate::io::config::DeployConfig;
use crate::io::git::Git;
use crate::io::process::CommandRunner;
use crate::io::workspace::WorkspaceManager;
use crate::publish::PublishReconciler;

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub run_id: String,
    pub source_commit: CommitOutcome,
    pub publish_commit: CommitOutcome,
    /// Tip of the publish branch after the push.
    pub publish_head: String,
    /// Where the publish workspace lived (already removed).
    pub publish_path: PathBuf,
}

/// Run the whole deployment from `workdir` (anywhere inside the repository).
#[instrument(skip_all, fields(run_id = %run.run_id))]
pub fn run_deploy(
    workdir: &Path,
    config: &DeployConfig,
    run: &DeploymentRun,
    runner: &CommandRunner,
) -> Result<DeployReport> {
    let interrupt = runner.interrupt();
    let domain = normalize_domain(&run.publish_domain)?;

    // Nothing below mutates the repository until the preconditions pass.
    let git = check_preconditions(workdir, config, runner)?;
    let repo_root = git.workdir().to_path_buf();
    let manager = WorkspaceManager::new(
        git.clone(),
        &config.workspace_base(),
        config.workspace.prefix.as_str(),
    )?;
    info!(
        repo = %repo_root.display(),
        branch = %config.source_branch,
        workspaces = %manager.base_dir().display(),
        "preconditions satisfied"
    );
    git.worktree_prune()?;

    interrupt.check()?;
    let source_commit = commit_source(&git, config, &run.commit_message)?;

    interrupt.check()?;
    let build_ws = manager.create_detached(Purpose::Build, "HEAD")?;
    let artifacts = builder::build(runner, build_ws.workspace(), &config.build, &config.site)
        .context("build site")?;

    interrupt.check()?;
    let reconciler = PublishReconciler::new(&manager, &config.remote, &config.publish_branch);
    let deploy_ws = reconciler
        .ensure_deploy_workspace()
        .context("prepare publish workspace")?;
    interrupt.check()?;
    let published = reconciler
        .publish(
            &deploy_ws,
            &artifacts,
            &config.site,
            &domain,
            &config.publish_commit_message,
        )
        .context("publish site")?;

    let publish_path = deploy_ws.path().to_path_buf();
    deploy_ws.release().context("release publish workspace")?;
    build_ws.release().context("release build workspace")?;

    info!(
        source = %source_commit,
        publish = %published.commit,
        head = %published.head,
        "deployment complete"
    );
    Ok(DeployReport {
        run_id: run.run_id.clone(),
        source_commit,
        publish_commit: published.commit,
        publish_head: published.head,
        publish_path,
    })
}

/// Repository checks that gate a run: inside a repository, on the source branch,
/// remote configured. Read-only, so callers may run it before prompting.
///
/// Returns a git handle rooted at the repository top level.
#[instrument(skip_all)]
pub fn check_preconditions(
    workdir: &Path,
    config: &DeployConfig,
    runner: &CommandRunner,
) -> Result<Git> {
    let git = Git::new(runner.clone(), workdir);
    let repo_root = git.repo_root()?;
    let git = git.at(&repo_root);
    let branch = git.current_branch()?;
    if branch != config.source_branch {
        return Err(DeployError::WrongBranch {
            expected: config.source_branch.clone(),
            actual: branch,
            remote: config.remote.clone(),
        }
        .into());
    }
    if !git.has_remote(&config.remote)? {
        return Err(DeployError::MissingRemote {
            remote: config.remote.clone(),
        }
        .into());
    }
    Ok(git)
}

/// Commit pending changes on the source branch and push it.
#[instrument(skip_all, fields(branch = %config.source_branch))]
fn commit_source(git: &Git, config: &DeployConfig, message: &str) -> Result<CommitOutcome> {
    git.add_all()?;
    let outcome = git.commit_staged(message)?;
    match outcome {
        CommitOutcome::Committed => info!(message, "committed source changes"),
        CommitOutcome::NoChanges => info!("source branch clean, nothing to commit"),
    }
    git.push_branch(&config.remote, &config.source_branch)
        .context("push source branch")?;
    Ok(outcome)
}
