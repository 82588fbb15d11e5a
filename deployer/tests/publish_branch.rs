//! Publish-branch reconciliation for each place the branch can exist.

use deployer::core::types::{BranchLocation, DeploymentRun, Purpose};
use deployer::deploy::run_deploy;
use deployer::error::DeployError;
use deployer::io::git::Git;
use deployer::io::workspace::WorkspaceManager;
use deployer::publish::{PublishReconciler, ensure_on_branch};
use deployer::test_support::{TEST_DOMAIN, TestRepo, git_in};

const BRANCH: &str = "gh-pages";

fn manager(repo: &TestRepo) -> WorkspaceManager {
    let git = Git::new(repo.runner(), repo.path());
    WorkspaceManager::new(git, repo.workspace_base(), "site-deploy").expect("manager")
}

#[test]
fn missing_branch_starts_an_orphan_with_no_files() {
    let repo = TestRepo::new();
    let manager = manager(&repo);
    let reconciler = PublishReconciler::new(&manager, "origin", BRANCH);
    assert_eq!(reconciler.locate().expect("locate"), BranchLocation::Nowhere);

    let guard = reconciler.ensure_deploy_workspace().expect("workspace");
    let git = guard.git();
    assert_eq!(git.head_branch().expect("head").as_deref(), Some(BRANCH));
    assert!(git.rev_parse("HEAD").expect("rev-parse").is_none());
    assert!(!guard.path().join("build.sh").exists());
    assert_eq!(guard.workspace().bound_ref.as_deref(), Some(BRANCH));
    guard.release().expect("release");

    assert!(!repo.remote_has_branch(BRANCH));
}

#[test]
fn local_only_branch_is_checked_out() {
    let repo = TestRepo::new();
    repo.git(&["branch", BRANCH]);
    let manager = manager(&repo);
    let reconciler = PublishReconciler::new(&manager, "origin", BRANCH);
    assert_eq!(
        reconciler.locate().expect("locate"),
        BranchLocation::LocalOnly
    );

    let guard = reconciler.ensure_deploy_workspace().expect("workspace");
    assert_eq!(
        guard.git().head_branch().expect("head").as_deref(),
        Some(BRANCH)
    );
    guard.release().expect("release");
}

#[test]
fn remote_branch_gets_a_local_tracking_branch() {
    let repo = TestRepo::new();
    repo.git(&["push", "--quiet", "origin", "refs/heads/main:refs/heads/gh-pages"]);
    let manager = manager(&repo);
    let reconciler = PublishReconciler::new(&manager, "origin", BRANCH);
    assert_eq!(reconciler.locate().expect("locate"), BranchLocation::Remote);

    let guard = reconciler.ensure_deploy_workspace().expect("workspace");
    assert_eq!(
        guard.git().head_branch().expect("head").as_deref(),
        Some(BRANCH)
    );
    assert!(repo.git(&["branch", "--list", BRANCH]).contains(BRANCH));
    guard.release().expect("release");
}

#[test]
fn stale_local_branch_is_fast_forwarded_to_remote() {
    let repo = TestRepo::new();
    repo.git(&["branch", BRANCH]);
    repo.write("site/index.html", "<html>v2</html>\n");
    repo.git(&["commit", "--quiet", "-am", "Second"]);
    repo.git(&["push", "--quiet", "origin", "refs/heads/main:refs/heads/gh-pages"]);
    let remote_tip = repo.remote_git(&["rev-parse", BRANCH]);

    let manager = manager(&repo);
    let reconciler = PublishReconciler::new(&manager, "origin", BRANCH);
    let guard = reconciler.ensure_deploy_workspace().expect("workspace");
    assert_eq!(
        guard.git().rev_parse("HEAD").expect("rev-parse"),
        Some(remote_tip)
    );
    guard.release().expect("release");
}

#[test]
fn synchronize_resets_to_remote_tip() {
    let repo = TestRepo::new();
    repo.git(&["push", "--quiet", "origin", "refs/heads/main:refs/heads/gh-pages"]);
    let manager = manager(&repo);
    let reconciler = PublishReconciler::new(&manager, "origin", BRANCH);
    let guard = reconciler.ensure_deploy_workspace().expect("workspace");

    // Someone else publishes while the workspace is open.
    let clone = repo.workspace_base().join("other-clone");
    let remote_url = repo.remote_path().to_string_lossy().to_string();
    let clone_arg = clone.to_string_lossy().to_string();
    git_in(repo.workspace_base(), &["clone", "--quiet", &remote_url, &clone_arg]);
    git_in(&clone, &["checkout", "--quiet", BRANCH]);
    std::fs::write(clone.join("foreign.txt"), "foreign").expect("write");
    git_in(&clone, &["add", "-A"]);
    git_in(
        &clone,
        &[
            "-c",
            "user.name=Other",
            "-c",
            "user.email=other@example.com",
            "commit",
            "--quiet",
            "-m",
            "Foreign",
        ],
    );
    git_in(&clone, &["push", "--quiet", "origin", BRANCH]);

    assert!(reconciler.synchronize(&guard).expect("synchronize"));
    assert!(guard.path().join("foreign.txt").is_file());
    guard.release().expect("release");
}

#[test]
fn detached_workspace_is_switched_back_to_the_branch() {
    let repo = TestRepo::new();
    repo.git(&["branch", BRANCH]);
    let manager = manager(&repo);
    let guard = manager
        .create_on_branch(Purpose::Deploy, BRANCH)
        .expect("workspace");
    let git = guard.git();
    git_in(guard.path(), &["checkout", "--quiet", "--detach"]);
    assert_eq!(git.head_branch().expect("head"), None);

    ensure_on_branch(&git, BRANCH).expect("switch back");
    assert_eq!(git.head_branch().expect("head").as_deref(), Some(BRANCH));
    guard.release().expect("release");
}

#[test]
fn workspace_left_by_a_killed_run_is_reclaimed() {
    let repo = TestRepo::new();
    let run = DeploymentRun::new("first", "Update site", TEST_DOMAIN);
    run_deploy(repo.path(), &repo.config(), &run, &repo.runner()).expect("first deploy");

    // A run killed mid-publish leaves its working tree with the branch checked out.
    let stale = repo
        .workspace_base()
        .join("site-deploy-deploy-999-20260101000000000-crash0");
    let stale_arg = stale.to_string_lossy().to_string();
    repo.git(&["worktree", "add", "--quiet", &stale_arg, BRANCH]);
    assert_eq!(repo.worktree_count(), 2);

    repo.write("site/index.html", "<html>v2</html>\n");
    let run = DeploymentRun::new("retry", "Change copy", TEST_DOMAIN);
    run_deploy(repo.path(), &repo.config(), &run, &repo.runner()).expect("retry deploy");

    assert!(!stale.exists());
    assert_eq!(repo.worktree_count(), 1);
    assert_eq!(repo.remote_commit_count(BRANCH), 2);
    assert!(repo.leftover_workspaces().is_empty());
}

#[test]
fn branch_held_by_a_foreign_working_tree_is_reported() {
    let repo = TestRepo::new();
    repo.git(&["branch", BRANCH]);
    let elsewhere = tempfile::tempdir().expect("tempdir");
    let held = elsewhere.path().join("pages-checkout");
    let held_arg = held.to_string_lossy().to_string();
    repo.git(&["worktree", "add", "--quiet", &held_arg, BRANCH]);

    let manager = manager(&repo);
    let reconciler = PublishReconciler::new(&manager, "origin", BRANCH);
    let err = reconciler
        .ensure_deploy_workspace()
        .expect_err("branch in use");
    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::PublishBranchInUse { .. })
    ));
    assert!(held.join("build.sh").is_file());
    assert_eq!(repo.worktree_count(), 2);
}
