//! Test-only fixture: a real git repository with a bare remote and a tiny build.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use crate::io::config::DeployConfig;
use crate::io::interrupt::Interrupt;
use crate::io::process::CommandRunner;

pub const TEST_DOMAIN: &str = "example.com";

/// Build script committed to every fixture repository. Copies `site/index.html`
/// into the output and emits one script bundle.
const BUILD_SCRIPT: &str = "#!/bin/sh\nset -e\nmkdir -p dist/assets\n\
cp site/index.html dist/index.html\necho 'console.log(\"app\")' > dist/assets/app.js\n";

/// Repository on `main`, pushed to a bare `origin`, with a workspace base
/// directory outside the repository.
pub struct TestRepo {
    _temp: TempDir,
    root: PathBuf,
    repo: PathBuf,
    remote: PathBuf,
    workspaces: PathBuf,
}

impl TestRepo {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().canonicalize().expect("canonicalize tempdir");
        let repo = root.join("repo");
        let remote = root.join("remote.git");
        let workspaces = root.join("workspaces");
        fs::create_dir_all(&repo).expect("mkdir repo");
        fs::create_dir_all(&workspaces).expect("mkdir workspaces");

        git_in(&root, &["init", "--quiet", "--bare", "remote.git"]);
        git_in(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git_in(&repo, &["init", "--quiet"]);
        git_in(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git_in(&repo, &["config", "user.name", "Deployer Test"]);
        git_in(&repo, &["config", "user.email", "deployer@example.com"]);
        git_in(&repo, &["config", "commit.gpgsign", "false"]);
        let remote_url = remote.to_string_lossy().to_string();
        git_in(&repo, &["remote", "add", "origin", &remote_url]);

        let fixture = Self {
            _temp: temp,
            root,
            repo,
            remote,
            workspaces,
        };
        fixture.write("build.sh", BUILD_SCRIPT);
        fixture.write(".gitignore", "dist/\n");
        fixture.write("site/index.html", "<html>v1</html>\n");
        fixture.git(&["add", "-A"]);
        fixture.git(&["commit", "--quiet", "-m", "Initial commit"]);
        fixture.git(&["push", "--quiet", "origin", "refs/heads/main:refs/heads/main"]);
        fixture
    }

    pub fn path(&self) -> &Path {
        &self.repo
    }

    pub fn remote_path(&self) -> &Path {
        &self.remote
    }

    pub fn workspace_base(&self) -> &Path {
        &self.workspaces
    }

    /// Write a file relative to the repository root, creating parents.
    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.repo.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir parent");
        }
        fs::write(path, contents).expect("write fixture file");
    }

    /// Run git in the repository and return trimmed stdout; panics on failure.
    pub fn git(&self, args: &[&str]) -> String {
        git_in(&self.repo, args)
    }

    /// Run git against the bare remote.
    pub fn remote_git(&self, args: &[&str]) -> String {
        git_in(&self.remote, args)
    }

    /// Whether the bare remote has `branch`.
    pub fn remote_has_branch(&self, branch: &str) -> bool {
        let refname = format!("refs/heads/{branch}");
        Command::new("git")
            .args(["show-ref", "--verify", "--quiet", &refname])
            .current_dir(&self.remote)
            .status()
            .expect("git show-ref")
            .success()
    }

    /// Number of commits on `branch` in the bare remote.
    pub fn remote_commit_count(&self, branch: &str) -> usize {
        self.remote_git(&["rev-list", "--count", branch])
            .parse()
            .expect("commit count")
    }

    /// Registered working trees, the main one included.
    pub fn worktree_count(&self) -> usize {
        self.git(&["worktree", "list", "--porcelain"])
            .lines()
            .filter(|line| line.starts_with("worktree "))
            .count()
    }

    /// Entries left in the workspace base directory.
    pub fn leftover_workspaces(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.workspaces)
            .expect("read workspace base")
            .map(|entry| entry.expect("entry").path())
            .collect()
    }

    /// Config pointing at this fixture: shell build, no install step.
    pub fn config(&self) -> DeployConfig {
        let mut config = DeployConfig {
            domain: TEST_DOMAIN.to_string(),
            ..DeployConfig::default()
        };
        config.build.install = Vec::new();
        config.build.command = vec!["sh".to_string(), "build.sh".to_string()];
        config.workspace.base_dir = Some(self.workspaces.clone());
        config
    }

    /// Write `config()` as a TOML file next to (not inside) the repository.
    pub fn write_config_file(&self) -> PathBuf {
        let path = self.root.join("deploy.toml");
        let contents = toml::to_string(&self.config()).expect("serialize config");
        fs::write(&path, contents).expect("write config");
        path
    }

    pub fn runner(&self) -> CommandRunner {
        CommandRunner::new(false, Interrupt::new())
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Run git in `dir`, panicking with its stderr on failure.
pub fn git_in(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}
