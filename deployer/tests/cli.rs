//! CLI tests for the `deployer` binary.
//!
//! Spawns the binary inside a fixture repository and checks exit codes and the
//! state left behind.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use deployer::exit_codes;
use deployer::test_support::TestRepo;

fn deployer(repo: &TestRepo) -> Command {
    let config = repo.write_config_file();
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_deployer"));
    cmd.current_dir(repo.path())
        .arg("--config")
        .arg(config)
        .stdin(Stdio::null());
    cmd
}

/// Wait for `child` to exit, killing it and failing the test after `limit`.
fn wait_with_limit(child: &mut Child, limit: Duration) -> ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("try_wait") {
            return status;
        }
        if start.elapsed() > limit {
            child.kill().expect("kill");
            panic!("deployer still running after {limit:?}");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn wrong_branch_exits_with_precondition_code() {
    let repo = TestRepo::new();
    repo.git(&["checkout", "--quiet", "-b", "feature"]);

    let output = deployer(&repo)
        .args(["--message", "Update site"])
        .output()
        .expect("run deployer");

    assert_eq!(output.status.code(), Some(exit_codes::PRECONDITION));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("git checkout main"), "{stderr}");
    assert_eq!(repo.worktree_count(), 1);
    assert!(!repo.remote_has_branch("gh-pages"));
}

#[test]
fn blank_domain_override_exits_with_precondition_code() {
    let repo = TestRepo::new();
    let status = deployer(&repo)
        .args(["--domain", " ", "--message", "Update site"])
        .status()
        .expect("run deployer");
    assert_eq!(status.code(), Some(exit_codes::PRECONDITION));
    assert!(!repo.remote_has_branch("gh-pages"));
}

#[test]
fn successful_run_prints_summary_and_publishes() {
    let repo = TestRepo::new();
    let output = deployer(&repo)
        .args(["--message", "Update site"])
        .output()
        .expect("run deployer");

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("deploy: run="), "{stdout}");
    assert!(stdout.contains("publish=committed"), "{stdout}");
    assert!(repo.remote_has_branch("gh-pages"));
    assert_eq!(repo.worktree_count(), 1);
}

#[test]
fn closed_stdin_uses_default_commit_message() {
    let repo = TestRepo::new();
    repo.write("site/index.html", "<html>v2</html>\n");
    let status = deployer(&repo).status().expect("run deployer");

    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(
        repo.remote_git(&["log", "-1", "--format=%s", "main"]),
        "Update site"
    );
}

#[test]
fn wrong_branch_is_refused_before_prompting() {
    let repo = TestRepo::new();
    repo.git(&["checkout", "--quiet", "-b", "feature"]);

    let mut child = deployer(&repo)
        .stdin(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn deployer");
    let _stdin = child.stdin.take();
    let status = wait_with_limit(&mut child, Duration::from_secs(30));

    assert_eq!(status.code(), Some(exit_codes::PRECONDITION));
    let mut stderr = String::new();
    child
        .stderr
        .take()
        .expect("stderr")
        .read_to_string(&mut stderr)
        .expect("read stderr");
    assert!(!stderr.contains("Commit message"), "{stderr}");
}

#[test]
fn sigint_at_prompt_ends_the_process() {
    let repo = TestRepo::new();
    repo.write("site/index.html", "<html>v2</html>\n");
    let main_before = repo.remote_git(&["rev-parse", "main"]);

    let mut child = deployer(&repo)
        .stdin(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn deployer");
    let _stdin = child.stdin.take();

    let mut stderr = child.stderr.take().expect("stderr");
    let mut seen = Vec::new();
    let mut buf = [0u8; 256];
    while !String::from_utf8_lossy(&seen).contains("Commit message") {
        let n = stderr.read(&mut buf).expect("read stderr");
        assert!(n > 0, "exited before prompting: {}", String::from_utf8_lossy(&seen));
        seen.extend_from_slice(&buf[..n]);
    }

    let pid = child.id().to_string();
    let killed = Command::new("kill")
        .args(["-s", "INT", &pid])
        .status()
        .expect("kill");
    assert!(killed.success());
    let status = wait_with_limit(&mut child, Duration::from_secs(10));

    assert!(!status.success());
    assert_eq!(repo.remote_git(&["rev-parse", "main"]), main_before);
    assert_eq!(repo.worktree_count(), 1);
    assert!(!repo.remote_has_branch("gh-pages"));
}
