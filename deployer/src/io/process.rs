//! Child process execution for every external command the deployer runs.
//!
//! Commands are argument lists with an explicit working directory; nothing goes
//! through a shell. Each call picks an [`Output`] visibility and a [`Failure`]
//! policy. A critical command that fails while hidden is re-run once with its
//! output visible before the failure is returned, so the operator always sees the
//! real diagnostic.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, error, instrument, warn};

use crate::error::DeployError;
use crate::io::interrupt::Interrupt;

/// What happens to the child's stdout/stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Discard everything.
    Quiet,
    /// Inherit the terminal; the operator sees output live.
    Stream,
    /// Collect stdout for the caller; stderr is collected and logged at debug.
    Capture,
}

/// What a non-zero exit means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Abort the run with [`DeployError::CommandFailed`].
    Critical,
    /// Report and hand the status back; the caller decides what it means.
    Tolerated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub output: Output,
    pub failure: Failure,
}

impl Mode {
    pub const fn critical(output: Output) -> Self {
        Self {
            output,
            failure: Failure::Critical,
        }
    }

    pub const fn tolerated(output: Output) -> Self {
        Self {
            output,
            failure: Failure::Tolerated,
        }
    }
}

/// A program, its arguments, and the directory it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
    cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<OsStr>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    /// Build from an argv-style list (`["npm", "run", "build"]`).
    pub fn from_argv(argv: &[String], cwd: impl Into<PathBuf>) -> Result<Self> {
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("empty command"))?;
        Ok(Self::new(program, cwd).args(rest))
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.cwd);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Exit status plus stdout when the command ran in [`Output::Capture`].
#[derive(Debug)]
pub struct CommandOutcome {
    pub status: ExitStatus,
    pub stdout: Option<String>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Captured stdout with surrounding whitespace removed (empty if not captured).
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.as_deref().map_or("", str::trim)
    }
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    verbose: bool,
    interrupt: Interrupt,
}

impl CommandRunner {
    /// `verbose` upgrades every [`Output::Quiet`] command to [`Output::Stream`].
    pub fn new(verbose: bool, interrupt: Interrupt) -> Self {
        Self { verbose, interrupt }
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    #[instrument(skip_all, fields(command = %spec, cwd = %spec.cwd.display()))]
    pub fn run(&self, spec: &CommandSpec, mode: Mode) -> Result<CommandOutcome> {
        let output = match mode.output {
            Output::Quiet if self.verbose => Output::Stream,
            other => other,
        };
        debug!("> {spec}");
        let outcome = spawn_and_wait(spec, output)?;
        if outcome.success() {
            return Ok(outcome);
        }

        match mode.failure {
            Failure::Tolerated => {
                debug!(exit_code = ?outcome.code(), "command failed (tolerated)");
                Ok(outcome)
            }
            Failure::Critical => {
                error!(exit_code = ?outcome.code(), "critical command failed");
                if output != Output::Stream {
                    self.show_failure(spec);
                }
                Err(DeployError::CommandFailed {
                    command: spec.to_string(),
                    code: outcome.code(),
                }
                .into())
            }
        }
    }

    /// Re-run a failed command with its output visible so the operator sees the
    /// real diagnostic. Skipped once an interrupt is pending. Returns whether it ran.
    pub fn show_failure(&self, spec: &CommandSpec) -> bool {
        if self.interrupt.is_set() {
            debug!("interrupt pending, skipping diagnostic re-run");
            return false;
        }
        warn!("re-running with output visible to show the failure");
        if let Err(err) = spawn_and_wait(spec, Output::Stream) {
            warn!(err = %err, "diagnostic re-run could not start");
        }
        true
    }
}

fn spawn_and_wait(spec: &CommandSpec, output: Output) -> Result<CommandOutcome> {
    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::null());
    match output {
        Output::Quiet => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        Output::Stream => {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
        Output::Capture => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
    }

    if output == Output::Capture {
        let out = cmd.output().with_context(|| format!("spawn {spec}"))?;
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "captured stderr");
        }
        return Ok(CommandOutcome {
            status: out.status,
            stdout: Some(String::from_utf8_lossy(&out.stdout).to_string()),
        });
    }

    let status = match cmd.status() {
        Ok(status) => status,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {spec}"));
        }
    };
    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutcome {
        status,
        stdout: None,
    })
}
