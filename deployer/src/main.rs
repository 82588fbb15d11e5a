//! `deployer` command-line entry point.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use deployer::core::domain::normalize_domain;
use deployer::core::types::DeploymentRun;
use deployer::deploy::{check_preconditions, run_deploy};
use deployer::error::exit_code_for;
use deployer::exit_codes;
use deployer::io::config::{DEFAULT_CONFIG_FILE, DeployConfig, load_config};
use deployer::io::interrupt::Interrupt;
use deployer::io::process::CommandRunner;
use deployer::io::workspace::generate_run_id;
use deployer::logging;

#[derive(Parser, Debug)]
#[command(
    name = "deployer",
    version,
    about = "Build the site in an isolated working tree and publish it to the pages branch"
)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Source commit message (skips the prompt).
    #[arg(short, long)]
    message: Option<String>,

    /// Custom domain for the published site (overrides the config file).
    #[arg(long)]
    domain: Option<String>,

    /// Stream every command's output and log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let interrupt = Interrupt::new();
    match run(&interrupt) {
        Ok(()) => std::process::exit(exit_codes::OK),
        Err(err) => {
            eprintln!("{:#}", err);
            let code = if interrupt.is_set() {
                exit_codes::INTERRUPTED
            } else {
                exit_code_for(&err)
            };
            std::process::exit(code);
        }
    }
}

fn run(interrupt: &Interrupt) -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    logging::init(config.verbose);

    let runner = CommandRunner::new(config.verbose, interrupt.clone());
    let cwd = std::env::current_dir().context("resolve current directory")?;
    check_preconditions(&cwd, &config, &runner)?;

    // The handler goes in after the prompt: until then no workspace exists and
    // Ctrl-C should end the process immediately.
    let message = match cli.message {
        Some(message) if !message.trim().is_empty() => message,
        _ => prompt_message(&config.default_commit_message)?,
    };
    interrupt.install()?;

    let run = DeploymentRun::new(generate_run_id(), message, normalize_domain(&config.domain)?);
    let report = run_deploy(&cwd, &config, &run, &runner)?;
    println!(
        "deploy: run={} source={} publish={} head={}",
        report.run_id, report.source_commit, report.publish_commit, report.publish_head
    );
    Ok(())
}

/// Load the file, apply command-line overrides, then validate the result.
fn resolve_config(cli: &Cli) -> Result<DeployConfig> {
    let mut config = load_config(&cli.config)?;
    if let Some(domain) = &cli.domain {
        config.domain = domain.clone();
    }
    if cli.verbose {
        config.verbose = true;
    }
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;
    Ok(config)
}

/// Ask for a commit message on stderr; blank input or a closed stdin uses `default`.
fn prompt_message(default: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "Commit message [{default}]: ").context("write prompt")?;
    stderr.flush().context("flush prompt")?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read commit message")?;
    let answer = line.trim();
    if answer.is_empty() {
        return Ok(default.to_string());
    }
    Ok(answer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_deploy_toml() {
        let cli = Cli::try_parse_from(["deployer"]).expect("parse");
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(cli.message.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "deployer",
            "--config",
            "site.toml",
            "-m",
            "Fix typo",
            "--domain",
            "docs.example.com",
            "--verbose",
        ])
        .expect("parse");
        assert_eq!(cli.config, PathBuf::from("site.toml"));
        assert_eq!(cli.message.as_deref(), Some("Fix typo"));
        assert_eq!(cli.domain.as_deref(), Some("docs.example.com"));
        assert!(cli.verbose);
    }

    #[test]
    fn domain_override_is_validated() {
        let cli = Cli::try_parse_from([
            "deployer",
            "--config",
            "/nonexistent/deploy.toml",
            "--domain",
            "   ",
        ])
        .expect("parse");
        let err = resolve_config(&cli).expect_err("blank domain");
        assert_eq!(exit_code_for(&err), exit_codes::PRECONDITION);
    }
}
