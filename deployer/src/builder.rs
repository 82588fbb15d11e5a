//! Build the site inside an isolated build workspace and verify its artifacts.
//!
//! Dependencies are installed in the workspace, never in the caller's checkout.
//! Build output is always streamed. Artifact verification happens before the
//! publish side is touched at all.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::artifacts::{ArtifactSet, is_script_bundle};
use crate::core::types::Workspace;
use crate::error::DeployError;
use crate::io::config::{BuildConfig, SiteConfig};
use crate::io::fsops::files_identical;
use crate::io::process::{CommandRunner, CommandSpec, Mode, Output};

/// Install, build, verify, and produce the fallback-routing document.
#[instrument(skip_all, fields(workspace = %workspace.path.display()))]
pub fn build(
    runner: &CommandRunner,
    workspace: &Workspace,
    build: &BuildConfig,
    site: &SiteConfig,
) -> Result<ArtifactSet> {
    if !build.install.is_empty() {
        info!(command = %build.install.join(" "), "installing dependencies");
        let spec = CommandSpec::from_argv(&build.install, &workspace.path)?;
        runner
            .run(&spec, Mode::critical(Output::Quiet))
            .context(DeployError::BuildFailed { step: "install" })?;
    }

    info!(command = %build.command.join(" "), "building site");
    let spec = CommandSpec::from_argv(&build.command, &workspace.path)?;
    runner
        .run(&spec, Mode::critical(Output::Stream))
        .context(DeployError::BuildFailed { step: "build" })?;

    let artifacts = verify_artifacts(&workspace.path.join(&build.output_dir), site)?;
    write_fallback(&artifacts)?;
    info!(
        output = %artifacts.output_dir.display(),
        scripts = artifacts.script_bundles.len(),
        "build artifacts verified"
    );
    Ok(artifacts)
}

/// Check the entry document, the assets directory, and at least one script bundle.
pub fn verify_artifacts(output_dir: &Path, site: &SiteConfig) -> Result<ArtifactSet> {
    if !output_dir.is_dir() {
        return Err(missing("output directory", output_dir));
    }
    let entry_document = output_dir.join(&site.entry_document);
    if !entry_document.is_file() {
        return Err(missing("entry document", &entry_document));
    }
    let assets_dir = output_dir.join(&site.assets_dir);
    if !assets_dir.is_dir() {
        return Err(missing("assets directory", &assets_dir));
    }
    let mut script_bundles = Vec::new();
    collect_scripts(&assets_dir, &site.script_extensions, &mut script_bundles)?;
    if script_bundles.is_empty() {
        return Err(missing("script bundle in assets directory", &assets_dir));
    }
    script_bundles.sort();

    Ok(ArtifactSet {
        output_dir: output_dir.to_path_buf(),
        fallback_document: output_dir.join(&site.fallback_document),
        entry_document,
        assets_dir,
        script_bundles,
    })
}

/// Copy the entry document to the fallback path and confirm identical bytes.
fn write_fallback(artifacts: &ArtifactSet) -> Result<()> {
    fs::copy(&artifacts.entry_document, &artifacts.fallback_document).with_context(|| {
        format!(
            "copy {} to {}",
            artifacts.entry_document.display(),
            artifacts.fallback_document.display()
        )
    })?;
    if !files_identical(&artifacts.entry_document, &artifacts.fallback_document)? {
        return Err(DeployError::FallbackMismatch {
            entry: artifacts.entry_document.clone(),
            fallback: artifacts.fallback_document.clone(),
        }
        .into());
    }
    Ok(())
}

fn collect_scripts(dir: &Path, extensions: &[String], found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry.context("read entry")?.path();
        if path.is_dir() {
            collect_scripts(&path, extensions, found)?;
        } else if is_script_bundle(&path, extensions) {
            found.push(path);
        }
    }
    Ok(())
}

fn missing(artifact: &str, path: &Path) -> anyhow::Error {
    DeployError::ArtifactMissing {
        artifact: artifact.to_string(),
        path: path.to_path_buf(),
    }
    .into()
}
