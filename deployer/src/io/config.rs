//! Deployer configuration stored in `deploy.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::domain::normalize_domain;
use crate::core::paths::is_contained_relative;
use crate::error::DeployError;

pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";

/// Deployer configuration (TOML).
///
/// Built once at startup and passed by reference to every component. Missing
/// fields default to the conventions of a Vite/npm site published to GitHub Pages;
/// `domain` has no default and must come from the file or `--domain`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeployConfig {
    /// Branch deployments must run from; pending changes on it are committed and pushed.
    pub source_branch: String,

    /// Branch that receives the built site.
    pub publish_branch: String,

    pub remote: String,

    /// Custom domain written to the domain-binding file.
    pub domain: String,

    /// Source commit message used when the prompt is left blank.
    pub default_commit_message: String,

    /// Fixed message for commits on the publish branch.
    pub publish_commit_message: String,

    /// Stream the output of every command and log at debug level.
    pub verbose: bool,

    pub build: BuildConfig,
    pub site: SiteConfig,
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Dependency install command run in the build workspace. Empty skips it.
    pub install: Vec<String>,
    /// Build command; its output is always streamed.
    pub command: Vec<String>,
    /// Build output directory, relative to the workspace root.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteConfig {
    pub entry_document: String,
    /// Copy of the entry document served for unmatched paths.
    pub fallback_document: String,
    /// Directory (relative to the output dir) that must hold a script bundle.
    pub assets_dir: PathBuf,
    pub script_extensions: Vec<String>,
    /// Marker disabling the host's static-site preprocessing.
    pub preprocessing_marker: String,
    pub domain_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory for workspaces; the system temp directory when unset.
    pub base_dir: Option<PathBuf>,
    /// Leading part of every workspace directory name.
    pub prefix: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            install: vec!["npm".to_string(), "install".to_string()],
            command: vec!["npm".to_string(), "run".to_string(), "build".to_string()],
            output_dir: PathBuf::from("dist"),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            entry_document: "index.html".to_string(),
            fallback_document: "404.html".to_string(),
            assets_dir: PathBuf::from("assets"),
            script_extensions: vec!["js".to_string(), "mjs".to_string(), "cjs".to_string()],
            preprocessing_marker: ".nojekyll".to_string(),
            domain_file: "CNAME".to_string(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            prefix: "site-deploy".to_string(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            source_branch: "main".to_string(),
            publish_branch: "gh-pages".to_string(),
            remote: "origin".to_string(),
            domain: String::new(),
            default_commit_message: "Update site".to_string(),
            publish_commit_message: "Deploy site".to_string(),
            verbose: false,
            build: BuildConfig::default(),
            site: SiteConfig::default(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

impl DeployConfig {
    pub fn validate(&self) -> Result<(), DeployError> {
        require_name("source_branch", &self.source_branch)?;
        require_name("publish_branch", &self.publish_branch)?;
        require_name("remote", &self.remote)?;
        if self.source_branch == self.publish_branch {
            return Err(invalid("source_branch and publish_branch must differ"));
        }
        normalize_domain(&self.domain)?;
        if self.publish_commit_message.trim().is_empty() {
            return Err(invalid("publish_commit_message must not be empty"));
        }
        if self.build.command.is_empty() || self.build.command[0].trim().is_empty() {
            return Err(invalid("build.command must be a non-empty array"));
        }
        if self.build.install.first().is_some_and(|program| program.trim().is_empty()) {
            return Err(invalid("build.install must start with a program name"));
        }
        if !is_contained_relative(&self.build.output_dir) {
            return Err(invalid("build.output_dir must be a relative path inside the workspace"));
        }
        if !is_contained_relative(&self.site.assets_dir) {
            return Err(invalid("site.assets_dir must be a relative path inside the output dir"));
        }
        for (key, value) in [
            ("site.entry_document", &self.site.entry_document),
            ("site.fallback_document", &self.site.fallback_document),
            ("site.preprocessing_marker", &self.site.preprocessing_marker),
            ("site.domain_file", &self.site.domain_file),
        ] {
            require_file_name(key, value)?;
        }
        if self.site.entry_document == self.site.fallback_document {
            return Err(invalid("site.entry_document and site.fallback_document must differ"));
        }
        if self.site.script_extensions.is_empty() {
            return Err(invalid("site.script_extensions must not be empty"));
        }
        require_name("workspace.prefix", &self.workspace.prefix)?;
        Ok(())
    }

    /// Workspace parent directory, falling back to the system temp directory.
    pub fn workspace_base(&self) -> PathBuf {
        self.workspace
            .base_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn invalid(msg: &str) -> DeployError {
    DeployError::InvalidConfig(msg.to_string())
}

fn require_name(key: &str, value: &str) -> Result<(), DeployError> {
    if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
        return Err(DeployError::InvalidConfig(format!(
            "{key} must be a non-empty name without whitespace"
        )));
    }
    Ok(())
}

fn require_file_name(key: &str, value: &str) -> Result<(), DeployError> {
    if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(DeployError::InvalidConfig(format!(
            "{key} must be a plain file name"
        )));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DeployConfig::default()`. Not validated here:
/// command-line overrides are applied first, then the caller validates.
pub fn load_config(path: &Path) -> Result<DeployConfig> {
    if !path.exists() {
        return Ok(DeployConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DeployConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
