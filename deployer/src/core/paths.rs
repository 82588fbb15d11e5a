//! Workspace naming and the outside-the-repository containment rule.

use std::path::{Component, Path, PathBuf};

use crate::core::types::Purpose;
use crate::error::DeployError;

/// Directory name for a workspace: `<prefix>-<purpose>-<pid>-<timestamp>-<nonce>`.
///
/// Process id, wall-clock time, and a random nonce together keep concurrent runs
/// on one machine (and repeated allocations within one run) apart.
pub fn workspace_dir_name(
    prefix: &str,
    purpose: Purpose,
    pid: u32,
    timestamp: &str,
    nonce: &str,
) -> String {
    format!("{prefix}-{purpose}-{pid}-{timestamp}-{nonce}")
}

/// Fail when `path` is `root` or nested under it.
///
/// Both paths must already be absolute and normalized (canonical, or built by
/// joining plain names onto a canonical directory).
pub fn assert_outside_repository(root: &Path, path: &Path) -> Result<(), DeployError> {
    if is_within(root, path) {
        return Err(DeployError::WorkspaceInsideRepository {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        });
    }
    Ok(())
}

/// True if `path` equals `root` or lies beneath it (component-wise).
pub fn is_within(root: &Path, path: &Path) -> bool {
    let root = lexical_normalize(root);
    let path = lexical_normalize(path);
    path.starts_with(&root)
}

/// Drop `.` components and resolve `..` against preceding normal components.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// True if `relative` is a plain relative path that cannot climb out of its parent.
pub fn is_contained_relative(relative: &Path) -> bool {
    !relative.as_os_str().is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
