//! Filesystem helpers for replacing the publish workspace contents.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Version-control metadata entry that must survive a wipe (a file in linked
/// working trees, a directory in the main one).
pub const GIT_METADATA: &str = ".git";

/// Delete every top-level entry of `dir` except those named in `keep`.
///
/// Returns the number of entries removed.
pub fn wipe_except(dir: &Path, keep: &[&str]) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        let name = entry.file_name();
        if keep.iter().any(|kept| name == *kept) {
            continue;
        }
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path).with_context(|| format!("remove {}", path.display()))?;
        } else {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
        removed += 1;
    }
    debug!(dir = %dir.display(), removed, "wiped directory");
    Ok(removed)
}

/// Recursively copy the contents of `src` into `dst`, skipping top-level
/// entries named in `skip`. Symlinks are copied as the files they point to.
///
/// Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path, skip: &[&str]) -> Result<usize> {
    fs::create_dir_all(dst).with_context(|| format!("create {}", dst.display()))?;
    let mut copied = 0;
    for entry in fs::read_dir(src).with_context(|| format!("read {}", src.display()))? {
        let entry = entry.context("read entry")?;
        let name = entry.file_name();
        if skip.iter().any(|skipped| name == *skipped) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        if from.is_dir() {
            copied += copy_tree(&from, &to, &[])?;
        } else {
            fs::copy(&from, &to)
                .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// True if both files exist and have identical bytes.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    if !a.is_file() || !b.is_file() {
        return Ok(false);
    }
    let left = fs::read(a).with_context(|| format!("read {}", a.display()))?;
    let right = fs::read(b).with_context(|| format!("read {}", b.display()))?;
    Ok(left == right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wipe_keeps_git_metadata_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join(GIT_METADATA), "gitdir: /elsewhere\n").expect("write .git");
        fs::write(root.join("old.html"), "old").expect("write");
        fs::create_dir_all(root.join("assets/nested")).expect("mkdir");
        fs::write(root.join("assets/nested/app.js"), "js").expect("write");

        let removed = wipe_except(root, &[GIT_METADATA]).expect("wipe");
        assert_eq!(removed, 2);
        let names: Vec<_> = fs::read_dir(root)
            .expect("read")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(GIT_METADATA)]);
    }

    #[test]
    fn copy_tree_copies_nested_files_and_skips_named_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        fs::create_dir_all(src.join("assets")).expect("mkdir");
        fs::create_dir_all(src.join(".git")).expect("mkdir");
        fs::write(src.join("index.html"), "<html>").expect("write");
        fs::write(src.join("assets/app.js"), "js").expect("write");
        fs::write(src.join(".git/HEAD"), "ref").expect("write");

        let copied = copy_tree(&src, &dst, &[GIT_METADATA]).expect("copy");
        assert_eq!(copied, 2);
        assert_eq!(
            fs::read_to_string(dst.join("assets/app.js")).expect("read"),
            "js"
        );
        assert!(!dst.join(".git").exists());
    }

    #[test]
    fn identical_requires_equal_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, "same").expect("write");
        fs::write(&b, "same").expect("write");
        assert!(files_identical(&a, &b).expect("compare"));
        fs::write(&b, "diff").expect("write");
        assert!(!files_identical(&a, &b).expect("compare"));
        assert!(!files_identical(&a, &temp.path().join("missing")).expect("compare"));
    }
}
