//! Names and rules for build artifacts and publish markers.

use std::path::{Path, PathBuf};

/// Required build output, verified before any publish-side action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    /// Root of the build output tree (copied wholesale into the publish workspace).
    pub output_dir: PathBuf,
    pub entry_document: PathBuf,
    /// Byte-identical copy of the entry document, produced by the builder.
    pub fallback_document: PathBuf,
    pub assets_dir: PathBuf,
    /// Script bundles found under `assets_dir`, sorted. Never empty.
    pub script_bundles: Vec<PathBuf>,
}

/// Files the publish workspace must hold before commit/push is allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMarkerSet {
    pub entry_document: PathBuf,
    pub fallback_document: PathBuf,
    pub preprocessing_marker: PathBuf,
    pub domain_binding: PathBuf,
}

impl PublishMarkerSet {
    pub fn all(&self) -> [&Path; 4] {
        [
            self.entry_document.as_path(),
            self.fallback_document.as_path(),
            self.preprocessing_marker.as_path(),
            self.domain_binding.as_path(),
        ]
    }
}

/// True if `path` has one of `extensions` (case-insensitive, without the dot).
pub fn is_script_bundle(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(ext))
}
