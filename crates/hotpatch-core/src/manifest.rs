use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// File name the publisher places at the archive root to mark a diff
/// update. Its presence is the sole diff/full discriminator.
pub const DIFF_MANIFEST_FILE_NAME: &str = "diff-manifest.json";

/// Instructions shipped with a diff update: which files of the base
/// package do not survive into the new one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiffManifest {
    #[serde(default)]
    pub deleted_files: Vec<String>,
}

impl DiffManifest {
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).context("failed to parse diff manifest")
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read diff manifest: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed parsing diff manifest: {}", path.display()))
    }
}
