use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_bundle_file_name() -> String {
    "app.bundle".to_string()
}

/// Everything the update engine needs to know about the host it is
/// embedded in. `binary_modified_time` and `app_version` are opaque
/// strings the host obtains from its own installer metadata; the engine
/// only ever compares them for equality.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Installation root that owns the store, marker and ledger.
    pub root: PathBuf,
    pub app_version: String,
    pub binary_modified_time: String,
    /// Entry file shipped inside the host binary, the fallback when no
    /// downloaded package is active.
    pub binary_bundle_path: PathBuf,
    /// Name of the entry file to look for inside update packages.
    #[serde(default = "default_bundle_file_name")]
    pub bundle_file_name: String,
    /// Skips the app-version half of the staleness check. Only ever set by
    /// test harnesses that install packages built for a different version.
    #[serde(default)]
    pub test_configuration: bool,
}

impl HostConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse host configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read host configuration: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed parsing host configuration: {}", path.display()))
    }
}
