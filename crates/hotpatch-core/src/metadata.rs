use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const PACKAGE_HASH_KEY: &str = "packageHash";
const DOWNLOAD_URL_KEY: &str = "downloadUrl";
const APP_VERSION_KEY: &str = "appVersion";
const BINARY_MODIFIED_TIME_KEY: &str = "binaryModifiedTime";
const BUNDLE_PATH_KEY: &str = "bundlePath";

/// A publisher-supplied update descriptor: an open JSON object with typed
/// accessors for the fields this system acts on. Publisher-defined fields
/// (description, mandatory flag, ...) pass through byte-for-byte and are
/// never interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageMetadata {
    fields: Map<String, Value>,
}

impl PackageMetadata {
    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).context("failed to parse package metadata")
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read package metadata: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed parsing package metadata: {}", path.display()))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload = serde_json::to_string_pretty(&self.fields)
            .context("failed serializing package metadata")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write package metadata: {}", path.display()))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.fields
            .insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn package_hash(&self) -> Option<&str> {
        self.get_str(PACKAGE_HASH_KEY)
    }

    pub fn download_url(&self) -> Option<&str> {
        self.get_str(DOWNLOAD_URL_KEY)
    }

    pub fn app_version(&self) -> Option<&str> {
        self.get_str(APP_VERSION_KEY)
    }

    pub fn binary_modified_time(&self) -> Option<&str> {
        self.get_str(BINARY_MODIFIED_TIME_KEY)
    }

    pub fn set_binary_modified_time(&mut self, value: &str) {
        self.set_str(BINARY_MODIFIED_TIME_KEY, value);
    }

    pub fn bundle_path(&self) -> Option<&str> {
        self.get_str(BUNDLE_PATH_KEY)
    }

    pub fn set_bundle_path(&mut self, value: &str) {
        self.set_str(BUNDLE_PATH_KEY, value);
    }
}
