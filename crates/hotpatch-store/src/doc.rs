use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Replaces a persisted document atomically: the payload goes to a sibling
/// temporary file, is flushed to disk, and renamed over the target. A torn
/// or lost write would break the crash-detection contract, so an in-place
/// overwrite is never used.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("document path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let payload =
        serde_json::to_string_pretty(value).context("failed serializing persisted document")?;

    let tmp_path = path.with_extension("tmp");
    let mut tmp = File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    tmp.write_all(payload.as_bytes())
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    tmp.sync_all()
        .with_context(|| format!("failed to flush {}", tmp_path.display()))?;
    drop(tmp);

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "failed to replace {} with {}",
            path.display(),
            tmp_path.display()
        )
    })
}

/// Reads a persisted JSON document. A missing file is `None`; what to do
/// about an unreadable one is the caller's policy (the stores self-heal).
pub(crate) fn read_json_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read document: {}", path.display()));
        }
    };

    let value = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing document: {}", path.display()))?;
    Ok(Some(value))
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}
