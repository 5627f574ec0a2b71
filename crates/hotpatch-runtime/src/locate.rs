use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Finds the entry file inside a freshly assembled package tree.
///
/// Walks the tree with an explicit worklist, descending into
/// subdirectories as the listing produces them; the filesystem guarantees
/// no particular sibling order, so the first file whose name matches
/// `expected_file_name` is authoritative. The returned path is relative to
/// `folder` with `/` separators.
///
/// `None` means the package contains no entry file at all — callers must
/// treat that as an invalid update, never silently proceed.
pub fn locate_bundle(folder: &Path, expected_file_name: &str) -> Result<Option<String>> {
    let mut pending = vec![(folder.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        for entry in
            fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?
        {
            let entry =
                entry.with_context(|| format!("failed reading entry in {}", dir.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };

            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to inspect {}", entry.path().display()))?;
            if file_type.is_dir() {
                pending.push((entry.path(), relative));
            } else if name == expected_file_name {
                return Ok(Some(relative));
            }
        }
    }

    Ok(None)
}
