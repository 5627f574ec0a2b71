use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::UpdateError;

const HASH_BUFFER_SIZE: usize = 8 * 1024;

pub fn sha256_stream(reader: &mut impl Read) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; HASH_BUFFER_SIZE];
    loop {
        let read = reader
            .read(&mut buffer)
            .context("failed reading stream while hashing")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    sha256_stream(&mut file)
}

/// Builds the canonical content manifest of a package tree: one entry per
/// file, formatted `relative/path:sha256`, with `/` separators on every
/// platform. Traversal is an explicit worklist so publisher-controlled
/// directory depth cannot exhaust the call stack.
pub fn folder_manifest(root: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        for entry in
            fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?
        {
            let entry =
                entry.with_context(|| format!("failed reading entry in {}", dir.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };

            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to inspect {}", entry.path().display()))?;
            if file_type.is_dir() {
                pending.push((entry.path(), relative));
            } else {
                entries.push(format!("{relative}:{}", sha256_file(&entry.path())?));
            }
        }
    }

    Ok(entries)
}

/// Verifies that a package tree matches the digest published with the
/// update. Entries are sorted on the full `path:hash` string, not the path
/// alone; update producers serialize the manifest the same way, so the
/// comparison must stay bit-for-bit identical.
pub fn verify_folder_hash(root: &Path, expected: &str) -> Result<()> {
    let mut manifest = folder_manifest(root)?;
    manifest.sort();

    let serialized =
        serde_json::to_string(&manifest).context("failed serializing content manifest")?;
    let actual = sha256_bytes(serialized.as_bytes());
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(UpdateError::InvalidUpdate(format!(
            "package contents failed the integrity check (expected {expected}, computed {actual})"
        ))
        .into());
    }

    Ok(())
}
