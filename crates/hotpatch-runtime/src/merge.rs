use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use hotpatch_core::{verify_folder_hash, DiffManifest, UpdateError, DIFF_MANIFEST_FILE_NAME};

use crate::fs_utils::{copy_dir_contents, remove_file_if_exists};

/// Assembles the final package folder from an unpacked archive.
///
/// A diff update (discriminated solely by the presence of the diff
/// manifest in the unpacked tree) is layered onto a copy of the current
/// package: base copy, deletions, then the archive's remaining files as
/// the overlay, and finally the integrity check against the published
/// digest. A full update is just the overlay.
///
/// Returns whether the update was a diff. On error the partially built
/// folder is the caller's to discard; it must never be installed.
pub fn merge_update(
    unpacked_dir: &Path,
    new_package_dir: &Path,
    current_package_dir: Option<&Path>,
    expected_hash: &str,
) -> Result<bool> {
    let manifest_path = unpacked_dir.join(DIFF_MANIFEST_FILE_NAME);
    let is_diff = manifest_path.exists();

    if is_diff {
        let Some(base) = current_package_dir else {
            return Err(UpdateError::InvalidUpdate(
                "diff update arrived with no installed base package".to_string(),
            )
            .into());
        };

        let manifest = DiffManifest::read_from(&manifest_path).map_err(|err| {
            UpdateError::InvalidUpdate(format!("unreadable diff manifest: {err:#}"))
        })?;

        copy_dir_contents(base, new_package_dir)?;

        for deleted in &manifest.deleted_files {
            let target = resolve_package_relative(new_package_dir, deleted)?;
            // Deleting a file the base never had is fine; the manifest may
            // trail the state of older clients.
            remove_file_if_exists(&target)?;
        }

        // The manifest is instructions, not content; it must not survive
        // into the final package nor participate in the integrity check.
        fs::remove_file(&manifest_path)
            .with_context(|| format!("failed to remove {}", manifest_path.display()))?;
    }

    copy_dir_contents(unpacked_dir, new_package_dir)?;

    if is_diff {
        verify_folder_hash(new_package_dir, expected_hash)?;
    }

    Ok(is_diff)
}

/// Joins a manifest-supplied relative path onto the package folder,
/// rejecting anything that would escape it.
fn resolve_package_relative(root: &Path, relative: &str) -> Result<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => {
                return Err(UpdateError::InvalidUpdate(format!(
                    "diff manifest entry escapes the package folder: {relative}"
                ))
                .into());
            }
        }
    }
    Ok(resolved)
}
