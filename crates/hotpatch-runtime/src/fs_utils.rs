use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};

/// Copies the contents of `src` into `dst`, creating directories as
/// needed and overwriting files that already exist. The traversal is an
/// explicit worklist so archive-controlled directory depth cannot exhaust
/// the call stack.
pub(crate) fn copy_dir_contents(src: &Path, dst: &Path) -> Result<()> {
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).with_context(|| format!("failed to create {}", to.display()))?;
        for entry in
            fs::read_dir(&from).with_context(|| format!("failed to read {}", from.display()))?
        {
            let entry =
                entry.with_context(|| format!("failed reading entry in {}", from.display()))?;
            let src_path = entry.path();
            let dst_path = to.join(entry.file_name());
            let metadata = fs::symlink_metadata(&src_path)
                .with_context(|| format!("failed to stat {}", src_path.display()))?;

            if metadata.is_dir() {
                pending.push((src_path, dst_path));
                continue;
            }

            #[cfg(unix)]
            if metadata.file_type().is_symlink() {
                let target = fs::read_link(&src_path)
                    .with_context(|| format!("failed to read symlink {}", src_path.display()))?;
                let _ = fs::remove_file(&dst_path);
                std::os::unix::fs::symlink(&target, &dst_path).with_context(|| {
                    format!(
                        "failed to create symlink {} -> {}",
                        dst_path.display(),
                        target.display()
                    )
                })?;
                continue;
            }

            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        }
    }

    Ok(())
}

pub(crate) fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst).with_context(|| {
                format!("failed to copy {} to {}", src.display(), dst.display())
            })?;
            fs::remove_file(src)
                .with_context(|| format!("failed to remove {}", src.display()))?;
            Ok(())
        }
    }
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
