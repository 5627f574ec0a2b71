use std::path::PathBuf;

use anyhow::Result;
use hotpatch_core::{PackageMetadata, UpdateError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::doc::{read_json_document, remove_dir_if_exists, write_json_atomic};
use crate::StoreLayout;

/// What happens to the packages already on disk when a new one is
/// installed. The distinction matters because exactly one of them is about
/// to become garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy {
    /// The current package was installed but never confirmed; it is being
    /// superseded in place. Its folder is deleted and the previous package
    /// stays the fallback target.
    ReplaceCurrent,
    /// Normal forward install: the running package becomes the previous
    /// package and the old previous folder is deleted.
    DemoteCurrent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
struct StatusRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    current_package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_package: Option<String>,
}

/// Content-addressed storage of downloaded packages plus the persisted
/// `current`/`previous` pointers. Invariant maintained by every operation:
/// a folder is never deleted while a pointer references it, and a pointer
/// is never left referencing a deleted folder.
#[derive(Debug, Clone)]
pub struct PackageStore {
    layout: StoreLayout,
}

impl PackageStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn read_status(&self) -> StatusRecord {
        match read_json_document::<StatusRecord>(&self.layout.status_path()) {
            Ok(Some(record)) => record,
            Ok(None) => StatusRecord::default(),
            Err(err) => {
                warn!("treating unreadable status record as empty: {err:#}");
                StatusRecord::default()
            }
        }
    }

    fn write_status(&self, record: &StatusRecord) -> Result<()> {
        write_json_atomic(&self.layout.status_path(), record)
    }

    pub fn current_package_hash(&self) -> Option<String> {
        self.read_status().current_package
    }

    pub fn previous_package_hash(&self) -> Option<String> {
        self.read_status().previous_package
    }

    pub fn package_folder(&self, hash: &str) -> PathBuf {
        self.layout.package_dir(hash)
    }

    pub fn current_package_folder(&self) -> Option<PathBuf> {
        Some(self.package_folder(&self.current_package_hash()?))
    }

    /// Missing or unreadable metadata is `None`, not an error: a corrupted
    /// install or a concurrent deletion must not take the host down.
    pub fn package_metadata(&self, hash: &str) -> Option<PackageMetadata> {
        PackageMetadata::read_from(&self.layout.package_metadata_path(hash)).ok()
    }

    pub fn current_package_metadata(&self) -> Option<PackageMetadata> {
        self.package_metadata(&self.current_package_hash()?)
    }

    /// Absolute path of the current package's entry file. Packages that
    /// arrived as a raw bundle have no recorded relative path and fall
    /// back to `default_bundle_file` inside the folder.
    pub fn current_package_bundle_path(&self, default_bundle_file: &str) -> Option<PathBuf> {
        let folder = self.current_package_folder()?;
        let recorded = self
            .current_package_metadata()
            .and_then(|metadata| metadata.bundle_path().map(str::to_string));
        Some(match recorded {
            Some(relative) => folder.join(relative),
            None => folder.join(default_bundle_file),
        })
    }

    pub fn install(&self, metadata: &PackageMetadata, strategy: InstallStrategy) -> Result<()> {
        let hash = metadata.package_hash().ok_or_else(|| {
            UpdateError::Internal("update package to install has no content hash".to_string())
        })?;

        let mut status = self.read_status();
        match strategy {
            InstallStrategy::ReplaceCurrent => {
                if let Some(current) = status.current_package.as_deref() {
                    remove_dir_if_exists(&self.package_folder(current))?;
                }
            }
            InstallStrategy::DemoteCurrent => {
                if let Some(previous) = status.previous_package.as_deref() {
                    if previous != hash {
                        remove_dir_if_exists(&self.package_folder(previous))?;
                    }
                }
                status.previous_package = status.current_package.take();
            }
        }

        status.current_package = Some(hash.to_string());
        // Pointer update is the last step; a crash before this line leaves
        // the old record intact and the new folder unreferenced.
        self.write_status(&status)
    }

    /// Reverts to the previous package, or to the binary version when
    /// there is none.
    pub fn rollback(&self) -> Result<()> {
        let mut status = self.read_status();
        if let Some(current) = status.current_package.as_deref() {
            remove_dir_if_exists(&self.package_folder(current))?;
        }
        status.current_package = status.previous_package.take();
        self.write_status(&status)
    }

    /// Removes every stored package along with the status record.
    pub fn clear_all(&self) -> Result<()> {
        remove_dir_if_exists(&self.layout.store_dir())
    }
}
