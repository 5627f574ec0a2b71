use std::path::{Path, PathBuf};

mod doc;
mod ledger;
mod pending;
mod store;

pub use ledger::FailedUpdateLedger;
pub use pending::{PendingUpdate, PendingUpdateMarker};
pub use store::{InstallStrategy, PackageStore};

const STORE_DIR_NAME: &str = "store";
const STATUS_FILE_NAME: &str = "status.json";
const PACKAGE_METADATA_FILE_NAME: &str = "package.json";
const DOWNLOAD_PART_FILE_NAME: &str = "artifact.part";
const UNPACK_DIR_NAME: &str = "unpacked";
const PENDING_FILE_NAME: &str = "pending.json";
const LEDGER_FILE_NAME: &str = "failed-updates.json";

/// Paths of one installation root. The package store owns everything under
/// `store/`; the pending marker and the failed-update ledger sit beside it
/// so that clearing the store does not erase crash-detection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join(STORE_DIR_NAME)
    }

    pub fn status_path(&self) -> PathBuf {
        self.store_dir().join(STATUS_FILE_NAME)
    }

    pub fn package_dir(&self, hash: &str) -> PathBuf {
        self.store_dir().join(hash)
    }

    pub fn package_metadata_path(&self, hash: &str) -> PathBuf {
        self.package_dir(hash).join(PACKAGE_METADATA_FILE_NAME)
    }

    pub fn download_part_path(&self) -> PathBuf {
        self.store_dir().join(DOWNLOAD_PART_FILE_NAME)
    }

    pub fn unpack_dir(&self) -> PathBuf {
        self.store_dir().join(UNPACK_DIR_NAME)
    }

    pub fn pending_update_path(&self) -> PathBuf {
        self.root.join(PENDING_FILE_NAME)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE_NAME)
    }
}

#[cfg(test)]
mod tests;
