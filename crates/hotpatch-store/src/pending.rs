use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::doc::{read_json_document, remove_file_if_exists, write_json_atomic};
use crate::StoreLayout;

/// The crash-detection record. `is_loading = true` means "this package
/// started loading and has not confirmed itself healthy": finding it at
/// boot is the proof of a crash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    pub hash: String,
    pub is_loading: bool,
}

#[derive(Debug, Clone)]
pub struct PendingUpdateMarker {
    path: PathBuf,
}

impl PendingUpdateMarker {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            path: layout.pending_update_path(),
        }
    }

    /// A corrupt marker is logged and treated as absent; the host must
    /// never fail to boot over local metadata.
    pub fn read(&self) -> Option<PendingUpdate> {
        match read_json_document(&self.path) {
            Ok(value) => value,
            Err(err) => {
                warn!("ignoring unreadable pending-update marker: {err:#}");
                None
            }
        }
    }

    /// Unconditionally overwrites the marker. The write is durable before
    /// this returns; the host may only proceed to load the new bundle
    /// afterwards.
    pub fn save(&self, hash: &str, is_loading: bool) -> Result<()> {
        write_json_atomic(
            &self.path,
            &PendingUpdate {
                hash: hash.to_string(),
                is_loading,
            },
        )
    }

    /// Idempotent; removing an absent marker is not an error.
    pub fn remove(&self) -> Result<()> {
        remove_file_if_exists(&self.path)
    }
}
