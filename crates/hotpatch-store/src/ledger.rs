use std::path::PathBuf;

use anyhow::Result;
use hotpatch_core::PackageMetadata;
use tracing::warn;

use crate::doc::{read_json_document, remove_file_if_exists, write_json_atomic};
use crate::StoreLayout;

/// Durable record of every package hash that was rolled back, kept to
/// block reinstall loops. Append-only and never deduplicated; repeated
/// failures of the same hash simply add entries.
#[derive(Debug, Clone)]
pub struct FailedUpdateLedger {
    path: PathBuf,
}

impl FailedUpdateLedger {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            path: layout.ledger_path(),
        }
    }

    /// A missing ledger is empty. An unreadable one is rewritten as an
    /// empty, well-formed document so the corruption does not resurface on
    /// every read.
    pub fn entries(&self) -> Vec<PackageMetadata> {
        match read_json_document::<Vec<PackageMetadata>>(&self.path) {
            Ok(Some(entries)) => entries,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("rewriting unreadable failed-update ledger as empty: {err:#}");
                let empty: Vec<PackageMetadata> = Vec::new();
                if let Err(write_err) = write_json_atomic(&self.path, &empty) {
                    warn!("failed rewriting the failed-update ledger: {write_err:#}");
                }
                empty
            }
        }
    }

    pub fn is_failed(&self, hash: &str) -> bool {
        self.entries()
            .iter()
            .any(|entry| entry.package_hash() == Some(hash))
    }

    pub fn last_entry(&self) -> Option<PackageMetadata> {
        self.entries().into_iter().last()
    }

    pub fn append(&self, snapshot: &PackageMetadata) -> Result<()> {
        let mut entries = self.entries();
        entries.push(snapshot.clone());
        write_json_atomic(&self.path, &entries)
    }

    pub fn clear(&self) -> Result<()> {
        remove_file_if_exists(&self.path)
    }
}
