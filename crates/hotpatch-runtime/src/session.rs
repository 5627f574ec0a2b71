use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use hotpatch_core::{InstallMode, PackageMetadata, UpdateError};
use hotpatch_store::{
    FailedUpdateLedger, InstallStrategy, PackageStore, PendingUpdateMarker, StoreLayout,
};
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::download::download;
use crate::fs_utils::{move_file, remove_dir_if_exists, remove_file_if_exists};
use crate::locate::locate_bundle;
use crate::merge::merge_update;
use crate::unpack::extract_archive;

/// Where the pending-update state machine currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingState {
    /// No update awaiting confirmation.
    Clean,
    /// An update's first run is in flight; a restart in this state means
    /// the run crashed.
    Loading(String),
    /// An update is installed but has not started its first run yet.
    Ready(String),
}

/// What the host should do after an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    RestartNow,
    Deferred,
}

#[derive(Debug)]
struct ResumeGate {
    minimum_background: Duration,
    paused_at: Option<Instant>,
}

/// One process run's view of an installation root.
///
/// All per-run flags the update flow needs (did an update boot this run,
/// does a rollback still need reporting, is the binary version active)
/// live here, initialized at boot and consumed explicitly; there is no
/// ambient static state. Operations take `&mut self`: one session per
/// installation root is the serialization contract — concurrent installs
/// would race on the status record — so hosts that share a session across
/// threads must wrap it in their own lock.
pub struct UpdateSession {
    store: PackageStore,
    marker: PendingUpdateMarker,
    ledger: FailedUpdateLedger,
    config: HostConfig,
    needs_rollback_report: bool,
    running_binary_version: bool,
    did_update: bool,
    resume_gate: Option<ResumeGate>,
}

impl UpdateSession {
    /// Opens the installation root and runs crash recovery. This must
    /// happen once per process start, before the host loads any entry
    /// point.
    pub fn boot(config: HostConfig) -> Result<Self> {
        let layout = StoreLayout::new(&config.root);
        let mut session = Self {
            store: PackageStore::new(layout.clone()),
            marker: PendingUpdateMarker::new(&layout),
            ledger: FailedUpdateLedger::new(&layout),
            config,
            needs_rollback_report: false,
            running_binary_version: false,
            did_update: false,
            resume_gate: None,
        };
        session.recover_after_restart()?;
        Ok(session)
    }

    fn recover_after_restart(&mut self) -> Result<()> {
        let Some(pending) = self.marker.read() else {
            return Ok(());
        };

        self.did_update = true;
        if pending.is_loading {
            // The previous run started this update and never confirmed it:
            // a broken update. Revert before the host touches anything.
            warn!(
                hash = %pending.hash,
                "update did not finish loading on the previous run, rolling back"
            );
            self.needs_rollback_report = true;
            self.rollback_active_update()?;
        } else {
            // First measured run of this install. Re-arm the marker so a
            // crash from here on is still caught at the next boot.
            self.marker.save(&pending.hash, true)?;
        }
        Ok(())
    }

    fn rollback_active_update(&mut self) -> Result<()> {
        if let Some(failed) = self.store.current_package_metadata() {
            self.ledger.append(&failed)?;
        }
        self.store.rollback()?;
        self.marker.remove()
    }

    /// Decides which entry file the host should load this run: the
    /// current package's, or the binary-bundled one when no package is
    /// active or the stored packages predate the running binary.
    pub fn resolve_entry_point(&mut self) -> Result<PathBuf> {
        let Some(bundle_path) = self
            .store
            .current_package_bundle_path(&self.config.bundle_file_name)
        else {
            self.running_binary_version = true;
            return Ok(self.config.binary_bundle_path.clone());
        };

        let metadata = self.store.current_package_metadata();
        let binary_matches = metadata
            .as_ref()
            .and_then(|m| m.binary_modified_time())
            .is_some_and(|recorded| recorded == self.config.binary_modified_time);
        let version_matches = self.config.test_configuration
            || metadata
                .as_ref()
                .and_then(|m| m.app_version())
                .is_some_and(|recorded| recorded == self.config.app_version);

        if binary_matches && version_matches {
            self.running_binary_version = false;
            return Ok(bundle_path);
        }

        // The host binary moved on since this package was installed;
        // everything stored is built against the old binary and is stale.
        info!("host binary changed since the current package was installed, clearing stored updates");
        self.did_update = false;
        self.clear_all_updates()?;
        self.running_binary_version = true;
        Ok(self.config.binary_bundle_path.clone())
    }

    /// Fetches, assembles, and stores the package `metadata` describes,
    /// returning the metadata as written into the package folder (with
    /// the resolved bundle path and the host's binary timestamp stamped
    /// in). The package is on disk but not active until `install_update`.
    pub fn download_update<Progress>(
        &mut self,
        mut metadata: PackageMetadata,
        progress: Progress,
    ) -> Result<PackageMetadata>
    where
        Progress: FnMut(Option<u64>, u64),
    {
        let hash = metadata
            .package_hash()
            .map(str::to_string)
            .ok_or_else(|| {
                UpdateError::Internal("update package to download has no content hash".to_string())
            })?;
        let url = metadata.download_url().map(str::to_string).ok_or_else(|| {
            UpdateError::MalformedData("update package has no download url".to_string())
        })?;

        if let Err(err) = self.fetch_and_assemble(&mut metadata, &hash, &url, progress) {
            self.discard_partial_package(&hash);
            if UpdateError::is_invalid_update(&err) {
                // A structurally broken package must never be offered
                // again; record it before surfacing the failure.
                if let Err(ledger_err) = self.ledger.append(&metadata) {
                    warn!("failed recording invalid update in the ledger: {ledger_err:#}");
                }
            }
            return Err(err);
        }

        Ok(metadata)
    }

    fn fetch_and_assemble<Progress>(
        &mut self,
        metadata: &mut PackageMetadata,
        hash: &str,
        url: &str,
        progress: Progress,
    ) -> Result<()>
    where
        Progress: FnMut(Option<u64>, u64),
    {
        let layout = self.store.layout().clone();
        let package_dir = self.store.package_folder(hash);

        // Stale leftovers of an earlier crashed attempt at this same hash
        // must not leak into the fresh assembly.
        remove_dir_if_exists(&package_dir)?;
        fs::create_dir_all(layout.store_dir())
            .with_context(|| format!("failed to create {}", layout.store_dir().display()))?;

        let part_path = layout.download_part_path();
        let outcome = download(url, &part_path, progress)?;
        info!(
            hash,
            bytes = outcome.bytes_received,
            archive = outcome.is_archive,
            "downloaded update artifact"
        );

        if outcome.is_archive {
            let unpack_dir = layout.unpack_dir();
            remove_dir_if_exists(&unpack_dir)?;
            extract_archive(&part_path, &unpack_dir)?;
            remove_file_if_exists(&part_path)?;

            let current_dir = self.store.current_package_folder();
            let merged = merge_update(&unpack_dir, &package_dir, current_dir.as_deref(), hash);
            let cleanup = remove_dir_if_exists(&unpack_dir);
            merged?;
            cleanup?;

            let Some(bundle_path) = locate_bundle(&package_dir, &self.config.bundle_file_name)?
            else {
                return Err(UpdateError::InvalidUpdate(format!(
                    "no file named '{}' found in the update package",
                    self.config.bundle_file_name
                ))
                .into());
            };
            metadata.set_bundle_path(&bundle_path);
        } else {
            // A raw bundle: the artifact itself is the entry file.
            move_file(&part_path, &package_dir.join(&self.config.bundle_file_name))?;
        }

        metadata.set_binary_modified_time(&self.config.binary_modified_time);
        metadata.write_to(&layout.package_metadata_path(hash))?;
        Ok(())
    }

    fn discard_partial_package(&self, hash: &str) {
        let layout = self.store.layout();
        let _ = remove_file_if_exists(&layout.download_part_path());
        let _ = remove_dir_if_exists(&layout.unpack_dir());
        let _ = remove_dir_if_exists(&self.store.package_folder(hash));
    }

    /// Activates a downloaded package and arms the crash detector. The
    /// marker is durable before this returns; only then may the host
    /// schedule the restart.
    pub fn install_update(
        &mut self,
        metadata: &PackageMetadata,
        mode: InstallMode,
        minimum_background: Duration,
    ) -> Result<InstallOutcome> {
        let hash = metadata
            .package_hash()
            .map(str::to_string)
            .ok_or_else(|| {
                UpdateError::Internal("update package to install has no content hash".to_string())
            })?;

        let strategy = if self.has_pending_update(None) {
            // The package being replaced never got confirmed; its folder
            // is dead weight, and the confirmed previous package must
            // stay the fallback.
            InstallStrategy::ReplaceCurrent
        } else {
            InstallStrategy::DemoteCurrent
        };
        self.store.install(metadata, strategy)?;
        self.marker.save(&hash, false)?;

        match mode {
            InstallMode::Immediate => Ok(InstallOutcome::RestartNow),
            InstallMode::OnNextRestart => Ok(InstallOutcome::Deferred),
            InstallMode::OnNextResume => {
                // A later resume-based install overrides the armed
                // duration but keeps an in-flight pause measurement.
                let paused_at = self.resume_gate.as_ref().and_then(|gate| gate.paused_at);
                self.resume_gate = Some(ResumeGate {
                    minimum_background,
                    paused_at,
                });
                Ok(InstallOutcome::Deferred)
            }
        }
    }

    /// The host went to the background; start measuring.
    pub fn notify_host_paused(&mut self) {
        if let Some(gate) = self.resume_gate.as_mut() {
            gate.paused_at = Some(Instant::now());
        }
    }

    /// The host came back. Returns whether it stayed in the background
    /// long enough that the deferred update should restart it now.
    pub fn notify_host_resumed(&mut self) -> bool {
        let Some(gate) = self.resume_gate.as_mut() else {
            return false;
        };
        let Some(paused_at) = gate.paused_at.take() else {
            return false;
        };
        paused_at.elapsed() >= gate.minimum_background
    }

    /// The new code signals it initialized successfully. Idempotent;
    /// confirming with no pending marker is a no-op.
    pub fn confirm_ready(&mut self) -> Result<()> {
        self.marker.remove()
    }

    pub fn is_failed_hash(&self, hash: &str) -> bool {
        self.ledger.is_failed(hash)
    }

    /// Whether this run is the first run of the given package.
    pub fn is_first_run(&self, hash: &str) -> bool {
        self.did_update
            && !hash.is_empty()
            && self.store.current_package_hash().as_deref() == Some(hash)
    }

    /// A pending update exists and is awaiting its first run. With a hash
    /// the question is narrowed to that specific package.
    pub fn has_pending_update(&self, hash: Option<&str>) -> bool {
        match self.marker.read() {
            Some(pending) => {
                !pending.is_loading && hash.map_or(true, |wanted| pending.hash == wanted)
            }
            None => false,
        }
    }

    pub fn pending_state(&self) -> PendingState {
        match self.marker.read() {
            None => PendingState::Clean,
            Some(pending) if pending.is_loading => PendingState::Loading(pending.hash),
            Some(pending) => PendingState::Ready(pending.hash),
        }
    }

    pub fn is_running_binary_version(&self) -> bool {
        self.running_binary_version
    }

    /// The rollback report, if last boot rolled an update back. Consuming
    /// it clears the flag; it is reported at most once per rollback.
    pub fn take_rollback_report(&mut self) -> Option<PackageMetadata> {
        if !self.needs_rollback_report {
            return None;
        }
        self.needs_rollback_report = false;
        self.ledger.last_entry()
    }

    pub fn current_package_metadata(&self) -> Option<PackageMetadata> {
        self.store.current_package_metadata()
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    /// Removes every stored update, the pending marker, and the ledger;
    /// the next start runs the binary version with a blank history.
    pub fn clear_all_updates(&mut self) -> Result<()> {
        self.store.clear_all()?;
        self.marker.remove()?;
        self.ledger.clear()
    }
}
