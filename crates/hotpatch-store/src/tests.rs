use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use hotpatch_core::{PackageMetadata, UpdateError};

use super::{FailedUpdateLedger, InstallStrategy, PackageStore, PendingUpdateMarker, StoreLayout};

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_layout() -> StoreLayout {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "hotpatch-store-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    StoreLayout::new(path)
}

fn metadata_with_hash(hash: &str) -> PackageMetadata {
    let mut metadata = PackageMetadata::default();
    metadata.set_str("packageHash", hash);
    metadata
}

fn seed_package(layout: &StoreLayout, hash: &str) -> PathBuf {
    let folder = layout.package_dir(hash);
    fs::create_dir_all(&folder).expect("must create package folder");
    fs::write(folder.join("app.bundle"), hash.as_bytes()).expect("must write bundle");
    metadata_with_hash(hash)
        .write_to(&layout.package_metadata_path(hash))
        .expect("must write package metadata");
    folder
}

#[test]
fn layout_places_documents_where_the_session_expects_them() {
    let layout = StoreLayout::new("/opt/app/updates");
    assert_eq!(layout.store_dir(), PathBuf::from("/opt/app/updates/store"));
    assert_eq!(
        layout.status_path(),
        PathBuf::from("/opt/app/updates/store/status.json")
    );
    assert_eq!(
        layout.package_dir("abc"),
        PathBuf::from("/opt/app/updates/store/abc")
    );
    assert_eq!(
        layout.package_metadata_path("abc"),
        PathBuf::from("/opt/app/updates/store/abc/package.json")
    );
    assert_eq!(
        layout.pending_update_path(),
        PathBuf::from("/opt/app/updates/pending.json")
    );
    assert_eq!(
        layout.ledger_path(),
        PathBuf::from("/opt/app/updates/failed-updates.json")
    );
}

#[test]
fn empty_store_reports_no_packages() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());

    assert!(store.current_package_hash().is_none());
    assert!(store.previous_package_hash().is_none());
    assert!(store.current_package_metadata().is_none());
    assert!(store.current_package_bundle_path("app.bundle").is_none());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn forward_install_promotes_current_to_previous() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    seed_package(&layout, "aaa");
    seed_package(&layout, "bbb");

    store
        .install(&metadata_with_hash("aaa"), InstallStrategy::DemoteCurrent)
        .expect("must install first package");
    assert_eq!(store.current_package_hash().as_deref(), Some("aaa"));
    assert!(store.previous_package_hash().is_none());

    store
        .install(&metadata_with_hash("bbb"), InstallStrategy::DemoteCurrent)
        .expect("must install second package");
    assert_eq!(store.current_package_hash().as_deref(), Some("bbb"));
    assert_eq!(store.previous_package_hash().as_deref(), Some("aaa"));
    assert!(layout.package_dir("aaa").exists());
    assert!(layout.package_dir("bbb").exists());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn forward_install_deletes_the_dethroned_previous_folder() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    seed_package(&layout, "aaa");
    seed_package(&layout, "bbb");
    seed_package(&layout, "ccc");

    for hash in ["aaa", "bbb", "ccc"] {
        store
            .install(&metadata_with_hash(hash), InstallStrategy::DemoteCurrent)
            .expect("must install");
    }

    assert_eq!(store.current_package_hash().as_deref(), Some("ccc"));
    assert_eq!(store.previous_package_hash().as_deref(), Some("bbb"));
    assert!(!layout.package_dir("aaa").exists());
    assert!(layout.package_dir("bbb").exists());
    assert!(layout.package_dir("ccc").exists());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn forward_install_keeps_the_previous_folder_when_it_is_the_incoming_package() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    seed_package(&layout, "aaa");
    seed_package(&layout, "bbb");

    store
        .install(&metadata_with_hash("aaa"), InstallStrategy::DemoteCurrent)
        .expect("must install");
    store
        .install(&metadata_with_hash("bbb"), InstallStrategy::DemoteCurrent)
        .expect("must install");
    // Reinstalling the package that is currently the previous one must not
    // delete the folder that is about to become current again.
    store
        .install(&metadata_with_hash("aaa"), InstallStrategy::DemoteCurrent)
        .expect("must reinstall");

    assert_eq!(store.current_package_hash().as_deref(), Some("aaa"));
    assert_eq!(store.previous_package_hash().as_deref(), Some("bbb"));
    assert!(layout.package_dir("aaa").exists());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn replace_current_supersedes_an_unconfirmed_package_in_place() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    seed_package(&layout, "aaa");
    seed_package(&layout, "bbb");
    seed_package(&layout, "ccc");

    store
        .install(&metadata_with_hash("aaa"), InstallStrategy::DemoteCurrent)
        .expect("must install");
    store
        .install(&metadata_with_hash("bbb"), InstallStrategy::DemoteCurrent)
        .expect("must install");
    store
        .install(&metadata_with_hash("ccc"), InstallStrategy::ReplaceCurrent)
        .expect("must replace unconfirmed package");

    assert_eq!(store.current_package_hash().as_deref(), Some("ccc"));
    assert_eq!(store.previous_package_hash().as_deref(), Some("aaa"));
    assert!(!layout.package_dir("bbb").exists());
    assert!(layout.package_dir("aaa").exists());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn rollback_restores_the_previous_package() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    seed_package(&layout, "aaa");
    seed_package(&layout, "bbb");

    store
        .install(&metadata_with_hash("aaa"), InstallStrategy::DemoteCurrent)
        .expect("must install");
    store
        .install(&metadata_with_hash("bbb"), InstallStrategy::DemoteCurrent)
        .expect("must install");
    store.rollback().expect("must roll back");

    assert_eq!(store.current_package_hash().as_deref(), Some("aaa"));
    assert!(store.previous_package_hash().is_none());
    assert!(!layout.package_dir("bbb").exists());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn rollback_without_a_previous_package_restores_the_binary_version() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    seed_package(&layout, "aaa");

    store
        .install(&metadata_with_hash("aaa"), InstallStrategy::DemoteCurrent)
        .expect("must install");
    store.rollback().expect("must roll back to binary version");

    assert!(store.current_package_hash().is_none());
    assert!(store.previous_package_hash().is_none());
    assert!(!layout.package_dir("aaa").exists());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn corrupt_status_record_heals_to_empty() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    fs::create_dir_all(layout.store_dir()).expect("must create store dir");
    fs::write(layout.status_path(), b"{ not json").expect("must write garbage");

    assert!(store.current_package_hash().is_none());
    assert!(store.previous_package_hash().is_none());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn status_writes_leave_no_temporary_file_behind() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    seed_package(&layout, "aaa");

    store
        .install(&metadata_with_hash("aaa"), InstallStrategy::DemoteCurrent)
        .expect("must install");

    let leftovers: Vec<_> = fs::read_dir(layout.store_dir())
        .expect("must list store dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|v| v.to_str()) == Some("tmp"))
        .collect();
    assert!(leftovers.is_empty(), "unexpected leftovers: {leftovers:?}");

    let raw = fs::read_to_string(layout.status_path()).expect("must read status record");
    assert!(raw.contains("\"currentPackage\": \"aaa\""));

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn bundle_path_prefers_the_recorded_relative_path() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    let folder = seed_package(&layout, "aaa");

    let mut metadata = metadata_with_hash("aaa");
    metadata.set_bundle_path("nested/entry.bundle");
    metadata
        .write_to(&layout.package_metadata_path("aaa"))
        .expect("must rewrite metadata");

    store
        .install(&metadata, InstallStrategy::DemoteCurrent)
        .expect("must install");

    assert_eq!(
        store.current_package_bundle_path("app.bundle"),
        Some(folder.join("nested/entry.bundle"))
    );

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn bundle_path_falls_back_to_the_default_entry_file() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    let folder = seed_package(&layout, "aaa");

    store
        .install(&metadata_with_hash("aaa"), InstallStrategy::DemoteCurrent)
        .expect("must install");

    assert_eq!(
        store.current_package_bundle_path("app.bundle"),
        Some(folder.join("app.bundle"))
    );

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn install_without_a_hash_is_a_contract_violation() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());

    let err = store
        .install(&PackageMetadata::default(), InstallStrategy::DemoteCurrent)
        .expect_err("hashless install must fail");
    assert!(matches!(
        UpdateError::classify(&err),
        Some(UpdateError::Internal(_))
    ));

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn clear_all_removes_the_store_directory() {
    let layout = test_layout();
    let store = PackageStore::new(layout.clone());
    seed_package(&layout, "aaa");
    store
        .install(&metadata_with_hash("aaa"), InstallStrategy::DemoteCurrent)
        .expect("must install");

    store.clear_all().expect("must clear store");
    assert!(!layout.store_dir().exists());
    assert!(store.current_package_hash().is_none());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn pending_marker_round_trips_and_overwrites() {
    let layout = test_layout();
    let marker = PendingUpdateMarker::new(&layout);

    assert!(marker.read().is_none());

    marker.save("aaa", false).expect("must save marker");
    let pending = marker.read().expect("marker should exist");
    assert_eq!(pending.hash, "aaa");
    assert!(!pending.is_loading);

    marker.save("aaa", true).expect("must re-arm marker");
    let pending = marker.read().expect("marker should exist");
    assert!(pending.is_loading);

    marker.remove().expect("must remove marker");
    assert!(marker.read().is_none());
    marker.remove().expect("removing an absent marker is fine");

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn corrupt_pending_marker_reads_as_absent() {
    let layout = test_layout();
    let marker = PendingUpdateMarker::new(&layout);
    fs::create_dir_all(layout.root()).expect("must create root");
    fs::write(layout.pending_update_path(), b"\"hash\": oops").expect("must write garbage");

    assert!(marker.read().is_none());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn ledger_records_and_finds_failed_hashes() {
    let layout = test_layout();
    let ledger = FailedUpdateLedger::new(&layout);

    assert!(!ledger.is_failed("aaa"));
    // Reading a missing ledger must not conjure the file into existence.
    assert!(!layout.ledger_path().exists());

    ledger
        .append(&metadata_with_hash("aaa"))
        .expect("must append");
    ledger
        .append(&metadata_with_hash("bbb"))
        .expect("must append");
    // Duplicates are allowed; the ledger is append-only.
    ledger
        .append(&metadata_with_hash("aaa"))
        .expect("must append duplicate");

    assert!(ledger.is_failed("aaa"));
    assert!(ledger.is_failed("bbb"));
    assert!(!ledger.is_failed("ccc"));
    assert_eq!(ledger.entries().len(), 3);
    assert_eq!(
        ledger
            .last_entry()
            .and_then(|entry| entry.package_hash().map(str::to_string))
            .as_deref(),
        Some("aaa")
    );

    ledger.clear().expect("must clear ledger");
    assert!(!layout.ledger_path().exists());
    ledger.clear().expect("clearing an absent ledger is fine");

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn corrupt_ledger_heals_to_an_empty_document() {
    let layout = test_layout();
    let ledger = FailedUpdateLedger::new(&layout);
    fs::create_dir_all(layout.root()).expect("must create root");
    fs::write(layout.ledger_path(), b"[{ broken").expect("must write garbage");

    assert!(!ledger.is_failed("aaa"));

    let healed = fs::read_to_string(layout.ledger_path()).expect("must read healed ledger");
    let parsed: Vec<serde_json::Value> =
        serde_json::from_str(&healed).expect("healed ledger must be well-formed");
    assert!(parsed.is_empty());

    let _ = fs::remove_dir_all(layout.root());
}
