//! End-to-end retention tests: full cleanup passes over a file-backed
//! store with real transcripts and archive files.

use std::fs;
use std::path::Path;

use chrono::{Duration, Utc};
use session_memory::{RetentionConfig, RetentionManager, SessionMemory, SessionStore};
use uuid::Uuid;

fn new_session(days_ago: i64) -> SessionMemory {
    let mut s = SessionMemory::new(
        Uuid::new_v4().to_string(),
        "/work/app",
        Utc::now() - Duration::days(days_ago),
    );
    s.summary = format!("work from {} days ago", days_ago);
    s
}

#[test]
fn full_lifecycle_archive_compress_delete() {
    let dir = tempfile::tempdir().unwrap();
    let archive_dir = dir.path().join("archive");
    let store = SessionStore::open(dir.path().join("sessions.db")).unwrap();

    // Old enough to archive, with a real transcript to compress
    let log_path = dir.path().join("transcript.jsonl");
    fs::write(&log_path, "user: hello\nassistant: hi\n".repeat(50)).unwrap();
    let mut old = new_session(45);
    old.log_file = Some(log_path.to_string_lossy().into_owned());
    store.save(&old).unwrap();

    // Past the archive window entirely
    let ancient = new_session(400);
    store.save(&ancient).unwrap();

    // Fresh, untouched by cleanup
    let fresh = new_session(1);
    store.save(&fresh).unwrap();

    let config = RetentionConfig {
        session_retention: "30d".into(),
        archive_retention: "1y".into(),
        max_storage_bytes: u64::MAX,
        archive_dir: archive_dir.clone(),
        host_settings_path: None,
        host_retention_days: 365,
    };
    let manager = RetentionManager::new(store.clone(), config);
    let report = manager.run_cleanup().unwrap();

    assert_eq!(report.sessions_archived, 2);
    assert_eq!(report.sessions_deleted, 1);
    assert_eq!(report.log_files_backed_up, 1);
    assert!(report.bytes_freed > 0);

    assert!(store.get_by_id(&ancient.id).unwrap().is_none());
    assert!(store.get_by_id(&fresh.id).unwrap().is_some());

    let archived = store.get_by_id(&old.id).unwrap().unwrap();
    assert!(archived.archived);
    let gz = archived.log_file_archived.unwrap();
    assert!(Path::new(&gz).exists());

    // The compressed copy reproduces the original transcript
    let restored = manager.decompress_log(&gz).unwrap().unwrap();
    assert_eq!(restored, fs::read_to_string(&log_path).unwrap());

    // A second pass finds nothing left to do
    let second = manager.run_cleanup().unwrap();
    assert_eq!(second.sessions_archived, 0);
    assert_eq!(second.sessions_deleted, 0);
    assert_eq!(second.log_files_backed_up, 0);
}

#[test]
fn quota_ceiling_evicts_oldest_including_active() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path().join("sessions.db")).unwrap();

    let oldest = new_session(10);
    let middle = new_session(5);
    let newest = new_session(0);
    store.save(&oldest).unwrap();
    store.save(&middle).unwrap();
    store.save(&newest).unwrap();

    // Ceiling low enough that records must go, but retention windows say
    // keep everything: the quota wins and evicts oldest-first.
    let config = RetentionConfig {
        session_retention: "forever".into(),
        archive_retention: "forever".into(),
        max_storage_bytes: 1,
        archive_dir: dir.path().join("archive"),
        host_settings_path: None,
        host_retention_days: 365,
    };
    let manager = RetentionManager::new(store.clone(), config);
    let report = manager.run_cleanup().unwrap();

    assert_eq!(report.sessions_archived, 0);
    assert_eq!(report.sessions_deleted, 3);
    assert!(store.get_all(true).unwrap().is_empty());
}

#[test]
fn host_retention_override_applied_once_at_construction() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = dir.path().join("settings.json");
    fs::write(&settings_path, r#"{"cleanupPeriodDays": 30, "theme": "dark"}"#).unwrap();

    let store = SessionStore::open(dir.path().join("sessions.db")).unwrap();
    let config = RetentionConfig {
        session_retention: "30d".into(),
        archive_retention: "1y".into(),
        max_storage_bytes: u64::MAX,
        archive_dir: dir.path().join("archive"),
        host_settings_path: Some(settings_path.clone()),
        host_retention_days: 365,
    };
    let _manager = RetentionManager::new(store, config);

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&settings_path).unwrap()).unwrap();
    assert_eq!(value["cleanupPeriodDays"], 365);
    assert_eq!(value["theme"], "dark");
}
