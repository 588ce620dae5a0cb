//! End-to-end tests for the session store and search layer against a
//! file-backed database.

use chrono::{DateTime, Duration, Utc};
use session_memory::services::memory::search;
use session_memory::{SearchOptions, SessionMemory, SessionStore, Task, TaskStatus};
use uuid::Uuid;

/// Storage keeps microsecond precision, so fixtures start from a
/// truncated "now" to make full-record equality asserts meaningful
fn now_micros() -> DateTime<Utc> {
    DateTime::from_timestamp_micros(Utc::now().timestamp_micros()).unwrap()
}

fn new_session(project: &str, days_ago: i64) -> SessionMemory {
    let mut s = SessionMemory::new(
        Uuid::new_v4().to_string(),
        project,
        now_micros() - Duration::days(days_ago),
    );
    s.project_name = project.rsplit('/').next().unwrap_or(project).to_string();
    s
}

#[test]
fn persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");

    let mut session = new_session("/work/app", 0);
    session.summary = "Implement retry logic for the uploader".into();
    session.tags = vec!["uploader".into()];
    let id = session.id.clone();

    {
        let store = SessionStore::open(&db_path).unwrap();
        store.save(&session).unwrap();
        store.close();
    }

    let store = SessionStore::open(&db_path).unwrap();
    let restored = store.get_by_id(&id).unwrap().unwrap();
    assert_eq!(restored, session);

    // The full-text index survives reopen too
    let hits = store.search("uploader", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].session.id, id);
}

#[test]
fn checkpoint_overwrites_are_last_writer_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path().join("sessions.db")).unwrap();

    let mut checkpoint = new_session("/work/app", 0);
    checkpoint.summary = "Started wiring the importer".into();
    store.save(&checkpoint).unwrap();

    checkpoint.summary = "Importer wired, started on validation".into();
    checkpoint.messages_count = 40;
    store.save(&checkpoint).unwrap();

    checkpoint.summary = "Importer and validation complete".into();
    checkpoint.messages_count = 95;
    checkpoint.ended_at = Some(Utc::now());
    store.save(&checkpoint).unwrap();

    let all = store.get_all(true).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].messages_count, 95);

    // Only the final checkpoint's tokens are searchable
    assert!(store.search("wiring", 10).unwrap().is_empty());
    assert_eq!(store.search("validation", 10).unwrap().len(), 1);
}

#[test]
fn sync_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path().join("sessions.db")).unwrap();

    let older = new_session("/work/app", 3);
    let newer = new_session("/work/app", 1);
    store.save(&older).unwrap();
    store.save(&newer).unwrap();

    // Oldest-first so a consumer uploads in causal order
    let unsynced = store.get_unsynced().unwrap();
    assert_eq!(unsynced.len(), 2);
    assert_eq!(unsynced[0].id, older.id);

    assert!(store.mark_synced(&older.id).unwrap());
    let unsynced = store.get_unsynced().unwrap();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].id, newer.id);

    // Inbound records arrive pre-synced and never show up as pending
    let mut foreign = new_session("/work/app", 0);
    foreign.synced = true;
    foreign.synced_at = Some(Utc::now());
    store.save(&foreign).unwrap();
    assert_eq!(store.get_unsynced().unwrap().len(), 1);
}

#[test]
fn project_scenario_archive_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path().join("sessions.db")).unwrap();

    let a = new_session("/work/app", 100);
    let b = new_session("/work/app", 0);
    store.save(&a).unwrap();
    store.save(&b).unwrap();

    let last = store.get_last_for_project("/work/app").unwrap().unwrap();
    assert_eq!(last.id, b.id);

    assert_eq!(store.archive_old(30).unwrap(), 1);
    assert!(store.get_by_id(&a.id).unwrap().unwrap().archived);

    let stats = store.get_stats().unwrap();
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.archived_sessions, 1);
    assert!(stats.storage_used_bytes > 0);
}

#[test]
fn filtered_search_across_projects() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path().join("sessions.db")).unwrap();

    let mut app = new_session("/work/app", 2);
    app.summary = "Database migration for the billing tables".into();
    store.save(&app).unwrap();

    let mut site = new_session("/work/site", 40);
    site.summary = "Billing page redesign".into();
    store.save(&site).unwrap();

    let hits = search::search(
        &store,
        &SearchOptions {
            query: "billing".into(),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(hits.len(), 2);

    let hits = search::search(
        &store,
        &SearchOptions {
            query: "billing".into(),
            project: Some("app".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].session.id, app.id);

    let hits = search::search(
        &store,
        &SearchOptions {
            query: "billing".into(),
            from: Some(Utc::now() - Duration::days(7)),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].session.id, app.id);
}

#[test]
fn related_and_predicate_queries() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path().join("sessions.db")).unwrap();

    let mut target = new_session("/work/app", 1);
    target.files_modified = vec!["src/billing/invoice.rs".into()];
    target.tags = vec!["billing".into()];
    store.save(&target).unwrap();

    let mut sibling = new_session("/work/app", 2);
    sibling.files_modified = vec!["src/billing/invoice.rs".into()];
    sibling.tags = vec!["billing".into()];
    sibling.tasks.push(Task {
        id: Uuid::new_v4().to_string(),
        description: "Handle proration edge cases".into(),
        status: TaskStatus::Pending,
        created_at: Utc::now(),
        completed_at: None,
    });
    store.save(&sibling).unwrap();

    let mut stranger = new_session("/other/tool", 3);
    stranger.blockers = vec!["waiting on design review".into()];
    store.save(&stranger).unwrap();

    let related = search::get_related(&store, &target.id, 5).unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].0.id, sibling.id);
    assert_eq!(related[0].1, 5 + 3 + 2);

    let pending = search::get_with_pending_tasks(&store, None).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, sibling.id);

    let blocked = search::get_with_blockers(&store, Some("/other")).unwrap();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].id, stranger.id);
}
