use chrono::{NaiveDate, NaiveTime};
use rollcall_core::{AttendanceLedger, MarkOutcome, NewSubject};
use rollcall_store::SqliteStore;
use std::sync::{Arc, Barrier};
use std::thread;

const RACERS: usize = 16;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap()
}

fn register(store: &SqliteStore, key: &str) {
    store
        .register_subject(&NewSubject {
            key: key.into(),
            course: "cs".into(),
            batch: "2024".into(),
            image_path: format!("images/{key}.jpg"),
            ..Default::default()
        })
        .unwrap();
}

fn count_marked(outcomes: &[MarkOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| matches!(o, MarkOutcome::Marked(_)))
        .count()
}

#[test]
fn concurrent_marks_on_shared_store_yield_one_marked() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    register(&store, "alice");
    let barrier = Arc::new(Barrier::new(RACERS));

    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.try_mark("alice", date(), time()).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<MarkOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(count_marked(&outcomes), 1);
    assert_eq!(
        outcomes.iter().filter(|o| **o == MarkOutcome::AlreadyMarked).count(),
        RACERS - 1
    );
    assert_eq!(store.events_on(date()).unwrap().len(), 1);
}

#[test]
fn concurrent_marks_across_connections_yield_one_marked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attendance.db");
    register(&SqliteStore::open(&path).unwrap(), "alice");

    // Separate connections: only the unique constraint arbitrates.
    let stores: Vec<Arc<SqliteStore>> = (0..4)
        .map(|_| Arc::new(SqliteStore::open(&path).unwrap()))
        .collect();
    let barrier = Arc::new(Barrier::new(RACERS));

    let handles: Vec<_> = (0..RACERS)
        .map(|i| {
            let store = Arc::clone(&stores[i % stores.len()]);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.try_mark("alice", date(), time()).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<MarkOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(count_marked(&outcomes), 1);
    assert_eq!(stores[0].events_on(date()).unwrap().len(), 1);
}

#[test]
fn concurrent_marks_for_different_subjects_all_succeed() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let keys: Vec<String> = (0..8).map(|i| format!("subject-{i}")).collect();
    for key in &keys {
        register(&store, key);
    }

    let handles: Vec<_> = keys
        .iter()
        .cloned()
        .map(|key| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.try_mark(&key, date(), time()).unwrap())
        })
        .collect();
    let outcomes: Vec<MarkOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(count_marked(&outcomes), keys.len());
}

#[test]
fn ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("attendance.db");
    {
        let store = SqliteStore::open(&path).unwrap();
        register(&store, "alice");
        assert!(matches!(
            store.try_mark("alice", date(), time()).unwrap(),
            MarkOutcome::Marked(_)
        ));
    }
    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(
        reopened.try_mark("alice", date(), time()).unwrap(),
        MarkOutcome::AlreadyMarked
    );
}
