// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use std::sync::Arc;

use actionlog_node::{
    DocumentAdapter, FileDocumentStore, MemoryDocumentStore, PersistOptions, PersistentStore,
    StorageAdapter, StoreConfig,
};
use common::{add, counter_reducer, eventually, init_logs, Counter};
use tempfile::tempdir;
use tokio::sync::broadcast;

fn persist_all() -> PersistOptions<Counter> {
    PersistOptions::default().with_filter(|_| true)
}

async fn open_memory(store: &Arc<MemoryDocumentStore>, options: PersistOptions<Counter>) -> PersistentStore<Counter> {
    let adapter = Arc::new(DocumentAdapter::new(store.clone(), options.config.clone()));
    PersistentStore::<Counter>::open(adapter, counter_reducer, options)
        .await
        .expect("open")
}

async fn settle(store: &PersistentStore<Counter>, expected: usize) {
    eventually("writes confirmed", || {
        store.pending_writes() == 0 && store.state().seen.len() == expected
    })
    .await;
}

#[tokio::test]
async fn test_rehydrates_by_folding_log_over_seed() {
    init_logs();
    let docs = Arc::new(MemoryDocumentStore::new());
    let seed = Counter { total: 100, seen: vec![] };

    {
        let store = open_memory(&docs, persist_all().with_initial_state(seed.clone())).await;
        store.dispatch(add("a1", 1));
        store.dispatch(add("a2", 2));
        settle(&store, 2).await;
    }

    let (tx, mut rx) = broadcast::channel(16);
    let store = open_memory(&docs, persist_all().with_initial_state(seed.clone()).with_transitions(tx)).await;

    let expected = counter_reducer(counter_reducer(seed, &add("a1", 1)), &add("a2", 2));
    assert_eq!(store.state(), expected);
    assert_eq!(store.state().total, 103);

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert!(first.replayed && second.replayed);
    assert_eq!(first.action, add("a1", 1));
    assert_eq!(second.action, add("a2", 2));
    assert!(store.last_replayed().is_some());
}

#[tokio::test]
async fn test_snapshot_wins_over_supplied_initial_state() {
    let docs = Arc::new(MemoryDocumentStore::new());

    {
        let store = open_memory(&docs, persist_all()).await;
        store.dispatch(add("a1", 1));
        store.dispatch(add("a2", 2));
        settle(&store, 2).await;
        let report = store.squash().await.unwrap();
        assert_eq!(report.squashed, 2);

        store.dispatch(add("a3", 3));
        settle(&store, 3).await;
    }

    let ignored = Counter { total: -999, seen: vec!["bogus".into()] };
    let store = open_memory(&docs, persist_all().with_initial_state(ignored)).await;
    assert_eq!(store.state().total, 6);
    assert_eq!(store.state().seen, vec!["a1", "a2", "a3"]);
}

#[tokio::test]
async fn test_file_store_survives_restart_and_keeps_id_order() {
    init_logs();
    let dir = tempdir().unwrap();
    let path = dir.path().join("actions.log");

    {
        let docs = Arc::new(FileDocumentStore::open(&path).unwrap());
        let adapter = Arc::new(DocumentAdapter::new(docs, StoreConfig::default()));
        let store = PersistentStore::<Counter>::open(adapter, counter_reducer, persist_all())
            .await
            .unwrap();
        store.dispatch(add("a1", 1));
        store.dispatch(add("a2", 2));
        settle(&store, 2).await;
    }

    let docs = Arc::new(FileDocumentStore::open(&path).unwrap());
    let adapter = Arc::new(DocumentAdapter::new(docs, StoreConfig::default()));
    let store = PersistentStore::<Counter>::open(adapter.clone(), counter_reducer, persist_all())
        .await
        .unwrap();
    assert_eq!(store.state().seen, vec!["a1", "a2"]);

    store.dispatch(add("a3", 3));
    settle(&store, 3).await;

    let log = adapter.load_action_log().await.unwrap();
    let types: Vec<&str> = log.iter().map(|entry| entry.action.action_type()).collect();
    assert_eq!(types, vec!["a1", "a2", "a3"]);
    assert!(log.windows(2).all(|pair| pair[0].id < pair[1].id));
}

#[tokio::test]
async fn test_writes_from_another_writer_are_confirmed() {
    let docs = Arc::new(MemoryDocumentStore::new());
    let reader = open_memory(&docs, PersistOptions::default()).await;

    let other = StoreConfig {
        action_suffix: "-B".into(),
        ..StoreConfig::default()
    };
    let writer = open_memory(&docs, persist_all().with_config(other)).await;

    writer.dispatch(add("remote", 7));
    settle(&writer, 1).await;

    eventually("reader confirmed", || reader.state().seen == vec!["remote"]).await;
    assert_eq!(reader.state().total, 7);
    assert_eq!(reader.pending_writes(), 0);
}

#[tokio::test]
async fn test_empty_store_opens_at_seed() {
    let docs = Arc::new(MemoryDocumentStore::new());
    let seed = Counter { total: 5, seen: vec![] };
    let store = open_memory(&docs, PersistOptions::default().with_initial_state(seed.clone())).await;
    assert_eq!(store.state(), seed);
    assert!(store.last_replayed().is_none());
}
