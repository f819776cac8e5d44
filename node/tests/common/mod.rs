// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actionlog_kernel::snapshot::SnapshotBody;
use actionlog_kernel::{Action, RecordId, SavedAction};
use actionlog_node::adapter::SquashFold;
use actionlog_node::{
    DocumentAdapter, MemoryDocumentStore, SquashReport, StorageAdapter, StoreConfig, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Semaphore};

pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("actionlog_node=debug")
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub total: i64,
    pub seen: Vec<String>,
}

pub fn counter_reducer(mut state: Counter, action: &Action) -> Counter {
    state.seen.push(action.action_type().to_string());
    if let Some(n) = action.get("n").and_then(Value::as_i64) {
        state.total += n;
    }
    state
}

pub fn add(action_type: &str, n: i64) -> Action {
    Action::new(action_type).with_field("n", n)
}

/// Persist every action whose type starts with `X`.
pub fn persist_x(action: &Action) -> bool {
    action.action_type().starts_with('X')
}

/// Poll `check` until it holds, or fail after two seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for: {}", what);
}

/// Adapter whose writes wait for a permit, and which can be told to fail.
pub struct HeldAdapter {
    pub inner: DocumentAdapter<MemoryDocumentStore>,
    permits: Arc<Semaphore>,
    fail_writes: AtomicBool,
    fail_squash: AtomicBool,
}

impl HeldAdapter {
    pub fn new(config: StoreConfig) -> Arc<Self> {
        Self::over(Arc::new(MemoryDocumentStore::new()), config)
    }

    pub fn over(store: Arc<MemoryDocumentStore>, config: StoreConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: DocumentAdapter::new(store, config),
            permits: Arc::new(Semaphore::new(0)),
            fail_writes: AtomicBool::new(false),
            fail_squash: AtomicBool::new(false),
        })
    }

    /// Let `n` held writes through.
    pub fn release_writes(&self, n: usize) {
        self.permits.add_permits(n);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_squash(&self) {
        self.fail_squash.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageAdapter for HeldAdapter {
    async fn initialize(&self) -> StoreResult<()> {
        self.inner.initialize().await
    }

    fn current_sequence(&self) -> u64 {
        self.inner.current_sequence()
    }

    async fn load_snapshot(&self) -> StoreResult<Option<SnapshotBody>> {
        self.inner.load_snapshot().await
    }

    async fn load_action_log(&self) -> StoreResult<Vec<SavedAction>> {
        self.inner.load_action_log().await
    }

    fn append_action(&self, action: Action) -> BoxFuture<'static, StoreResult<RecordId>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return futures::future::ready(Err(StoreError::WriteFailure("disk full".into()))).boxed();
        }
        let write = self.inner.append_action(action);
        let permits = Arc::clone(&self.permits);
        async move {
            permits
                .acquire()
                .await
                .map_err(|e| StoreError::WriteFailure(e.to_string()))?
                .forget();
            write.await
        }
        .boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<SavedAction> {
        self.inner.subscribe()
    }

    async fn squash(&self, fold: SquashFold) -> StoreResult<SquashReport> {
        if self.fail_squash.load(Ordering::SeqCst) {
            return Err(StoreError::SquashFailure("bulk write rejected".into()));
        }
        self.inner.squash(fold).await
    }
}
