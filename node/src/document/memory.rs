// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-process document store. Nothing survives the process.

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::config::DEFAULT_CHANGE_BUFFER;
use crate::document::{Change, DocTable, Document, DocumentStore, IndexDefinition, StoreInfo};
use crate::errors::StoreResult;

pub struct MemoryDocumentStore {
    table: Mutex<DocTable>,
    changes: broadcast::Sender<Change>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_BUFFER)
    }

    /// Store whose change feed buffers up to `capacity` changes per receiver.
    /// Usually `StoreConfig::change_buffer`.
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            table: Mutex::new(DocTable::default()),
            changes,
        }
    }

    fn publish(&self, changes: Vec<Change>) {
        for change in changes {
            // No receivers is fine.
            let _ = self.changes.send(change);
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn info(&self) -> StoreResult<StoreInfo> {
        Ok(self.table.lock().await.info())
    }

    async fn get(&self, id: &str) -> StoreResult<Document> {
        self.table.lock().await.get(id)
    }

    async fn put(&self, doc: Document) -> StoreResult<u64> {
        let revs = self.bulk_docs(vec![doc]).await?;
        Ok(revs[0])
    }

    async fn bulk_docs(&self, docs: Vec<Document>) -> StoreResult<Vec<u64>> {
        let mut table = self.table.lock().await;
        let stamped = table.prepare(docs)?;
        let revs = stamped.iter().map(|d| d.rev).collect();
        let changes = table.apply(stamped);
        // Published under the lock so subscribers see changes in seq order.
        self.publish(changes);
        Ok(revs)
    }

    async fn put_index(&self, index: IndexDefinition) -> StoreResult<()> {
        self.table.lock().await.add_index(index)
    }

    async fn query(&self, index: &str) -> StoreResult<Vec<Document>> {
        self.table.lock().await.query(index)
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    async fn compact(&self) -> StoreResult<()> {
        let dropped = self.table.lock().await.compact();
        tracing::debug!("Compaction dropped {} tombstone(s)", dropped);
        Ok(())
    }
}
