// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Document Store
//!
//! The storage collaborator the adapter is written against: revisioned JSON
//! documents, a store-wide update sequence, named type indexes and a live
//! change feed.
//!
//! # Semantics
//! - `put` with a stale revision fails with `Conflict`
//! - `get` of an absent or deleted document fails with `Missing`
//! - `bulk_docs` applies every document or none of them
//! - Every applied document bumps `update_seq` by one and emits a `Change`

pub mod file;
pub mod memory;

pub use file::FileDocumentStore;
pub use memory::MemoryDocumentStore;

use actionlog_kernel::codec::AttachmentMap;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::errors::{StoreError, StoreResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Revision this write is based on; 0 for a new document.
    #[serde(default)]
    pub rev: u64,
    #[serde(default)]
    pub deleted: bool,
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<AttachmentMap>,
}

impl Document {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            rev: 0,
            deleted: false,
            body,
            attachments: None,
        }
    }

    pub fn with_rev(mut self, rev: u64) -> Self {
        self.rev = rev;
        self
    }

    pub fn with_attachments(mut self, attachments: Option<AttachmentMap>) -> Self {
        self.attachments = attachments;
        self
    }

    /// A deletion marker for this document at its current revision.
    pub fn tombstone(&self) -> Self {
        Self {
            id: self.id.clone(),
            rev: self.rev,
            deleted: true,
            body: Value::Null,
            attachments: None,
        }
    }

    /// The body's `type` field, used by indexes.
    pub fn doc_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreInfo {
    pub update_seq: u64,
    pub doc_count: usize,
}

/// One applied write, as seen by change-feed subscribers.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub seq: u64,
    pub doc: Document,
}

/// Selects every live document whose body `type` equals `doc_type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub doc_type: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn info(&self) -> StoreResult<StoreInfo>;

    async fn get(&self, id: &str) -> StoreResult<Document>;

    /// Write one document. Returns its new revision.
    async fn put(&self, doc: Document) -> StoreResult<u64>;

    /// Write many documents atomically. Returns the new revisions in order.
    async fn bulk_docs(&self, docs: Vec<Document>) -> StoreResult<Vec<u64>>;

    /// Create a named index. `Conflict` if the name is taken.
    async fn put_index(&self, index: IndexDefinition) -> StoreResult<()>;

    /// Live documents selected by `index`, in no particular order.
    async fn query(&self, index: &str) -> StoreResult<Vec<Document>>;

    /// Subscribe to every write applied from now on.
    fn changes(&self) -> broadcast::Receiver<Change>;

    /// Discard tombstones and superseded revisions.
    async fn compact(&self) -> StoreResult<()>;
}

/// In-memory document table shared by the store implementations.
#[derive(Debug, Default)]
pub(crate) struct DocTable {
    docs: FxHashMap<String, Document>,
    indexes: FxHashMap<String, IndexDefinition>,
    update_seq: u64,
}

impl DocTable {
    pub(crate) fn info(&self) -> StoreInfo {
        StoreInfo {
            update_seq: self.update_seq,
            doc_count: self.docs.values().filter(|d| !d.deleted).count(),
        }
    }

    pub(crate) fn get(&self, id: &str) -> StoreResult<Document> {
        match self.docs.get(id) {
            Some(doc) if !doc.deleted => Ok(doc.clone()),
            _ => Err(StoreError::Missing { id: id.to_string() }),
        }
    }

    /// Validate a batch against current revisions without applying it.
    ///
    /// Returns each document stamped with its new revision.
    pub(crate) fn prepare(&self, docs: Vec<Document>) -> StoreResult<Vec<Document>> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut stamped = Vec::with_capacity(docs.len());

        for mut doc in docs {
            if !seen.insert(doc.id.clone()) {
                return Err(StoreError::Conflict { id: doc.id });
            }
            let current = self.docs.get(&doc.id);
            let next_rev = match current {
                Some(existing) if existing.deleted => {
                    if doc.rev != 0 && doc.rev != existing.rev {
                        return Err(StoreError::Conflict { id: doc.id });
                    }
                    existing.rev + 1
                }
                Some(existing) => {
                    if doc.rev != existing.rev {
                        return Err(StoreError::Conflict { id: doc.id });
                    }
                    existing.rev + 1
                }
                None => {
                    if doc.deleted {
                        return Err(StoreError::Missing { id: doc.id });
                    }
                    if doc.rev != 0 {
                        return Err(StoreError::Conflict { id: doc.id });
                    }
                    1
                }
            };
            doc.rev = next_rev;
            stamped.push(doc);
        }

        Ok(stamped)
    }

    /// Apply documents already stamped by `prepare`. Returns the changes.
    pub(crate) fn apply(&mut self, stamped: Vec<Document>) -> Vec<Change> {
        stamped
            .into_iter()
            .map(|doc| {
                self.update_seq += 1;
                self.docs.insert(doc.id.clone(), doc.clone());
                Change {
                    seq: self.update_seq,
                    doc,
                }
            })
            .collect()
    }

    pub(crate) fn add_index(&mut self, index: IndexDefinition) -> StoreResult<()> {
        if self.indexes.contains_key(&index.name) {
            return Err(StoreError::Conflict { id: index.name });
        }
        self.indexes.insert(index.name.clone(), index);
        Ok(())
    }

    pub(crate) fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.indexes.values()
    }

    pub(crate) fn query(&self, name: &str) -> StoreResult<Vec<Document>> {
        let index = self
            .indexes
            .get(name)
            .ok_or_else(|| StoreError::Missing { id: name.to_string() })?;
        Ok(self
            .docs
            .values()
            .filter(|doc| !doc.deleted && doc.doc_type() == Some(index.doc_type.as_str()))
            .cloned()
            .collect())
    }

    /// Drop tombstones. The update sequence is kept.
    pub(crate) fn compact(&mut self) -> usize {
        let before = self.docs.len();
        self.docs.retain(|_, doc| !doc.deleted);
        before - self.docs.len()
    }

    pub(crate) fn live_docs(&self) -> impl Iterator<Item = &Document> {
        self.docs.values().filter(|doc| !doc.deleted)
    }

    pub(crate) fn update_seq(&self) -> u64 {
        self.update_seq
    }

    /// Restore documents verbatim (revisions already assigned), as read from disk.
    pub(crate) fn restore(&mut self, docs: Vec<Document>) {
        for doc in docs {
            self.update_seq += 1;
            self.docs.insert(doc.id.clone(), doc);
        }
    }

    pub(crate) fn raise_watermark(&mut self, watermark: u64) {
        self.update_seq = self.update_seq.max(watermark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_revision_rules() {
        let mut table = DocTable::default();

        let stamped = table.prepare(vec![Document::new("a", json!({"v": 1}))]).unwrap();
        assert_eq!(stamped[0].rev, 1);
        table.apply(stamped);

        // Stale revision.
        let err = table.prepare(vec![Document::new("a", json!({"v": 2}))]).unwrap_err();
        assert!(err.is_conflict());

        // Correct revision.
        let stamped = table
            .prepare(vec![Document::new("a", json!({"v": 2})).with_rev(1)])
            .unwrap();
        table.apply(stamped);
        assert_eq!(table.get("a").unwrap().body, json!({"v": 2}));

        // Delete, then recreate.
        let tomb = table.get("a").unwrap().tombstone();
        let stamped = table.prepare(vec![tomb]).unwrap();
        table.apply(stamped);
        assert!(table.get("a").unwrap_err().is_missing());
        let stamped = table.prepare(vec![Document::new("a", json!({"v": 3}))]).unwrap();
        assert_eq!(stamped[0].rev, 4);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut table = DocTable::default();
        let stamped = table.prepare(vec![Document::new("a", json!({}))]).unwrap();
        table.apply(stamped);

        let err = table
            .prepare(vec![Document::new("b", json!({})), Document::new("a", json!({}))])
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(table.get("b").is_err());
        assert_eq!(table.info().update_seq, 1);
    }

    #[test]
    fn test_index_query_and_compact() {
        let mut table = DocTable::default();
        table
            .add_index(IndexDefinition {
                name: "things".into(),
                doc_type: "thing".into(),
            })
            .unwrap();
        assert!(table
            .add_index(IndexDefinition {
                name: "things".into(),
                doc_type: "other".into(),
            })
            .unwrap_err()
            .is_conflict());
        assert!(table.query("nope").unwrap_err().is_missing());

        let stamped = table
            .prepare(vec![
                Document::new("1", json!({"type": "thing"})),
                Document::new("2", json!({"type": "thing"})),
                Document::new("3", json!({"type": "other"})),
            ])
            .unwrap();
        table.apply(stamped);
        assert_eq!(table.query("things").unwrap().len(), 2);

        let tomb = table.get("1").unwrap().tombstone();
        let stamped = table.prepare(vec![tomb]).unwrap();
        table.apply(stamped);
        assert_eq!(table.query("things").unwrap().len(), 1);

        assert_eq!(table.compact(), 1);
        assert_eq!(table.info().update_seq, 4);
        assert_eq!(table.info().doc_count, 2);
    }
}
