// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Storage Adapter
//!
//! The capability surface the persistent store needs from a document store:
//! sequence tracking, snapshot and log retrieval, single-record appends, a live
//! feed of new records, and squash.
//!
//! # Record Layout
//! ```text
//! id:          <13 base-36 digits><suffix>     e.g. 000000000001f-RA
//! body:        {"type": "persistedAction", "payload": <action>}
//! attachments: {<dotted path>: {content_type, data}}   (blob support only)
//! ```
//! The snapshot lives in one document, `@@initial-state`, whose body is a
//! `SnapshotBody`.

use std::sync::{Arc, Mutex};

use actionlog_kernel::codec::{extract, reinsert, AttachmentMap};
use actionlog_kernel::config::{ACTION_INDEX_NAME, ACTION_RECORD_TYPE, SNAPSHOT_DOC_ID};
use actionlog_kernel::snapshot::SnapshotBody;
use actionlog_kernel::types::id::sort_log;
use actionlog_kernel::{Action, RecordId, SavedAction, Sequence};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::StoreConfig;
use crate::document::{Document, DocumentStore, IndexDefinition};
use crate::errors::{StoreError, StoreResult};

/// Folds the snapshot state (`None` before the first squash) and the ordered
/// log into the next snapshot state.
pub type SquashFold = Box<dyn FnOnce(Option<Value>, Vec<Action>) -> StoreResult<Value> + Send>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SquashReport {
    /// Log records folded into the snapshot and deleted.
    pub squashed: usize,
    /// Ids of those records.
    pub folded: Vec<RecordId>,
    /// Revision of the snapshot document after the squash.
    pub snapshot_rev: u64,
}

#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    /// Create the log index if needed and seed the sequence.
    async fn initialize(&self) -> StoreResult<()>;

    /// Last sequence value handed out (or the seed, if none yet).
    fn current_sequence(&self) -> u64;

    /// The snapshot document, or `None` if nothing has been squashed yet.
    async fn load_snapshot(&self) -> StoreResult<Option<SnapshotBody>>;

    /// Snapshot state if present, else `default`.
    async fn load_start_state(&self, default: Value) -> StoreResult<Value> {
        Ok(self
            .load_snapshot()
            .await?
            .map(|snapshot| snapshot.state)
            .unwrap_or(default))
    }

    /// Every persisted action in id order, attachments reinserted.
    async fn load_action_log(&self) -> StoreResult<Vec<SavedAction>>;

    /// Assign the next record id and encode `action` now; the returned future
    /// performs the durable write.
    fn append_action(&self, action: Action) -> BoxFuture<'static, StoreResult<RecordId>>;

    /// Live feed of newly written action records. A feed that fell behind
    /// re-sends the current log, so receivers must tolerate ids they have
    /// already seen.
    fn subscribe(&self) -> broadcast::Receiver<SavedAction>;

    /// Fold the whole log into the snapshot and delete the folded records.
    async fn squash(&self, fold: SquashFold) -> StoreResult<SquashReport>;
}

struct Feed {
    sender: broadcast::Sender<SavedAction>,
    task: JoinHandle<()>,
}

/// `StorageAdapter` over any `DocumentStore`.
pub struct DocumentAdapter<D: DocumentStore> {
    store: Arc<D>,
    config: StoreConfig,
    sequence: Mutex<Sequence>,
    feed: Mutex<Option<Feed>>,
}

impl<D: DocumentStore> DocumentAdapter<D> {
    pub fn new(store: Arc<D>, config: StoreConfig) -> Self {
        Self {
            store,
            config,
            sequence: Mutex::new(Sequence::default()),
            feed: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    fn next_id(&self) -> RecordId {
        let mut sequence = match self.sequence.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        RecordId::from_sequence(sequence.advance(), &self.config.action_suffix)
    }

    fn encode(&self, action: Action) -> StoreResult<(Value, Option<AttachmentMap>)> {
        if !self.config.blob_support {
            return Ok((json!({ "type": ACTION_RECORD_TYPE, "payload": action.into_value() }), None));
        }
        // The declaration stays in the stored payload so the record decodes
        // back to exactly what was dispatched.
        let declared = action.clone().take_attachment_paths()?;
        let extracted = extract(&action, &declared)?;
        Ok((
            json!({ "type": ACTION_RECORD_TYPE, "payload": extracted.payload.into_value() }),
            extracted.attachments,
        ))
    }

    async fn snapshot_doc(&self) -> StoreResult<Option<(SnapshotBody, u64)>> {
        match self.store.get(SNAPSHOT_DOC_ID).await {
            Ok(doc) => {
                let body: SnapshotBody = serde_json::from_value(doc.body)?;
                if !body.verify() {
                    tracing::warn!(
                        "Snapshot digest mismatch (stored {}). Using stored state anyway.",
                        body.digest
                    );
                }
                Ok(Some((body, doc.rev)))
            }
            Err(e) if e.is_missing() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn action_records(&self) -> StoreResult<Vec<Document>> {
        action_records(&*self.store).await
    }
}

async fn action_records<D: DocumentStore>(store: &D) -> StoreResult<Vec<Document>> {
    let mut docs = store.query(ACTION_INDEX_NAME).await?;
    docs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(docs)
}

async fn action_log<D: DocumentStore>(store: &D) -> StoreResult<Vec<SavedAction>> {
    let mut log = Vec::new();
    for doc in action_records(store).await? {
        if let Some(saved) = decode_record(&doc)? {
            log.push(saved);
        }
    }
    sort_log(&mut log);
    Ok(log)
}

/// Decode a stored action record, or `None` if `doc` is not one.
pub fn decode_record(doc: &Document) -> StoreResult<Option<SavedAction>> {
    if doc.deleted || doc.id == SNAPSHOT_DOC_ID || doc.doc_type() != Some(ACTION_RECORD_TYPE) {
        return Ok(None);
    }
    let payload = doc
        .body
        .get("payload")
        .cloned()
        .ok_or_else(|| StoreError::Missing { id: format!("{}/payload", doc.id) })?;
    let action = reinsert(Action::from_value(payload)?, doc.attachments.as_ref())?;
    Ok(Some(SavedAction {
        id: RecordId::from_raw(doc.id.clone()),
        action,
    }))
}

#[async_trait]
impl<D: DocumentStore> StorageAdapter for DocumentAdapter<D> {
    async fn initialize(&self) -> StoreResult<()> {
        let index = IndexDefinition {
            name: ACTION_INDEX_NAME.to_string(),
            doc_type: ACTION_RECORD_TYPE.to_string(),
        };
        match self.store.put_index(index).await {
            Ok(()) => tracing::debug!("Created index {}", ACTION_INDEX_NAME),
            Err(e) if e.is_conflict() => (),
            Err(e) => return Err(e),
        }

        // A consumed sequence value may never have reached the store (failed
        // write), so the highest existing id also bounds the seed.
        let watermark = self.store.info().await?.update_seq;
        let highest = self
            .action_records()
            .await?
            .iter()
            .filter_map(|doc| RecordId::from_raw(doc.id.clone()).sequence(&self.config.action_suffix))
            .max()
            .unwrap_or(0);
        let seed = watermark.max(highest);

        let mut sequence = match self.sequence.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seed > sequence.current() {
            *sequence = Sequence::seeded(seed);
        }
        tracing::info!("Storage adapter ready (sequence seeded at {})", sequence.current());
        Ok(())
    }

    fn current_sequence(&self) -> u64 {
        match self.sequence.lock() {
            Ok(guard) => guard.current(),
            Err(poisoned) => poisoned.into_inner().current(),
        }
    }

    async fn load_snapshot(&self) -> StoreResult<Option<SnapshotBody>> {
        Ok(self.snapshot_doc().await?.map(|(body, _)| body))
    }

    async fn load_action_log(&self) -> StoreResult<Vec<SavedAction>> {
        action_log(&*self.store).await
    }

    fn append_action(&self, action: Action) -> BoxFuture<'static, StoreResult<RecordId>> {
        let id = self.next_id();
        let (body, attachments) = match self.encode(action) {
            Ok(encoded) => encoded,
            Err(e) => return futures::future::ready(Err(e)).boxed(),
        };
        let doc = Document::new(id.as_str(), body).with_attachments(attachments);
        let store = Arc::clone(&self.store);

        async move {
            store.put(doc).await?;
            tracing::trace!("Action record {} written", id);
            Ok(id)
        }
        .boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<SavedAction> {
        let mut feed = match self.feed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(open) = feed.as_ref() {
            return open.sender.subscribe();
        }

        let (sender, receiver) = broadcast::channel(self.config.change_buffer);
        let mut changes = self.store.changes();
        let store = Arc::clone(&self.store);
        let out = sender.clone();

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => match decode_record(&change.doc) {
                        Ok(Some(saved)) => {
                            // No subscribers is fine.
                            let _ = out.send(saved);
                        }
                        Ok(None) => (),
                        Err(e) => {
                            tracing::warn!("Skipping undecodable record {}: {}", change.doc.id, e)
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // The dropped records are in the log by now.
                        tracing::warn!("Change feed lagged, {} change(s) dropped; re-sending the log", n);
                        match action_log(&*store).await {
                            Ok(log) => {
                                for saved in log {
                                    let _ = out.send(saved);
                                }
                            }
                            Err(e) => tracing::error!("Could not re-read the log after lag: {}", e),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Change feed closed");
        });

        tracing::debug!("Opened change feed");
        *feed = Some(Feed { sender, task });
        receiver
    }

    async fn squash(&self, fold: SquashFold) -> StoreResult<SquashReport> {
        let snapshot = self.snapshot_doc().await?;
        let (start, folded_before, snapshot_rev) = match snapshot {
            Some((body, rev)) => (Some(body.state), body.folded, rev),
            None => (None, 0, 0),
        };

        let records = self.action_records().await?;
        let mut actions = Vec::with_capacity(records.len());
        let mut folded = Vec::with_capacity(records.len());
        for doc in &records {
            if let Some(saved) = decode_record(doc)? {
                actions.push(saved.action);
                folded.push(saved.id);
            }
        }
        let squashed = actions.len();

        let state = fold(start, actions)?;
        let body = SnapshotBody::new(state, folded_before + squashed as u64)?;

        let mut batch: Vec<Document> = records.iter().map(Document::tombstone).collect();
        batch.push(Document::new(SNAPSHOT_DOC_ID, serde_json::to_value(&body)?).with_rev(snapshot_rev));

        let revs = self
            .store
            .bulk_docs(batch)
            .await
            .map_err(|e| StoreError::SquashFailure(e.to_string()))?;
        let snapshot_rev = revs.last().copied().unwrap_or(snapshot_rev);

        tracing::info!("Squashed {} action(s) into snapshot rev {}", squashed, snapshot_rev);

        // The new snapshot is committed; compaction only reclaims space.
        if let Err(e) = self.store.compact().await {
            tracing::warn!("Compaction after squash failed: {}", e);
        }

        Ok(SquashReport {
            squashed,
            folded,
            snapshot_rev,
        })
    }
}

impl<D: DocumentStore> Drop for DocumentAdapter<D> {
    fn drop(&mut self) {
        let feed = match self.feed.get_mut() {
            Ok(feed) => feed,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(open) = feed.take() {
            open.task.abort();
        }
    }
}
