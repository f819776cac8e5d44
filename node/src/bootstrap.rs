// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Bootstrap and Rehydration
//!
//! Opening a store:
//! 1. Initialize the adapter (index, sequence seed)
//! 2. Subscribe to the change feed, before anything is read
//! 3. Load snapshot and log, fold the log over the snapshot
//! 4. Open at the snapshot state and replay each record as an `init`
//!    confirmation, so subscribers see the same transitions a live process did
//! 5. Check the replayed state against the fold (a mismatch means the reducer
//!    is not deterministic)
//! 6. Unless synchronous, start confirming live records from the feed
//!
//! Records delivered by the feed that were already applied are skipped by id.
//! If the feed falls behind, the log is re-read and every record not applied
//! yet is confirmed in id order.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use actionlog_kernel::replay::{fold_log, verify_replay_consistency};
use actionlog_kernel::{ActionGate, Envelope, Reducer, SavedAction};
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::adapter::StorageAdapter;
use crate::errors::StoreResult;
use crate::store::{Core, PersistOptions, PersistentStore, Shared, StoreState};
use crate::telemetry::REPLAY_DURATION;

impl<S: StoreState> PersistentStore<S> {
    /// Rehydrate state from `adapter` and wrap it with the action gate.
    ///
    /// Must be called from within a tokio runtime; the store keeps using that
    /// runtime for writes and the live feed.
    pub async fn open<A, R>(adapter: Arc<A>, reducer: R, options: PersistOptions<S>) -> StoreResult<Self>
    where
        A: StorageAdapter,
        R: Reducer<S> + Send + Sync + 'static,
    {
        let PersistOptions {
            action_filter,
            initial_state,
            transitions,
            config,
        } = options;

        adapter.initialize().await?;
        let feed = adapter.subscribe();

        let started = Instant::now();
        let snapshot = adapter.load_snapshot().await?;
        let log = adapter.load_action_log().await?;

        if snapshot.is_some() && initial_state.is_some() {
            tracing::warn!("Persisted snapshot found; discarding the supplied initial state");
        }
        // The log was written on top of the seed, so it stays the base until
        // the first squash replaces it with a snapshot.
        let seed = initial_state.unwrap_or_default();
        let start: S = match snapshot {
            Some(body) => serde_json::from_value(body.state)?,
            None => seed.clone(),
        };

        let folded = fold_log(start.clone(), &log, &reducer);

        let transitions = transitions.unwrap_or_else(|| broadcast::channel(config.change_buffer).0);
        let (faults, _) = broadcast::channel(config.change_buffer);
        let gate = ActionGate::new(action_filter, config.synchronous);

        let shared = Arc::new(Shared {
            adapter: adapter as Arc<dyn StorageAdapter>,
            reducer: Box::new(reducer),
            core: Mutex::new(Core {
                state: Some(start),
                gate,
                applied: log.iter().map(|entry| entry.id.clone()).collect(),
            }),
            transitions,
            faults,
            config,
            seed,
        });

        for entry in &log {
            shared.handle(Envelope::replayed(entry.action.clone()));
        }

        if !verify_replay_consistency(&folded, &shared.state()) {
            tracing::warn!(
                "Replayed state diverges from the folded log ({} action(s)). Is the reducer deterministic?",
                log.len()
            );
        }

        metrics::histogram!(REPLAY_DURATION, started.elapsed().as_secs_f64());
        tracing::info!(
            "Rehydrated {} action(s) in {:?} (sequence at {})",
            log.len(),
            started.elapsed(),
            shared.adapter.current_sequence()
        );

        let last_replayed = log.last().map(|entry| entry.id.clone());
        let runtime = Handle::current();

        let feed_task = if shared.config.synchronous {
            None
        } else {
            Some(runtime.spawn(confirm_live(Arc::clone(&shared), feed)))
        };

        Ok(PersistentStore {
            shared,
            runtime,
            feed_task,
            last_replayed,
        })
    }
}

/// Turn every new record on the feed into a confirmation.
async fn confirm_live<S: StoreState>(shared: Arc<Shared<S>>, mut feed: broadcast::Receiver<SavedAction>) {
    loop {
        match feed.recv().await {
            Ok(saved) => shared.confirm(saved),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Live feed lagged by {} record(s); catching up from the log", n);
                match shared.adapter.load_action_log().await {
                    Ok(log) => {
                        let confirmed = shared.catch_up(log);
                        tracing::info!("Caught up {} missed confirmation(s)", confirmed);
                    }
                    Err(e) => tracing::error!("Could not re-read the log after lag: {}", e),
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!("Live feed closed");
                break;
            }
        }
    }
}
