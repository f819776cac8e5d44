// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Persistent Store
//!
//! A reducer-driven state container wrapped by the action gate. Every action
//! reaches the reducer through the gate; actions selected for persistence are
//! written through the storage adapter first and only become visible when the
//! change feed confirms them (unless running synchronously).
//!
//! # Channels
//! - `transitions()`: every action applied to the state, in application order
//! - `faults()`: write and squash failures; dispatch itself never fails

use std::sync::{Arc, Mutex, MutexGuard};

use actionlog_kernel::gate::GateOutcome;
use actionlog_kernel::replay::fold;
use actionlog_kernel::{Action, ActionFilter, ActionGate, Envelope, RecordId, Reducer, SavedAction};
use rustc_hash::FxHashSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::adapter::{SquashReport, StorageAdapter};
use crate::config::StoreConfig;
use crate::errors::{StoreError, StoreResult};
use crate::telemetry::{ACTIONS_PERSISTED, DEFERRED_ACTIONS, PENDING_WRITES, SQUASHES, WRITE_FAILURES};

/// Bound on the state a `PersistentStore` can hold.
pub trait StoreState: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreState for T where T: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Options supplied by the host application.
pub struct PersistOptions<S> {
    /// Selects the actions that are persisted. Default: none.
    pub action_filter: ActionFilter,
    /// Seed state, used only when nothing has been persisted yet.
    pub initial_state: Option<S>,
    /// Channel to publish transitions on. Subscribing before `open` lets the
    /// caller observe the bootstrap replay.
    pub transitions: Option<broadcast::Sender<Transition>>,
    pub config: StoreConfig,
}

impl<S> Default for PersistOptions<S> {
    fn default() -> Self {
        Self {
            action_filter: Box::new(|_| false),
            initial_state: None,
            transitions: None,
            config: StoreConfig::default(),
        }
    }
}

impl<S> PersistOptions<S> {
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Action) -> bool + Send + Sync + 'static,
    {
        self.action_filter = Box::new(filter);
        self
    }

    pub fn with_initial_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transitions(mut self, sender: broadcast::Sender<Transition>) -> Self {
        self.transitions = Some(sender);
        self
    }
}

/// One action applied to the state.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub action: Action,
    /// True while rehydrating from the log.
    pub replayed: bool,
}

/// A persistence failure surfaced to the host application.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreFault {
    /// The durable write for `action` failed or timed out. The action is not in
    /// the log; in synchronous mode it is already visible.
    WriteFailed { action: Action, reason: String },
    SquashFailed { reason: String },
}

pub(crate) struct Core<S> {
    /// Always `Some` outside of a reducer call.
    pub(crate) state: Option<S>,
    pub(crate) gate: ActionGate,
    /// Records already applied, replayed or confirmed. Pruned to the live log
    /// on catch-up and squash.
    pub(crate) applied: FxHashSet<RecordId>,
}

pub(crate) struct Shared<S> {
    pub(crate) adapter: Arc<dyn StorageAdapter>,
    pub(crate) reducer: Box<dyn Reducer<S> + Send + Sync>,
    pub(crate) core: Mutex<Core<S>>,
    pub(crate) transitions: broadcast::Sender<Transition>,
    pub(crate) faults: broadcast::Sender<StoreFault>,
    pub(crate) config: StoreConfig,
    /// Base state of the log while no snapshot exists.
    pub(crate) seed: S,
}

impl<S: StoreState> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, Core<S>> {
        match self.core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run one envelope through the gate, applying whatever it forwards.
    pub(crate) fn handle(&self, envelope: Envelope) -> GateOutcome {
        let mut core = self.lock();
        self.handle_locked(&mut core, envelope)
    }

    fn handle_locked(&self, core: &mut Core<S>, envelope: Envelope) -> GateOutcome {
        let replayed = matches!(envelope, Envelope::Confirmed { init: true, .. });
        let kind = envelope.kind();

        let Core { state, gate, .. } = core;
        let mut forward = |action: Action| {
            if let Some(current) = state.take() {
                *state = Some(self.reducer.reduce(current, &action));
            }
            // No subscribers is fine.
            let _ = self.transitions.send(Transition { action, replayed });
        };
        let outcome = gate.handle(envelope, &mut forward);

        tracing::debug!(
            "Gate: {} -> {} (pending={}, deferred={})",
            kind,
            outcome_name(&outcome),
            gate.pending(),
            gate.deferred()
        );
        record_gauges(gate);
        outcome
    }

    /// Confirm a record from the live feed, unless it was already applied.
    pub(crate) fn confirm(&self, saved: SavedAction) {
        let mut core = self.lock();
        if !core.applied.insert(saved.id.clone()) {
            tracing::trace!("Skipping {} (already applied)", saved.id);
            return;
        }
        self.handle_locked(&mut core, Envelope::confirmed(saved.action));
    }

    /// Confirm every record of `log` not applied yet, in id order. Used when
    /// the live feed dropped records.
    pub(crate) fn catch_up(&self, log: Vec<SavedAction>) -> usize {
        let mut core = self.lock();
        let live: FxHashSet<&RecordId> = log.iter().map(|saved| &saved.id).collect();
        core.applied.retain(|id| live.contains(id));

        let mut confirmed = 0;
        for saved in &log {
            if core.applied.insert(saved.id.clone()) {
                self.handle_locked(&mut core, Envelope::confirmed(saved.action.clone()));
                confirmed += 1;
            }
        }
        confirmed
    }

    /// Forget records a squash folded away; the feed never delivers them again.
    fn forget(&self, folded: &[RecordId]) {
        let folded: FxHashSet<&RecordId> = folded.iter().collect();
        self.lock().applied.retain(|id| !folded.contains(id));
    }

    pub(crate) fn acquire(&self) {
        let mut core = self.lock();
        core.gate.acquire();
        record_gauges(&core.gate);
    }

    pub(crate) fn release(&self) {
        let mut core = self.lock();
        let Core { state, gate, .. } = &mut *core;
        let mut forward = |action: Action| {
            if let Some(current) = state.take() {
                *state = Some(self.reducer.reduce(current, &action));
            }
            let _ = self.transitions.send(Transition {
                action,
                replayed: false,
            });
        };
        let flushed = gate.release(&mut forward);
        if flushed > 0 {
            tracing::debug!("Gate released, flushed {} deferred action(s)", flushed);
        }
        record_gauges(gate);
    }

    pub(crate) fn state(&self) -> S {
        self.lock().state.clone().unwrap_or_default()
    }

    fn fault(&self, fault: StoreFault) {
        let _ = self.faults.send(fault);
    }
}

/// Issue the durable write for an action the gate handed back.
fn spawn_write<S: StoreState>(shared: &Arc<Shared<S>>, runtime: &Handle, action: Action, forwarded: bool) {
    let write = shared.adapter.append_action(action.clone());
    let timeout = shared.config.write_timeout;
    let shared = Arc::clone(shared);

    runtime.spawn(async move {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, write).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(limit)),
            },
            None => write.await,
        };

        match result {
            Ok(id) => {
                metrics::counter!(ACTIONS_PERSISTED, 1);
                tracing::trace!("Persisted {} as {}", action.action_type(), id);
            }
            Err(e) => {
                metrics::counter!(WRITE_FAILURES, 1);
                tracing::error!("Failed to persist {}: {}", action.action_type(), e);
                // A synchronous write was never counted as outstanding.
                if !forwarded {
                    shared.release();
                }
                shared.fault(StoreFault::WriteFailed {
                    action,
                    reason: e.to_string(),
                });
            }
        }
    });
}

fn outcome_name(outcome: &GateOutcome) -> &'static str {
    match outcome {
        GateOutcome::Confirmed { .. } => "Confirmed",
        GateOutcome::Forwarded => "Forwarded",
        GateOutcome::Deferred => "Deferred",
        GateOutcome::Persist { forwarded: true, .. } => "Persist+Forwarded",
        GateOutcome::Persist { .. } => "Persist",
    }
}

fn record_gauges(gate: &ActionGate) {
    metrics::gauge!(PENDING_WRITES, gate.pending() as f64);
    metrics::gauge!(DEFERRED_ACTIONS, gate.deferred() as f64);
}

/// The wrapped store. Construct with [`PersistentStore::open`].
pub struct PersistentStore<S: StoreState> {
    pub(crate) shared: Arc<Shared<S>>,
    pub(crate) runtime: Handle,
    pub(crate) feed_task: Option<JoinHandle<()>>,
    pub(crate) last_replayed: Option<RecordId>,
}

impl<S: StoreState> PersistentStore<S> {
    /// Dispatch an action. Never fails; persistence faults go to `faults()`.
    ///
    /// May be called from any thread. Writes run on the runtime the store was
    /// opened on.
    pub fn dispatch(&self, action: Action) {
        if let GateOutcome::Persist { action, forwarded } = self.shared.handle(Envelope::Command(action)) {
            spawn_write(&self.shared, &self.runtime, action, forwarded);
        }
    }

    /// Snapshot of the current visible state.
    pub fn state(&self) -> S {
        self.shared.state()
    }

    /// Durable writes (and squashes) not yet confirmed.
    pub fn pending_writes(&self) -> usize {
        self.shared.lock().gate.pending()
    }

    /// Actions held back behind outstanding writes.
    pub fn deferred_actions(&self) -> usize {
        self.shared.lock().gate.deferred()
    }

    pub fn transitions(&self) -> broadcast::Receiver<Transition> {
        self.shared.transitions.subscribe()
    }

    pub fn faults(&self) -> broadcast::Receiver<StoreFault> {
        self.shared.faults.subscribe()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Id of the last record applied during bootstrap.
    pub fn last_replayed(&self) -> Option<&RecordId> {
        self.last_replayed.as_ref()
    }

    /// Fold the persisted log into a new snapshot.
    ///
    /// Counts as an outstanding operation for the gate while it runs, so
    /// non-persisted actions dispatched meanwhile are deferred until it ends.
    pub async fn squash(&self) -> StoreResult<SquashReport> {
        self.shared.acquire();

        let shared = Arc::clone(&self.shared);
        let result = self
            .shared
            .adapter
            .squash(Box::new(move |start: Option<Value>, actions: Vec<Action>| {
                let start: S = match start {
                    Some(state) => serde_json::from_value(state)?,
                    None => shared.seed.clone(),
                };
                let folded = fold(start, actions.iter(), &*shared.reducer);
                Ok(serde_json::to_value(folded)?)
            }))
            .await;

        self.shared.release();

        match &result {
            Ok(report) => {
                self.shared.forget(&report.folded);
                metrics::counter!(SQUASHES, 1);
                tracing::info!("Squash complete: {} action(s) folded", report.squashed);
            }
            Err(e) => {
                tracing::error!("Squash failed: {}", e);
                self.shared.fault(StoreFault::SquashFailed {
                    reason: e.to_string(),
                });
            }
        }
        result
    }
}

impl<S: StoreState> Drop for PersistentStore<S> {
    fn drop(&mut self) {
        if let Some(task) = self.feed_task.take() {
            task.abort();
        }
    }
}

impl<S: StoreState> std::fmt::Debug for PersistentStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.shared.lock();
        f.debug_struct("PersistentStore")
            .field("gate", &core.gate)
            .field("last_replayed", &self.last_replayed)
            .finish()
    }
}
