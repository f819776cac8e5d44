// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Deterministic Replay
//!
//! # Guarantees
//! - Same snapshot + same ordered log => same state
//! - Replay order is record id order, never arrival order

use serde::Serialize;

use crate::snapshot::blake3::state_digest;
use crate::types::action::Action;
use crate::types::id::SavedAction;

/// The state-transition function supplied by the host application.
pub trait Reducer<S> {
    fn reduce(&self, state: S, action: &Action) -> S;
}

impl<S, F> Reducer<S> for F
where
    F: Fn(S, &Action) -> S,
{
    fn reduce(&self, state: S, action: &Action) -> S {
        self(state, action)
    }
}

/// Fold `actions` through `reducer` starting at `start`.
pub fn fold<'a, S, R, I>(start: S, actions: I, reducer: &R) -> S
where
    R: Reducer<S> + ?Sized,
    I: IntoIterator<Item = &'a Action>,
{
    actions
        .into_iter()
        .fold(start, |state, action| reducer.reduce(state, action))
}

/// Fold a log of saved entries. Entries must already be in id order.
pub fn fold_log<S, R>(start: S, log: &[SavedAction], reducer: &R) -> S
where
    R: Reducer<S> + ?Sized,
{
    fold(start, log.iter().map(|entry| &entry.action), reducer)
}

/// Compare two states by digest.
///
/// Returns `false` when the states diverge or cannot be encoded. Callers
/// decide whether divergence is worth a warning.
pub fn verify_replay_consistency<S: Serialize + ?Sized>(folded: &S, replayed: &S) -> bool {
    match (state_digest(folded), state_digest(replayed)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
