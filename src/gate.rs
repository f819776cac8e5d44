// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Action Gate - The Ordering Barrier
//!
//! Sits between dispatch and the reducer. Decides, per action, whether it must
//! be durably recorded before it is allowed to change visible state.
//!
//! # States
//! - **Idle**: no outstanding writes, deferred queue empty
//! - **Draining**: at least one outstanding write
//!
//! # Rules (tested in this order)
//! 1. Confirmation: forward the action. If exactly one write is outstanding and
//!    actions are deferred, forward all of them in arrival order. Then, unless
//!    the confirmation is a replay, count one write as landed.
//! 2. Not selected for persistence: defer while Draining, forward while Idle.
//! 3. Selected for persistence: count a new outstanding write and hand the
//!    action back for the caller to write. In synchronous mode it is also
//!    forwarded at once and the write is not counted.
//!
//! # Invariants
//! - A deferred action never becomes visible ahead of a write that was
//!   initiated before it arrived
//! - The deferred queue is emptied completely on every flush
//! - The counter never goes below zero
//! - Ordering assumes a single writer per log. A confirmation for another
//!   writer's record counts against this writer's outstanding writes, so it
//!   can release deferred actions before their own write lands
//!
//! The gate performs no I/O. Writes, timeouts and logging belong to the caller.

use std::collections::VecDeque;

use crate::event::Envelope;
use crate::types::action::Action;

/// Predicate selecting which actions are persisted.
pub type ActionFilter = Box<dyn Fn(&Action) -> bool + Send + Sync>;

/// The layer the gate forwards to (normally the reducer).
pub trait Next {
    fn next(&mut self, action: Action);
}

impl<F> Next for F
where
    F: FnMut(Action),
{
    fn next(&mut self, action: Action) {
        self(action)
    }
}

/// What the gate did with one envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum GateOutcome {
    /// Confirmation forwarded; `flushed` deferred actions followed it.
    Confirmed { flushed: usize },
    /// Forwarded straight through.
    Forwarded,
    /// Held back behind outstanding writes.
    Deferred,
    /// Must be written by the caller. `forwarded` is true in synchronous mode.
    Persist { action: Action, forwarded: bool },
}

pub struct ActionGate {
    filter: ActionFilter,
    synchronous: bool,
    pending: usize,
    deferred: VecDeque<Action>,
}

impl ActionGate {
    pub fn new(filter: ActionFilter, synchronous: bool) -> Self {
        Self {
            filter,
            synchronous,
            pending: 0,
            deferred: VecDeque::new(),
        }
    }

    /// A gate that persists nothing.
    pub fn pass_through() -> Self {
        Self::new(Box::new(|_| false), false)
    }

    pub fn handle<N: Next + ?Sized>(&mut self, envelope: Envelope, next: &mut N) -> GateOutcome {
        match envelope {
            Envelope::Confirmed { init, action } => {
                next.next(action);
                let flushed = if self.pending == 1 && !self.deferred.is_empty() {
                    self.flush(next)
                } else {
                    0
                };
                if !init {
                    self.pending = self.pending.saturating_sub(1);
                }
                GateOutcome::Confirmed { flushed }
            }
            Envelope::Command(action) if !(self.filter)(&action) => {
                if self.pending > 0 {
                    self.deferred.push_back(action);
                    GateOutcome::Deferred
                } else {
                    next.next(action);
                    GateOutcome::Forwarded
                }
            }
            Envelope::Command(action) => {
                self.pending += 1;
                if self.synchronous {
                    next.next(action.clone());
                    self.pending -= 1;
                    GateOutcome::Persist { action, forwarded: true }
                } else {
                    GateOutcome::Persist { action, forwarded: false }
                }
            }
        }
    }

    /// Count an outstanding operation that is not an action write (squash).
    pub fn acquire(&mut self) {
        self.pending += 1;
    }

    /// Give back one outstanding operation without a confirmation.
    ///
    /// Used when a squash finishes and when a write fails or times out. Reaching
    /// zero flushes everything that was deferred. Returns the number flushed.
    pub fn release<N: Next + ?Sized>(&mut self, next: &mut N) -> usize {
        self.pending = self.pending.saturating_sub(1);
        if self.pending == 0 {
            self.flush(next)
        } else {
            0
        }
    }

    fn flush<N: Next + ?Sized>(&mut self, next: &mut N) -> usize {
        let queued = std::mem::take(&mut self.deferred);
        let count = queued.len();
        for action in queued {
            next.next(action);
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.deferred.is_empty()
    }
}

impl std::fmt::Debug for ActionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionGate")
            .field("synchronous", &self.synchronous)
            .field("pending", &self.pending)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}
