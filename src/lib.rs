// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! actionlog-kernel: the synchronous core of a persisted action log.
//!
//! Nothing in this crate performs I/O. It defines the action model, record
//! identifiers, the attachment codec, the ordering gate that decides when an
//! action may become visible, and the fold used to rehydrate state.

pub mod config;
pub mod error;
pub mod types;
pub mod codec;
pub mod event;
pub mod gate;
pub mod snapshot;
pub mod replay;

pub use error::{KernelError, KernelResult};
pub use event::Envelope;
pub use gate::{ActionFilter, ActionGate, GateOutcome, Next};
pub use replay::Reducer;
pub use types::action::Action;
pub use types::id::{RecordId, SavedAction, Sequence};

#[cfg(test)]
pub mod tests;
