// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Snapshot State
//!
//! A snapshot is the folded result of every action squashed so far. It is a
//! cache over the log: the log plus the snapshot reproduce the live state, and a
//! missing snapshot simply means "start from the default state".

pub mod blake3;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KernelResult;

/// Body of the snapshot document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotBody {
    pub state: Value,
    /// Hex BLAKE3 digest of `state`, checked on load.
    pub digest: String,
    /// Number of actions folded into this snapshot over its lifetime.
    pub folded: u64,
}

impl SnapshotBody {
    pub fn new(state: Value, folded: u64) -> KernelResult<Self> {
        let digest = blake3::digest_hex(&state)?;
        Ok(Self { state, digest, folded })
    }

    /// True when the stored digest matches the stored state.
    pub fn verify(&self) -> bool {
        blake3::digest_hex(&self.state)
            .map(|d| d == self.digest)
            .unwrap_or(false)
    }
}
