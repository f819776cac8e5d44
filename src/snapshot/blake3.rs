// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canonical BLAKE3 State Hashing
//!
//! States are hashed over their JSON encoding. `serde_json` maps keep keys in
//! sorted order, so equal states produce equal bytes and equal digests.

use serde::Serialize;

use crate::error::KernelResult;

pub fn state_digest<S: Serialize + ?Sized>(state: &S) -> KernelResult<[u8; 32]> {
    let bytes = serde_json::to_vec(state)?;
    Ok(*::blake3::hash(&bytes).as_bytes())
}

pub fn digest_hex<S: Serialize + ?Sized>(state: &S) -> KernelResult<String> {
    let digest = state_digest(state)?;
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
