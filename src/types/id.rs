// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Identity types.

use serde::{Deserialize, Serialize};

use crate::config::RECORD_ID_WIDTH;
use crate::types::action::Action;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier of a persisted action record.
///
/// Rendered as a zero-padded base-36 sequence number followed by a suffix, so
/// that string comparison yields application order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn from_sequence(seq: u64, suffix: &str) -> Self {
        let mut id = encode_base36(seq);
        id.push_str(suffix);
        RecordId(id)
    }

    /// Wrap an identifier read back from storage.
    pub fn from_raw(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    /// Recover the sequence number, if this id was produced with `suffix`.
    pub fn sequence(&self, suffix: &str) -> Option<u64> {
        let digits = self.0.strip_suffix(suffix)?;
        u64::from_str_radix(digits, 36).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn encode_base36(mut n: u64) -> String {
    let mut buf = [b'0'; RECORD_ID_WIDTH];
    let mut pos = RECORD_ID_WIDTH;
    while n > 0 {
        pos -= 1;
        buf[pos] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    // Only ASCII digits were written.
    buf.iter().map(|&b| b as char).collect()
}

/// Monotonic counter seeded from the document store's change watermark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Sequence(u64);

impl Sequence {
    pub fn seeded(watermark: u64) -> Self {
        Sequence(watermark)
    }

    pub fn current(&self) -> u64 {
        self.0
    }

    /// Increment by one and return the new value.
    pub fn advance(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// An action read back from the log, with attachments already reinserted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedAction {
    pub id: RecordId,
    pub action: Action,
}

/// Order log entries by identifier, which is application order.
pub fn sort_log(entries: &mut [SavedAction]) {
    entries.sort_by(|a, b| a.id.cmp(&b.id));
}
