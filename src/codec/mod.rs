// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Attachment Codec
//!
//! Moves large or binary payload values into a side map keyed by dotted field
//! path, and puts them back when a record is read.
//!
//! # Invariants
//! - `reinsert(extract(p, d)) == p` whenever every path in `d` names a leaf
//! - The caller's action is never mutated; extraction works on a copy
//! - Reinsertion borrows the attachment map and leaves it untouched

pub mod attachments;
pub mod path;

pub use attachments::{content_type_for, extract, reinsert, Attachment, AttachmentMap, Extracted};
pub use path::FieldPath;
