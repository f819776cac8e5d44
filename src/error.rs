// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A dotted field path could not be tokenized.
    #[error("invalid field path: {0:?}")]
    InvalidPath(String),
    /// A declared attachment path does not resolve to a field of the payload.
    #[error("attachment path {path:?} does not resolve to a field")]
    UnreachablePath { path: String },
    /// Actions are JSON objects; anything else is rejected.
    #[error("action must be a JSON object")]
    NotAnObject,
    /// The `type` discriminator is absent or not a string.
    #[error("action has no string `type` field")]
    MissingType,
    /// The `_attachments` field is present but is not a list of strings.
    #[error("`_attachments` must be an array of dotted path strings")]
    MalformedAttachmentList,
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self {
        KernelError::Serialization(e.to_string())
    }
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
