// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use actionlog_kernel::error::KernelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A document was written with a stale revision.
    #[error("Conflict writing document {id}")]
    Conflict { id: String },
    /// The document does not exist (or has been deleted).
    #[error("Document {id} is missing")]
    Missing { id: String },
    #[error("Durable append failed: {0}")]
    WriteFailure(String),
    #[error("Squash failed: {0}")]
    SquashFailure(String),
    #[error("Durable write not acknowledged within {0:?}")]
    Timeout(std::time::Duration),
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Document log corrupted at line {line}")]
    Corrupted { line: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::Missing { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
