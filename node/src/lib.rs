// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! actionlog-node: persistence for the action log.
//!
//! Wraps a reducer with the kernel's action gate, writes selected actions to a
//! document store, and rehydrates state from that store on startup.

pub mod adapter;
pub mod bootstrap;
pub mod config;
pub mod document;
pub mod errors;
pub mod store;
pub mod telemetry;

pub use adapter::{DocumentAdapter, SquashReport, StorageAdapter};
pub use config::StoreConfig;
pub use document::{Document, DocumentStore, FileDocumentStore, MemoryDocumentStore};
pub use errors::{StoreError, StoreResult};
pub use store::{PersistOptions, PersistentStore, StoreFault, StoreState, Transition};
