// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Suffix appended to every record identifier unless configured otherwise.
pub const DEFAULT_ACTION_SUFFIX: &str = "-RA";

/// Value of the `type` field on persisted action documents.
pub const ACTION_RECORD_TYPE: &str = "persistedAction";

/// Well-known identifier of the singleton snapshot document.
pub const SNAPSHOT_DOC_ID: &str = "@@initial-state";

/// Name of the index enumerating the action log.
pub const ACTION_INDEX_NAME: &str = "fetchActionHistory";

/// Reserved action field listing dotted paths of attachment values.
pub const ATTACHMENT_PATHS_FIELD: &str = "_attachments";

/// Value left in the payload where an attachment was extracted.
pub const ATTACHMENT_PLACEHOLDER: &str = "_attachment";

/// Content type recorded for attachments that are not blobs.
pub const FALLBACK_CONTENT_TYPE: &str = "text/plain";

/// Base-36 digits needed to render `u64::MAX`.
pub const RECORD_ID_WIDTH: usize = 13;
