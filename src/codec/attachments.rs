// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Extraction and reinsertion of attachment values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::path::FieldPath;
use crate::config::{ATTACHMENT_PLACEHOLDER, FALLBACK_CONTENT_TYPE};
use crate::error::{KernelError, KernelResult};
use crate::types::action::Action;
use crate::types::blob::Blob;

/// A value moved out of the payload, with the content type it is stored under.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub content_type: String,
    pub data: Value,
}

/// Attachments keyed by the exact dotted path string that was declared.
pub type AttachmentMap = BTreeMap<String, Attachment>;

#[derive(Clone, Debug, PartialEq)]
pub struct Extracted {
    /// Copy of the action with placeholders where attachments were taken.
    pub payload: Action,
    /// `None` when no attachment paths were declared.
    pub attachments: Option<AttachmentMap>,
}

/// Content type under which `value` is stored.
///
/// Blobs carry their own type. Every other value is recorded as `text/plain`,
/// which is an approximation kept for compatibility with existing stores.
pub fn content_type_for(value: &Value) -> String {
    match Blob::from_value(value) {
        Some(blob) => blob.content_type,
        None => FALLBACK_CONTENT_TYPE.to_string(),
    }
}

pub fn extract(action: &Action, declared: &[String]) -> KernelResult<Extracted> {
    if declared.is_empty() {
        return Ok(Extracted {
            payload: action.clone(),
            attachments: None,
        });
    }

    let mut payload = action.clone();
    let mut attachments = AttachmentMap::new();

    for dotted in declared {
        if attachments.contains_key(dotted) {
            continue;
        }
        let path = FieldPath::parse(dotted)?;
        let slot = path
            .locate_mut(payload.fields_mut())
            .ok_or_else(|| KernelError::UnreachablePath { path: dotted.clone() })?;

        let data = std::mem::replace(slot, Value::String(ATTACHMENT_PLACEHOLDER.to_string()));
        attachments.insert(
            dotted.clone(),
            Attachment {
                content_type: content_type_for(&data),
                data,
            },
        );
    }

    Ok(Extracted {
        payload,
        attachments: Some(attachments),
    })
}

pub fn reinsert(mut payload: Action, attachments: Option<&AttachmentMap>) -> KernelResult<Action> {
    let Some(attachments) = attachments else {
        return Ok(payload);
    };

    for (dotted, attachment) in attachments {
        let path = FieldPath::parse(dotted)?;
        let slot = path
            .locate_mut(payload.fields_mut())
            .ok_or_else(|| KernelError::UnreachablePath { path: dotted.clone() })?;
        *slot = attachment.data.clone();
    }

    Ok(payload)
}
