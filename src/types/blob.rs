// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Binary payload values.
//!
//! JSON has no binary type, so a blob travels inside an action payload as a
//! single-key object: `{"$blob": {"content_type": "...", "data": [..bytes..]}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const BLOB_TAG: &str = "$blob";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut tagged = serde_json::Map::new();
        tagged.insert(
            BLOB_TAG.to_string(),
            serde_json::json!({
                "content_type": self.content_type,
                "data": self.data,
            }),
        );
        Value::Object(tagged)
    }

    /// Recognize a tagged blob value. Returns `None` for anything else.
    pub fn from_value(value: &Value) -> Option<Self> {
        let tagged = value.as_object()?;
        if tagged.len() != 1 {
            return None;
        }
        serde_json::from_value(tagged.get(BLOB_TAG)?.clone()).ok()
    }
}

impl From<Blob> for Value {
    fn from(blob: Blob) -> Self {
        blob.to_value()
    }
}
