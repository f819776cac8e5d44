// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! The action: a structurally typed command record.
//!
//! An action is a JSON object carrying a string `type` discriminator and any
//! number of payload fields. It is opaque to this crate beyond those two facts
//! and the reserved `_attachments` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ATTACHMENT_PATHS_FIELD;
use crate::error::{KernelError, KernelResult};

const TYPE_FIELD: &str = "type";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Action {
    fields: Map<String, Value>,
}

impl Action {
    pub fn new(action_type: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(TYPE_FIELD.to_string(), Value::String(action_type.into()));
        Self { fields }
    }

    /// Builder-style field setter. Overwrites an existing field of the same name.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Declare dotted paths whose values should be stored as attachments.
    pub fn with_attachments<I, P>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let paths: Vec<Value> = paths.into_iter().map(|p| Value::String(p.into())).collect();
        self.with_field(ATTACHMENT_PATHS_FIELD, Value::Array(paths))
    }

    pub fn from_value(value: Value) -> KernelResult<Self> {
        match value {
            Value::Object(fields) => {
                if !matches!(fields.get(TYPE_FIELD), Some(Value::String(_))) {
                    return Err(KernelError::MissingType);
                }
                Ok(Self { fields })
            }
            _ => Err(KernelError::NotAnObject),
        }
    }

    pub fn action_type(&self) -> &str {
        self.fields
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    pub fn has_attachment_paths(&self) -> bool {
        self.fields.contains_key(ATTACHMENT_PATHS_FIELD)
    }

    /// Remove the `_attachments` declaration and return the declared paths.
    ///
    /// An action without the field yields an empty list.
    pub fn take_attachment_paths(&mut self) -> KernelResult<Vec<String>> {
        let Some(declared) = self.fields.remove(ATTACHMENT_PATHS_FIELD) else {
            return Ok(Vec::new());
        };
        match declared {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(path) => Ok(path),
                    _ => Err(KernelError::MalformedAttachmentList),
                })
                .collect(),
            Value::Null => Ok(Vec::new()),
            _ => Err(KernelError::MalformedAttachmentList),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl TryFrom<Value> for Action {
    type Error = KernelError;

    fn try_from(value: Value) -> KernelResult<Self> {
        Action::from_value(value)
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        action.into_value()
    }
}
