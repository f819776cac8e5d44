// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Dotted field paths as explicit token lists.

use serde_json::{Map, Value};

use crate::error::{KernelError, KernelResult};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Tokenize `a.b.c`. Empty paths and empty segments are rejected.
    pub fn parse(path: &str) -> KernelResult<Self> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(KernelError::InvalidPath(path.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Descend `root` one segment at a time.
    ///
    /// Objects are entered by key; arrays accept a numeric segment as index.
    pub fn locate_mut<'a>(&self, root: &'a mut Map<String, Value>) -> Option<&'a mut Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = root.get_mut(first)?;
        for segment in rest {
            current = match current {
                Value::Object(map) => map.get_mut(segment)?,
                Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    items.get_mut(index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }
}
