// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::time::Duration;

use actionlog_kernel::config::DEFAULT_ACTION_SUFFIX;

use crate::errors::{StoreError, StoreResult};

/// Default capacity of every broadcast channel in the node.
pub const DEFAULT_CHANGE_BUFFER: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Appended to every record id written by this process.
    pub action_suffix: String,
    /// Extract declared attachment paths into the record's attachment map.
    pub blob_support: bool,
    /// Forward persisted actions before their write is acknowledged.
    pub synchronous: bool,
    /// Bound on how long a durable write may stay outstanding.
    pub write_timeout: Option<Duration>,
    /// Capacity of the change, transition and fault broadcast channels.
    pub change_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            action_suffix: DEFAULT_ACTION_SUFFIX.to_string(),
            blob_support: false,
            synchronous: false,
            write_timeout: Some(Duration::from_secs(30)),
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `ACTIONLOG_*` environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(suffix) = lookup("ACTIONLOG_ACTION_SUFFIX") {
            cfg.action_suffix = suffix;
        }
        if let Some(v) = lookup("ACTIONLOG_BLOB_SUPPORT") {
            cfg.blob_support = parse_bool("ACTIONLOG_BLOB_SUPPORT", &v)?;
        }
        if let Some(v) = lookup("ACTIONLOG_SYNCHRONOUS") {
            cfg.synchronous = parse_bool("ACTIONLOG_SYNCHRONOUS", &v)?;
        }
        if let Some(v) = lookup("ACTIONLOG_WRITE_TIMEOUT_MS") {
            let ms: u64 = v.trim().parse().map_err(|_| {
                StoreError::InvalidConfig(format!("ACTIONLOG_WRITE_TIMEOUT_MS={:?}", v))
            })?;
            // 0 disables the timeout.
            cfg.write_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(v) = lookup("ACTIONLOG_CHANGE_BUFFER") {
            cfg.change_buffer = match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(StoreError::InvalidConfig(format!(
                        "ACTIONLOG_CHANGE_BUFFER={:?}",
                        v
                    )))
                }
            };
        }

        Ok(cfg)
    }
}

fn parse_bool(key: &str, value: &str) -> StoreResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StoreError::InvalidConfig(format!("{}={:?}", key, value))),
    }
}
