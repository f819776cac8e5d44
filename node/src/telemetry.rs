// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const ACTIONS_PERSISTED: &str = "actionlog_actions_persisted_total";
pub const WRITE_FAILURES: &str = "actionlog_write_failures_total";
pub const PENDING_WRITES: &str = "actionlog_pending_writes";
pub const DEFERRED_ACTIONS: &str = "actionlog_deferred_actions";
pub const REPLAY_DURATION: &str = "actionlog_replay_duration_seconds";
pub const SQUASHES: &str = "actionlog_squash_total";

/// Initialize telemetry (logs + metrics)
///
/// Safe to call more than once; later calls leave the first installation in place.
pub fn init_telemetry() {
    // 1. Tracing (Logs)
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "actionlog_node=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    // 2. Metrics (Prometheus)
    if PROM_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => {
            tracing::warn!("Prometheus recorder not installed: {}", e);
            return;
        }
    }

    metrics::describe_counter!(ACTIONS_PERSISTED, "Actions acknowledged by the document store");
    metrics::describe_counter!(WRITE_FAILURES, "Durable appends that failed or timed out");
    metrics::describe_gauge!(PENDING_WRITES, "Durable writes not yet confirmed");
    metrics::describe_gauge!(DEFERRED_ACTIONS, "Actions held back behind outstanding writes");
    metrics::describe_histogram!(REPLAY_DURATION, "Time taken to rehydrate state from the log");
    metrics::describe_counter!(SQUASHES, "Completed log squashes");
}

/// Render the Prometheus exposition text.
pub fn render_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
