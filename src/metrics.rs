// src/metrics.rs
//! Run counters. Without an installed recorder every call is a no-op; the
//! binary installs the Prometheus recorder only when a textfile path is
//! configured, and writes the rendered exposition there after the run.

use crate::snapshot::write_atomic;
use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::path::Path;

pub const PAGES_FETCHED: &str = "watcher_pages_fetched_total";
pub const PAGES_FAILED: &str = "watcher_pages_failed_total";
pub const ENTRIES_PARSED: &str = "watcher_entries_parsed_total";
pub const ENTRIES_FILTERED: &str = "watcher_entries_filtered_total";
pub const ENTRIES_NEW: &str = "watcher_entries_new_total";
pub const SNAPSHOT_SAVE_FAILURES: &str = "watcher_snapshot_save_failures_total";
pub const NOTIFY_FAILURES: &str = "watcher_notify_failures_total";
pub const LAST_RUN_TS: &str = "watcher_last_run_ts";

/// One-time metric descriptions.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(PAGES_FETCHED, "Listing pages fetched successfully.");
        describe_counter!(PAGES_FAILED, "Listing pages that failed after retries.");
        describe_counter!(ENTRIES_PARSED, "Unique entries extracted from fetched pages.");
        describe_counter!(ENTRIES_FILTERED, "Entries admitted by the relevance filter.");
        describe_counter!(ENTRIES_NEW, "Entries not present in the previous snapshot.");
        describe_counter!(SNAPSHOT_SAVE_FAILURES, "Snapshot writes that failed.");
        describe_counter!(NOTIFY_FAILURES, "Notification channels that failed.");
        describe_gauge!(LAST_RUN_TS, "Unix ts when the watcher last completed a run.");
    });
}

pub fn incr(name: &'static str, by: u64) {
    if by > 0 {
        counter!(name).increment(by);
    }
}

pub fn mark_run_complete() {
    gauge!(LAST_RUN_TS).set(chrono::Utc::now().timestamp() as f64);
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder as the global one.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Atomically replace `path` with the current exposition (for a
    /// node_exporter textfile collector).
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.render().as_bytes())
            .with_context(|| format!("write metrics textfile {}", path.display()))
    }
}
