//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by the pipeline and
//! provides functions for initializing, registering, and exporting them.

use prometheus::{Counter, CounterVec, Encoder, HistogramVec, Opts, Registry, TextEncoder};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

// Serializes initialization so concurrent callers cannot split the metrics
// across two registries.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Global Prometheus registry for all pipeline metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Task attempts, labeled by task id and status (success/failed).
pub static TASKS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Task attempt duration in seconds, labeled by task id.
pub static TASK_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Finished DAG runs, labeled by dag id and final state.
pub static RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Items returned by the endpoint.
pub static ITEMS_FETCHED: OnceLock<Counter> = OnceLock::new();

/// Items dropped because they were not completed.
pub static ITEMS_DROPPED: OnceLock<Counter> = OnceLock::new();

/// Rows upserted into teddy_360.
pub static ROWS_UPSERTED: OnceLock<Counter> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once is harmless; later calls keep the first
/// registry.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let tasks_total = CounterVec::new(
        Opts::new("teddy_task_attempts_total", "Task attempts by outcome"),
        &["task_id", "status"],
    )?;

    let task_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "teddy_task_duration_seconds",
            "Task attempt duration in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["task_id"],
    )?;

    let runs_total = CounterVec::new(
        Opts::new("teddy_dag_runs_total", "Finished DAG runs by final state"),
        &["dag_id", "state"],
    )?;

    let items_fetched = Counter::new("teddy_items_fetched_total", "Items returned by the API")?;
    let items_dropped = Counter::new(
        "teddy_items_dropped_total",
        "Items skipped because they were not completed",
    )?;
    let rows_upserted = Counter::new("teddy_rows_upserted_total", "Rows merged into teddy_360")?;

    registry.register(Box::new(tasks_total.clone()))?;
    registry.register(Box::new(task_duration.clone()))?;
    registry.register(Box::new(runs_total.clone()))?;
    registry.register(Box::new(items_fetched.clone()))?;
    registry.register(Box::new(items_dropped.clone()))?;
    registry.register(Box::new(rows_upserted.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = TASKS_TOTAL.set(tasks_total);
    let _ = TASK_DURATION.set(task_duration);
    let _ = RUNS_TOTAL.set(runs_total);
    let _ = ITEMS_FETCHED.set(items_fetched);
    let _ = ITEMS_DROPPED.set(items_dropped);
    let _ = ROWS_UPSERTED.set(rows_upserted);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead when the registry is missing or encoding
/// fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// Writes the text exposition to `path` for a textfile collector.
pub fn write_metrics_file(path: impl AsRef<Path>) -> std::io::Result<()> {
    std::fs::write(path, export_metrics())
}
