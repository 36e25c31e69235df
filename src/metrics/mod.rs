//! Metrics module for Prometheus-based monitoring.
//!
//! # Example
//!
//! ```ignore
//! use teddy_pipeline::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//!
//! let collector = MetricsCollector::new();
//! collector.record_task_attempt("fetch_data", true, 0.42);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics, write_metrics_file};

pub use prometheus::{
    ITEMS_DROPPED, ITEMS_FETCHED, REGISTRY, ROWS_UPSERTED, RUNS_TOTAL, TASKS_TOTAL, TASK_DURATION,
};
