//! High-level recording helpers over the raw Prometheus metrics.
//!
//! Every method is a no-op until `init_metrics()` has run, so library code
//! can record unconditionally.

use super::prometheus::{
    ITEMS_DROPPED, ITEMS_FETCHED, ROWS_UPSERTED, RUNS_TOTAL, TASKS_TOTAL, TASK_DURATION,
};

/// Metrics collector for pipeline runs.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record one task attempt.
    ///
    /// # Arguments
    ///
    /// * `task_id` - Task identifier (e.g., "fetch_data")
    /// * `success` - Whether the attempt succeeded
    /// * `duration_secs` - Attempt duration in seconds
    pub fn record_task_attempt(&self, task_id: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "failed" };

        if let Some(tasks_total) = TASKS_TOTAL.get() {
            tasks_total.with_label_values(&[task_id, status]).inc();
        }

        if let Some(task_duration) = TASK_DURATION.get() {
            task_duration
                .with_label_values(&[task_id])
                .observe(duration_secs);
        }

        tracing::trace!(
            task_id = task_id,
            status = status,
            duration_secs = duration_secs,
            "Recorded task metric"
        );
    }

    /// Record the final state of a DAG run.
    pub fn record_run(&self, dag_id: &str, state: &str) {
        if let Some(runs_total) = RUNS_TOTAL.get() {
            runs_total.with_label_values(&[dag_id, state]).inc();
        }
    }

    /// Record the size of a fetched payload.
    pub fn record_fetch(&self, items: usize) {
        if let Some(fetched) = ITEMS_FETCHED.get() {
            fetched.inc_by(items as f64);
        }
    }

    /// Record the outcome of a store batch.
    pub fn record_store(&self, dropped: usize, upserted: usize) {
        if let Some(items_dropped) = ITEMS_DROPPED.get() {
            items_dropped.inc_by(dropped as f64);
        }

        if let Some(rows_upserted) = ROWS_UPSERTED.get() {
            rows_upserted.inc_by(upserted as f64);
        }

        tracing::trace!(dropped, upserted, "Recorded store metric");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_metrics_collector_new() {
        let collector = MetricsCollector::new();
        assert!(std::mem::size_of_val(&collector) == 0);
    }

    #[test]
    fn test_recording_before_init_does_not_panic() {
        let collector = MetricsCollector::new();
        collector.record_task_attempt("fetch_data", true, 0.1);
        collector.record_store(1, 2);
    }

    #[test]
    fn test_recorded_values_are_exported() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();

        collector.record_task_attempt("store_data", false, 0.25);
        collector.record_run("teddy_dag", "failed");
        collector.record_fetch(200);
        collector.record_store(110, 90);

        let text = export_metrics();
        assert!(text.contains("teddy_task_attempts_total"));
        assert!(text.contains("task_id=\"store_data\""));
        assert!(text.contains("teddy_dag_runs_total"));
        assert!(text.contains("teddy_rows_upserted_total"));
    }
}
