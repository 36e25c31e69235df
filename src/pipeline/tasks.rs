//! The two tasks of the teddy DAG and the DAG builder.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::collectors::{validate_items, TodoCollector, TodoItem};
use crate::config::PipelineConfig;
use crate::error::TaskError;
use crate::metrics::MetricsCollector;
use crate::storage::{RecordStoreFactory, Teddy360};

use super::dag::{Dag, DagError, DefaultArgs, Task, TaskContext};

pub const TEDDY_DAG_ID: &str = "teddy_dag";
pub const TEDDY_DAG_DESCRIPTION: &str =
    "A DAG to fetch data from API and store it in Postgres using sqlx";
pub const FETCH_TASK_ID: &str = "fetch_data";
pub const STORE_TASK_ID: &str = "store_data";

/// Pulls the raw item list from the endpoint.
#[derive(Debug, Clone)]
pub struct FetchTask {
    collector: TodoCollector,
    metrics: MetricsCollector,
}

impl FetchTask {
    pub fn new(collector: TodoCollector) -> Self {
        Self {
            collector,
            metrics: MetricsCollector::new(),
        }
    }
}

#[async_trait]
impl Task for FetchTask {
    fn task_id(&self) -> &str {
        FETCH_TASK_ID
    }

    async fn execute(&self, _ctx: &TaskContext<'_>) -> Result<Value, TaskError> {
        let payload = self.collector.fetch().await?;
        let count = payload.as_array().map(Vec::len).unwrap_or(0);
        self.metrics.record_fetch(count);
        Ok(payload)
    }
}

/// Counts reported by a store attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub received: usize,
    pub completed: usize,
    pub dropped: usize,
    pub upserted: usize,
}

/// Validates the fetched payload and upserts the completed items.
///
/// The connection is resolved when the task runs, not when the DAG is built,
/// so connection changes apply to the next attempt.
pub struct StoreTask {
    conn_id: String,
    stores: Arc<dyn RecordStoreFactory>,
    metrics: MetricsCollector,
}

impl StoreTask {
    pub fn new(conn_id: impl Into<String>, stores: Arc<dyn RecordStoreFactory>) -> Self {
        Self {
            conn_id: conn_id.into(),
            stores,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }
}

/// Keeps completed items in payload order.
pub fn completed_records(items: Vec<TodoItem>) -> Vec<Teddy360> {
    items
        .into_iter()
        .filter(|item| item.completed)
        .map(TodoItem::into_record)
        .collect()
}

#[async_trait]
impl Task for StoreTask {
    fn task_id(&self) -> &str {
        STORE_TASK_ID
    }

    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<Value, TaskError> {
        let payload = ctx
            .xcom_pull(FETCH_TASK_ID)
            .ok_or_else(|| TaskError::MissingInput(FETCH_TASK_ID.to_string()))?;

        let items = validate_items(payload)?;
        let received = items.len();
        let records = completed_records(items);
        let completed = records.len();

        let store = self.stores.store_for(&self.conn_id)?;
        let upserted = store.merge_batch(&records).await?;

        let summary = StoreSummary {
            received,
            completed,
            dropped: received - completed,
            upserted,
        };
        self.metrics.record_store(summary.dropped, summary.upserted);
        info!(
            conn_id = %self.conn_id,
            url = %store.target(),
            received,
            dropped = summary.dropped,
            upserted,
            "Stored completed todos"
        );

        Ok(json!({
            "received": summary.received,
            "completed": summary.completed,
            "dropped": summary.dropped,
            "upserted": summary.upserted,
        }))
    }
}

/// Builds `fetch_data >> store_data` from pipeline settings.
pub fn teddy_dag(
    config: &PipelineConfig,
    collector: TodoCollector,
    stores: Arc<dyn RecordStoreFactory>,
) -> Result<Dag, DagError> {
    let default_args = DefaultArgs {
        retries: config.retries,
        retry_delay: config.retry_delay,
        ..DefaultArgs::default()
    };

    let mut dag = Dag::new(TEDDY_DAG_ID, default_args)
        .with_description(TEDDY_DAG_DESCRIPTION)
        .with_catchup(false);
    dag.add_task(Arc::new(FetchTask::new(collector)))?;
    dag.add_task(Arc::new(StoreTask::new(config.conn_id.clone(), stores)))?;
    dag.set_downstream(FETCH_TASK_ID, STORE_TASK_ID)?;
    dag.validate()?;
    Ok(dag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRecordStore;
    use std::time::Duration;

    #[test]
    fn test_completed_records_keeps_order() {
        let items = vec![
            TodoItem::new(3, 1, "c", true),
            TodoItem::new(1, 1, "a", false),
            TodoItem::new(2, 2, "b", true),
        ];
        let ids: Vec<i32> = completed_records(items).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_teddy_dag_shape() {
        let config = PipelineConfig::new().with_retry_delay(Duration::from_secs(1));
        let dag = teddy_dag(
            &config,
            TodoCollector::new().unwrap(),
            Arc::new(MemoryRecordStore::new()),
        )
        .unwrap();

        assert_eq!(dag.dag_id(), "teddy_dag");
        assert_eq!(dag.task_ids(), vec!["fetch_data", "store_data"]);
        assert_eq!(dag.upstream_of("store_data"), vec!["fetch_data"]);
        assert_eq!(dag.default_args().retries, 1);
        assert_eq!(dag.default_args().owner, "airflow");
        assert!(!dag.catchup());
    }

    #[test]
    fn test_store_task_uses_configured_conn_id() {
        let task = StoreTask::new("warehouse", Arc::new(MemoryRecordStore::new()));
        assert_eq!(task.conn_id(), "warehouse");
        assert_eq!(task.task_id(), STORE_TASK_ID);
    }
}
