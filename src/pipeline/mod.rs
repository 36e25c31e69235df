//! DAG definition and execution for the teddy pipeline.
//!
//! # Architecture
//!
//! - **Dag**: tasks, `upstream >> downstream` edges and the run state machine
//! - **Tasks**: `fetch_data` (HTTP GET) and `store_data` (filter + upsert)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use teddy_pipeline::collectors::TodoCollector;
//! use teddy_pipeline::config::{ConnectionResolver, PipelineConfig};
//! use teddy_pipeline::pipeline::teddy_dag;
//! use teddy_pipeline::storage::PgStoreFactory;
//!
//! let config = PipelineConfig::from_env()?;
//! let stores = Arc::new(PgStoreFactory::new(ConnectionResolver::from_config(&config)?));
//! let dag = teddy_dag(&config, TodoCollector::from_config(&config)?, stores)?;
//!
//! let run = dag.run().await?;
//! println!("{}", run.state);
//! ```

pub mod dag;
pub mod tasks;

pub use dag::{
    Dag, DagError, DagRun, DefaultArgs, RunState, Task, TaskContext, TaskInstance, TaskState,
};
pub use tasks::{
    completed_records, teddy_dag, FetchTask, StoreSummary, StoreTask, FETCH_TASK_ID,
    STORE_TASK_ID, TEDDY_DAG_DESCRIPTION, TEDDY_DAG_ID,
};
