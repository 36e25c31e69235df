//! teddy_pipeline: fetch completed todos from a JSON API and upsert them
//! into PostgreSQL.
//!
//! The library provides the `teddy_dag` task graph (`fetch_data >>
//! store_data`), connection resolution, the schema migration runner and
//! Prometheus instrumentation.

pub mod cli;
pub mod collectors;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod storage;

// Re-export commonly used error types
pub use collectors::{CollectorError, StructuralError};
pub use config::ConfigError;
pub use error::TaskError;
pub use pipeline::DagError;
pub use storage::{DatabaseError, MigrationError};
