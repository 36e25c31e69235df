//! Error types for pipeline tasks.
//!
//! Every task failure falls into one of four classes:
//! - Transport: the fetch could not obtain a successful response
//! - Structural: the payload does not have the item shape
//! - Persistence: the database rejected or lost the batch
//! - Configuration: connection parameters are missing or invalid
//!
//! None of them is swallowed; each one fails its task instance and, through
//! it, the run.

use thiserror::Error;

use crate::collectors::{CollectorError, StructuralError};
use crate::config::ConfigError;
use crate::storage::DatabaseError;

/// Errors a task can return.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Transport error: {0}")]
    Transport(#[from] CollectorError),

    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Persistence error: {0}")]
    Persistence(#[source] DatabaseError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The upstream task left no result for this one to consume.
    #[error("No result available from upstream task '{0}'")]
    MissingInput(String),
}

impl From<DatabaseError> for TaskError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Config(config) => TaskError::Configuration(config),
            other => TaskError::Persistence(other),
        }
    }
}

impl TaskError {
    /// Short class name, used in logs and run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Transport(_) => "transport",
            TaskError::Structural(_) | TaskError::MissingInput(_) => "structural",
            TaskError::Persistence(_) => "persistence",
            TaskError::Configuration(_) => "configuration",
        }
    }
}
