//! External data source collectors.
//!
//! - Todos: the JSON todo list the pipeline ingests
//! - Types: the typed item record and payload validation

pub mod todos;
pub mod types;

pub use todos::TodoCollector;
pub use types::*;
