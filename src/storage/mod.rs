//! PostgreSQL persistent storage.
//!
//! # Overview
//!
//! - **Schema**: the `Teddy360` record, its table and the migration list
//! - **Migrations**: offline SQL rendering and online transactional apply
//! - **Database**: the `RecordStore` seam and its PostgreSQL implementation
//! - **Memory**: a map-backed store with identical batch semantics
//!
//! # Usage
//!
//! ```rust,ignore
//! use teddy_pipeline::config::ConnectionDescriptor;
//! use teddy_pipeline::storage::{MigrationMode, MigrationRunner, PgRecordStore, RecordStore};
//!
//! let descriptor = ConnectionDescriptor::from_url("postgresql://u:p@localhost:5432/teddy")?;
//!
//! // Create the schema
//! MigrationRunner::new().run(MigrationMode::Online, &descriptor, None).await?;
//!
//! // Upsert a batch
//! let store = PgRecordStore::new(descriptor);
//! store.merge_batch(&records).await?;
//! ```

pub mod database;
pub mod memory;
pub mod migrations;
pub mod schema;

// Re-export main types for convenience
pub use database::{DatabaseError, PgRecordStore, PgStoreFactory, RecordStore, RecordStoreFactory};
pub use memory::MemoryRecordStore;
pub use migrations::{
    AppliedMigration, MigrationError, MigrationMode, MigrationOutcome, MigrationRunner,
};
pub use schema::{Migration, Teddy360, MIGRATIONS};
