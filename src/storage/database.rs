//! Record stores for the `teddy_360` table.
//!
//! A store applies a batch of upserts atomically: either every record in the
//! batch is committed or none is. The PostgreSQL store opens one dedicated
//! session per batch and releases it on every exit path.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ConnectionDescriptor, ConnectionResolver};

use super::schema::{self, Teddy360};

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection to the database failed.
    #[error("Connection to {url} failed: {source}")]
    ConnectionFailed {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// One upsert in a batch failed; the batch was rolled back.
    #[error("Upsert of record {id} failed: {source}")]
    UpsertFailed {
        id: i32,
        #[source]
        source: sqlx::Error,
    },

    /// A store refused a record.
    #[error("Record {id} rejected: {reason}")]
    Rejected { id: i32, reason: String },

    /// Connection parameters could not be resolved.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Destination for completed records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Upserts `records` in order inside one unit of work.
    ///
    /// Returns the number of records written. On error nothing is committed.
    async fn merge_batch(&self, records: &[Teddy360]) -> Result<usize, DatabaseError>;

    /// Where the records go, safe to log.
    fn target(&self) -> String;
}

/// Produces a store for a connection id at task runtime.
pub trait RecordStoreFactory: Send + Sync {
    /// Resolves `conn_id` and returns a store bound to it.
    fn store_for(&self, conn_id: &str) -> Result<Arc<dyn RecordStore>, DatabaseError>;
}

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    descriptor: ConnectionDescriptor,
}

impl PgRecordStore {
    /// Creates a store bound to `descriptor`. No connection is opened yet.
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self { descriptor }
    }

    /// The connection this store writes to.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn open_session(&self) -> Result<PgConnection, DatabaseError> {
        self.descriptor.dialect()?;
        PgConnection::connect(&self.descriptor.to_url())
            .await
            .map_err(|source| DatabaseError::ConnectionFailed {
                url: self.descriptor.redacted(),
                source,
            })
    }

    /// Reads every stored record ordered by id.
    pub async fn fetch_all(&self) -> Result<Vec<Teddy360>, DatabaseError> {
        let mut conn = self.open_session().await?;
        let rows = sqlx::query_as::<_, Teddy360>(schema::SELECT_TEDDY_360)
            .fetch_all(&mut conn)
            .await;
        close_session(conn).await;
        Ok(rows?)
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn merge_batch(&self, records: &[Teddy360]) -> Result<usize, DatabaseError> {
        let mut conn = self.open_session().await?;
        let result = merge_in_transaction(&mut conn, records).await;
        close_session(conn).await;

        if let Ok(count) = &result {
            info!(count, url = %self.descriptor.redacted(), "Committed upsert batch");
        }
        result
    }

    fn target(&self) -> String {
        self.descriptor.redacted()
    }
}

async fn merge_in_transaction(
    conn: &mut PgConnection,
    records: &[Teddy360],
) -> Result<usize, DatabaseError> {
    let mut tx = conn.begin().await?;

    for record in records {
        sqlx::query(schema::UPSERT_TEDDY_360)
            .bind(record.id)
            .bind(record.user_id)
            .bind(&record.title)
            .bind(record.completed)
            .execute(&mut *tx)
            .await
            .map_err(|source| DatabaseError::UpsertFailed {
                id: record.id,
                source,
            })?;
        debug!(id = record.id, "Merged record");
    }

    tx.commit().await?;
    Ok(records.len())
}

async fn close_session(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close database session");
    }
}

/// Resolves connection ids to fresh [`PgRecordStore`]s.
#[derive(Debug, Clone)]
pub struct PgStoreFactory {
    resolver: ConnectionResolver,
}

impl PgStoreFactory {
    /// Creates a factory over `resolver`.
    pub fn new(resolver: ConnectionResolver) -> Self {
        Self { resolver }
    }
}

impl RecordStoreFactory for PgStoreFactory {
    fn store_for(&self, conn_id: &str) -> Result<Arc<dyn RecordStore>, DatabaseError> {
        let (descriptor, source) = self.resolver.resolve(conn_id)?;
        info!(conn_id, %source, url = %descriptor.redacted(), "Opening record store");
        Ok(Arc::new(PgRecordStore::new(descriptor)))
    }
}
