//! Database migration runner.
//!
//! Two mutually exclusive modes:
//!
//! - **Offline**: render the SQL for every migration as literal text. The
//!   connection descriptor only selects the dialect; nothing is opened.
//! - **Online**: open one dedicated connection, apply every pending migration
//!   inside a single transaction and commit once. A failure anywhere rolls the
//!   whole run back.

use std::fmt::Write as _;

use sqlx::{Connection, PgConnection};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, ConnectionDescriptor, Dialect};

use super::schema::{self, Migration};

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Connection parameters could not be resolved or are unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration statement failed; the transaction was rolled back.
    #[error("Migration {version} failed: {source}")]
    MigrationFailed {
        version: String,
        #[source]
        source: sqlx::Error,
    },

    /// `--from` named a version that does not exist.
    #[error("Unknown migration version: {0}")]
    UnknownVersion(String),
}

/// How the runner talks to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    /// Emit SQL text only.
    Offline,
    /// Apply through a live connection.
    Online,
}

impl std::fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationMode::Offline => write!(f, "offline"),
            MigrationMode::Online => write!(f, "online"),
        }
    }
}

/// What a migration run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Offline mode: the rendered script.
    Rendered(String),
    /// Online mode: the versions applied, oldest first.
    Applied(Vec<String>),
}

/// Record of an applied migration.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    /// Version key.
    pub version: String,
    /// Name of the migration.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

/// Migration runner for applying schema changes.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    migrations: &'static [Migration],
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRunner {
    /// Creates a runner over the crate's migrations.
    pub fn new() -> Self {
        Self {
            migrations: schema::MIGRATIONS,
        }
    }

    /// Creates a runner over an explicit migration list.
    pub fn with_migrations(migrations: &'static [Migration]) -> Self {
        Self { migrations }
    }

    /// Runs in the requested mode.
    pub async fn run(
        &self,
        mode: MigrationMode,
        descriptor: &ConnectionDescriptor,
        from: Option<&str>,
    ) -> Result<MigrationOutcome, MigrationError> {
        info!(%mode, url = %descriptor.redacted(), "Running migrations");
        match mode {
            MigrationMode::Offline => self.render_sql(descriptor, from).map(MigrationOutcome::Rendered),
            MigrationMode::Online => self.apply(descriptor).await.map(MigrationOutcome::Applied),
        }
    }

    /// Renders the migration script without touching the network.
    ///
    /// With `from`, migrations up to and including that version are skipped.
    pub fn render_sql(
        &self,
        descriptor: &ConnectionDescriptor,
        from: Option<&str>,
    ) -> Result<String, MigrationError> {
        let dialect = descriptor.dialect()?;
        let pending = self.after(from)?;

        let mut out = String::new();
        // Infallible: writing into a String.
        let _ = writeln!(out, "-- Running migrations offline for dialect {}", dialect);
        out.push_str("BEGIN;\n\n");
        push_statement(&mut out, schema::CREATE_MIGRATIONS_TABLE);

        for migration in pending {
            let _ = writeln!(out, "-- {} {}", migration.version, migration.name);
            for statement in migration.statements {
                push_statement(&mut out, statement);
            }
            let _ = writeln!(
                out,
                "INSERT INTO {} (version, name) VALUES ({}, {});\n",
                schema::tables::MIGRATIONS,
                quote_literal(dialect, migration.version),
                quote_literal(dialect, migration.name)
            );
        }

        out.push_str("COMMIT;\n");
        Ok(out)
    }

    /// Applies all pending migrations in one transaction.
    ///
    /// Returns the versions applied; empty when the schema is current.
    pub async fn apply(&self, descriptor: &ConnectionDescriptor) -> Result<Vec<String>, MigrationError> {
        descriptor.dialect()?;

        let mut conn = PgConnection::connect(&descriptor.to_url()).await?;
        let result = self.apply_on(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close migration connection");
        }

        match &result {
            Ok(applied) if applied.is_empty() => info!("Schema is up to date"),
            Ok(applied) => info!(count = applied.len(), versions = ?applied, "Migrations applied"),
            Err(e) => warn!(error = %e, "Migration run rolled back"),
        }
        result
    }

    /// Applies pending migrations over an open connection, in one transaction.
    ///
    /// The caller owns the connection and closes it.
    pub async fn apply_on(&self, conn: &mut PgConnection) -> Result<Vec<String>, MigrationError> {
        let mut tx = conn.begin().await?;

        sqlx::query(schema::CREATE_MIGRATIONS_TABLE)
            .execute(&mut *tx)
            .await?;

        let done: Vec<(String,)> =
            sqlx::query_as(&format!("SELECT version FROM {}", schema::tables::MIGRATIONS))
                .fetch_all(&mut *tx)
                .await?;
        let done: Vec<String> = done.into_iter().map(|(v,)| v).collect();

        let mut applied = Vec::new();
        for migration in self.migrations {
            if done.iter().any(|v| v == migration.version) {
                continue;
            }

            for statement in migration.statements {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|source| MigrationError::MigrationFailed {
                        version: migration.version.to_string(),
                        source,
                    })?;
            }

            sqlx::query(&format!(
                "INSERT INTO {} (version, name) VALUES ($1, $2)",
                schema::tables::MIGRATIONS
            ))
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await?;

            info!(version = migration.version, name = migration.name, "Applied migration");
            applied.push(migration.version.to_string());
        }

        tx.commit().await?;
        Ok(applied)
    }

    /// Returns a list of applied migrations.
    ///
    /// Read-only: an absent bookkeeping table means nothing was applied.
    pub async fn applied(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Vec<AppliedMigration>, MigrationError> {
        descriptor.dialect()?;

        let mut conn = PgConnection::connect(&descriptor.to_url()).await?;
        let result = self.applied_on(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close migration connection");
        }
        result
    }

    /// Lists applied migrations over an open connection without changing the schema.
    pub async fn applied_on(
        &self,
        conn: &mut PgConnection,
    ) -> Result<Vec<AppliedMigration>, MigrationError> {
        let table: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(schema::tables::MIGRATIONS)
            .fetch_one(&mut *conn)
            .await?;
        if table.is_none() {
            return Ok(Vec::new());
        }

        let applied = sqlx::query_as::<_, AppliedMigration>(&format!(
            "SELECT version, name, applied_at FROM {} ORDER BY version",
            schema::tables::MIGRATIONS
        ))
        .fetch_all(&mut *conn)
        .await?;
        Ok(applied)
    }

    /// Versions known to this runner, oldest first.
    pub fn versions(&self) -> Vec<&'static str> {
        self.migrations.iter().map(|m| m.version).collect()
    }

    fn after(&self, from: Option<&str>) -> Result<&'static [Migration], MigrationError> {
        let Some(from) = from else {
            return Ok(self.migrations);
        };
        let position = self
            .migrations
            .iter()
            .position(|m| m.version == from)
            .ok_or_else(|| MigrationError::UnknownVersion(from.to_string()))?;
        Ok(&self.migrations[position + 1..])
    }
}

fn push_statement(out: &mut String, statement: &str) {
    let trimmed = statement.trim().trim_end_matches(';');
    out.push_str(trimmed);
    out.push_str(";\n\n");
}

fn quote_literal(dialect: Dialect, value: &str) -> String {
    match dialect {
        Dialect::Postgres => format!("'{}'", value.replace('\'', "''")),
    }
}
