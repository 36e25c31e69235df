//! CLI command definitions for the teddy pipeline.
//!
//! `run` executes the DAG once, `migrate` creates or renders the schema,
//! `migrate-status` lists applied migrations and `dag` prints the graph.

use crate::collectors::TodoCollector;
use crate::config::{ConnectionResolver, PipelineConfig};
use crate::metrics::{init_metrics, write_metrics_file};
use crate::pipeline::{teddy_dag, DagRun, STORE_TASK_ID};
use crate::storage::{
    MemoryRecordStore, MigrationMode, MigrationOutcome, MigrationRunner, PgStoreFactory,
    RecordStoreFactory,
};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Fetch completed todos from a JSON API and upsert them into PostgreSQL.
#[derive(Parser)]
#[command(name = "teddy")]
#[command(about = "Fetch completed todos from a JSON API and upsert them into PostgreSQL")]
#[command(version)]
#[command(
    long_about = "teddy runs the teddy_dag pipeline: fetch_data downloads the todo list, store_data keeps the completed items and upserts them into teddy_360.\n\nConnection settings come from PIPELINE_CONN_<ID>, the PIPELINE_CONNECTIONS_FILE registry, or DB_USER/DB_PASSWORD/HOST/DB_PORT/DB_NAME.\n\nExample usage:\n  teddy migrate\n  teddy run --metrics-file ./teddy.prom"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the DAG once: fetch_data >> store_data.
    Run(RunArgs),

    /// Create the schema, or print the SQL with --sql.
    Migrate(MigrateArgs),

    /// List migrations recorded in the database.
    #[command(name = "migrate-status")]
    MigrateStatus(StatusArgs),

    /// Print the DAG structure.
    Dag(DagArgs),
}

/// Arguments for `teddy run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Store into an in-memory table instead of PostgreSQL.
    #[arg(long)]
    pub dry_run: bool,

    /// Override the fetch URL.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Override the connection id used by store_data.
    #[arg(long)]
    pub conn_id: Option<String>,

    /// Override the pause between attempts, in seconds.
    #[arg(long)]
    pub retry_delay_secs: Option<u64>,

    /// Write Prometheus metrics to this file after the run.
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// Output the run record as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `teddy migrate`.
#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Print the SQL script instead of applying it.
    #[arg(long)]
    pub sql: bool,

    /// With --sql, skip migrations up to and including this version.
    #[arg(long, requires = "sql")]
    pub from: Option<String>,

    /// Connection id to migrate.
    #[arg(long)]
    pub conn_id: Option<String>,
}

/// Arguments for `teddy migrate-status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Connection id to inspect.
    #[arg(long)]
    pub conn_id: Option<String>,

    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `teddy dag`.
#[derive(Parser, Debug)]
pub struct DagArgs {
    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args).await,
        Commands::Migrate(args) => run_migrate_command(args).await,
        Commands::MigrateStatus(args) => run_status_command(args).await,
        Commands::Dag(args) => run_dag_command(args),
    }
}

fn load_config(conn_id: Option<String>) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(conn_id) = conn_id {
        config = config.with_conn_id(conn_id);
    }
    config.validate()?;
    Ok(config)
}

// ============================================================================
// Run
// ============================================================================

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(endpoint) = args.endpoint {
        config = config.with_endpoint_url(endpoint);
    }
    if let Some(conn_id) = args.conn_id {
        config = config.with_conn_id(conn_id);
    }
    if let Some(secs) = args.retry_delay_secs {
        config = config.with_retry_delay(Duration::from_secs(secs));
    }
    config.validate()?;

    if args.metrics_file.is_some() {
        init_metrics().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {}", e))?;
    }

    let memory = MemoryRecordStore::new();
    let stores: Arc<dyn RecordStoreFactory> = if args.dry_run {
        info!("Dry run: rows are kept in memory");
        Arc::new(memory.clone())
    } else {
        Arc::new(PgStoreFactory::new(ConnectionResolver::from_config(&config)?))
    };

    let collector = TodoCollector::from_config(&config)?;
    let dag = teddy_dag(&config, collector, stores)?;
    let run = dag.run().await?;

    if let Some(path) = &args.metrics_file {
        write_metrics_file(path)?;
        info!(path = %path.display(), "Metrics written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&RunOutput::from_run(&run))?);
    } else {
        print_run(&run);
        if args.dry_run {
            println!("  in-memory rows: {}", memory.len());
        }
    }

    if !run.succeeded() {
        return Err(anyhow::anyhow!("DAG run {} failed", run.run_id));
    }
    Ok(())
}

/// JSON form of a run: the run record plus the store summary.
#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    #[serde(flatten)]
    run: &'a DagRun,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_summary: Option<&'a serde_json::Value>,
}

impl<'a> RunOutput<'a> {
    fn from_run(run: &'a DagRun) -> Self {
        Self {
            run,
            store_summary: run.result(STORE_TASK_ID),
        }
    }
}

fn print_run(run: &DagRun) {
    println!("{} run {} ({}): {}", run.dag_id, run.run_id, run.logical_date, run.state);
    for task in &run.task_instances {
        match &task.error {
            Some(error) => println!(
                "  {:<12} {:<16} tries={} {}ms  {}",
                task.task_id, task.state.to_string(), task.try_number, task.duration_ms, error
            ),
            None => println!(
                "  {:<12} {:<16} tries={} {}ms",
                task.task_id, task.state.to_string(), task.try_number, task.duration_ms
            ),
        }
    }
    if let Some(summary) = run.result(STORE_TASK_ID) {
        println!("  store summary: {}", summary);
    }
}

// ============================================================================
// Migrations
// ============================================================================

async fn run_migrate_command(args: MigrateArgs) -> anyhow::Result<()> {
    let config = load_config(args.conn_id)?;
    let resolver = ConnectionResolver::from_config(&config)?;
    let descriptor = resolver.descriptor(&config.conn_id)?;

    let mode = if args.sql {
        MigrationMode::Offline
    } else {
        MigrationMode::Online
    };

    match MigrationRunner::new()
        .run(mode, &descriptor, args.from.as_deref())
        .await?
    {
        MigrationOutcome::Rendered(sql) => print!("{}", sql),
        MigrationOutcome::Applied(versions) if versions.is_empty() => {
            println!("Schema is up to date");
        }
        MigrationOutcome::Applied(versions) => {
            println!("Applied migrations: {}", versions.join(", "));
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusEntry {
    version: String,
    name: String,
    applied_at: Option<String>,
}

async fn run_status_command(args: StatusArgs) -> anyhow::Result<()> {
    let config = load_config(args.conn_id)?;
    let resolver = ConnectionResolver::from_config(&config)?;
    let descriptor = resolver.descriptor(&config.conn_id)?;

    let runner = MigrationRunner::new();
    let applied = runner.applied(&descriptor).await?;

    let entries: Vec<StatusEntry> = runner
        .versions()
        .into_iter()
        .map(|version| {
            let record = applied.iter().find(|a| a.version == version);
            StatusEntry {
                version: version.to_string(),
                name: record.map(|a| a.name.clone()).unwrap_or_default(),
                applied_at: record.map(|a| a.applied_at.to_rfc3339()),
            }
        })
        .collect();

    let unknown: Vec<&str> = applied
        .iter()
        .filter(|a| !runner.versions().contains(&a.version.as_str()))
        .map(|a| a.version.as_str())
        .collect();
    if !unknown.is_empty() {
        warn!(versions = ?unknown, "Database has migrations this binary does not know");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Migrations for {}:", descriptor.redacted());
    for entry in &entries {
        match &entry.applied_at {
            Some(at) => println!("  [x] {} {} ({})", entry.version, entry.name, at),
            None => println!("  [ ] {} (pending)", entry.version),
        }
    }
    Ok(())
}

// ============================================================================
// DAG
// ============================================================================

#[derive(Debug, Serialize)]
struct DagOutput {
    dag_id: String,
    description: String,
    owner: String,
    start_date: String,
    retries: u32,
    retry_delay_secs: u64,
    catchup: bool,
    tasks: Vec<String>,
    edges: Vec<(String, String)>,
}

fn run_dag_command(args: DagArgs) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let dag = teddy_dag(
        &config,
        TodoCollector::from_config(&config)?,
        Arc::new(MemoryRecordStore::new()),
    )?;

    if !args.json {
        print!("{}", dag.describe());
        return Ok(());
    }

    let defaults = dag.default_args();
    let output = DagOutput {
        dag_id: dag.dag_id().to_string(),
        description: dag.description().to_string(),
        owner: defaults.owner.clone(),
        start_date: defaults.start_date.to_string(),
        retries: defaults.retries,
        retry_delay_secs: defaults.retry_delay.as_secs(),
        catchup: dag.catchup(),
        tasks: dag.task_ids().into_iter().map(String::from).collect(),
        edges: dag.edges().to_vec(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::pipeline::{Dag, DefaultArgs, Task, TaskContext};
    use clap::CommandFactory;
    use serde_json::{json, Value};

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "teddy",
            "run",
            "--dry-run",
            "--metrics-file",
            "/tmp/teddy.prom",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert!(args.dry_run);
                assert!(args.json);
                assert_eq!(args.metrics_file, Some(PathBuf::from("/tmp/teddy.prom")));
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.log_level, "info");
    }

    struct FixedSummary;

    #[async_trait::async_trait]
    impl Task for FixedSummary {
        fn task_id(&self) -> &str {
            STORE_TASK_ID
        }

        async fn execute(&self, _ctx: &TaskContext<'_>) -> Result<Value, TaskError> {
            Ok(json!({ "received": 2, "completed": 1, "dropped": 1, "upserted": 1 }))
        }
    }

    #[tokio::test]
    async fn test_run_json_includes_store_summary() {
        let mut dag = Dag::new("teddy_dag", DefaultArgs::default());
        dag.add_task(Arc::new(FixedSummary)).unwrap();
        let run = dag.run().await.unwrap();

        let output = serde_json::to_value(RunOutput::from_run(&run)).unwrap();
        assert_eq!(output["state"], "succeeded");
        assert_eq!(output["store_summary"]["upserted"], 1);
        assert_eq!(output["task_instances"][0]["task_id"], "store_data");
    }

    #[test]
    fn test_parse_migrate_sql_from() {
        let cli = Cli::try_parse_from(["teddy", "migrate", "--sql", "--from", "0001"]).unwrap();
        match cli.command {
            Commands::Migrate(args) => {
                assert!(args.sql);
                assert_eq!(args.from.as_deref(), Some("0001"));
            }
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_from_requires_sql() {
        assert!(Cli::try_parse_from(["teddy", "migrate", "--from", "0001"]).is_err());
    }

    #[test]
    fn test_parse_status_and_global_log_level() {
        let cli = Cli::try_parse_from(["teddy", "migrate-status", "--log-level", "debug"]).unwrap();
        assert!(matches!(cli.command, Commands::MigrateStatus(_)));
        assert_eq!(cli.log_level, "debug");
    }
}
