//! Task graph wiring and the run state machine.
//!
//! A [`Dag`] holds tasks and `upstream >> downstream` edges. [`Dag::run`]
//! executes the tasks one at a time in dependency order:
//!
//! ```text
//! pending -> running -> succeeded
//!                    -> failed            (after retries + 1 attempts)
//! pending -> upstream_failed              (an upstream task did not succeed)
//! ```
//!
//! The run succeeds only if every task succeeded. Results travel between
//! tasks through the run's result map (`TaskContext::xcom_pull`).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::settings::{DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};
use crate::error::TaskError;
use crate::metrics::MetricsCollector;

/// Errors in the graph definition itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("Task '{0}' is already defined")]
    DuplicateTask(String),

    #[error("Task '{0}' is not defined")]
    UnknownTask(String),

    #[error("Cycle detected between tasks: {0}")]
    Cycle(String),
}

/// State of one task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    UpstreamFailed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::UpstreamFailed => write!(f, "upstream_failed"),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Succeeded => write!(f, "succeeded"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Settings applied to every task of a DAG.
#[derive(Debug, Clone)]
pub struct DefaultArgs {
    pub owner: String,
    pub start_date: NaiveDate,
    /// Retries after the first failed attempt.
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for DefaultArgs {
    fn default() -> Self {
        Self {
            owner: "airflow".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Run-scoped view handed to a task attempt.
#[derive(Debug)]
pub struct TaskContext<'a> {
    pub run_id: Uuid,
    pub dag_id: &'a str,
    pub logical_date: DateTime<Utc>,
    /// 1-based attempt number.
    pub try_number: u32,
    results: &'a HashMap<String, Value>,
}

impl<'a> TaskContext<'a> {
    /// Result value of an upstream task that already succeeded in this run.
    pub fn xcom_pull(&self, task_id: &str) -> Option<&'a Value> {
        self.results.get(task_id)
    }
}

/// A unit of work in a DAG.
#[async_trait]
pub trait Task: Send + Sync {
    /// Identifier, unique within its DAG.
    fn task_id(&self) -> &str;

    /// Runs one attempt. The returned value is made available downstream.
    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<Value, TaskError>;
}

/// Outcome of one task within a run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInstance {
    pub task_id: String,
    pub state: TaskState,
    /// Attempts made; 0 if the task never started.
    pub try_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub duration_ms: u64,
}

impl TaskInstance {
    fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            state: TaskState::Pending,
            try_number: 0,
            error: None,
            error_kind: None,
            duration_ms: 0,
        }
    }
}

/// Record of one DAG execution.
#[derive(Debug, Clone, Serialize)]
pub struct DagRun {
    pub run_id: Uuid,
    pub dag_id: String,
    pub logical_date: DateTime<Utc>,
    pub state: RunState,
    pub task_instances: Vec<TaskInstance>,
    #[serde(skip)]
    results: HashMap<String, Value>,
}

impl DagRun {
    /// Instance record for `task_id`.
    pub fn task(&self, task_id: &str) -> Option<&TaskInstance> {
        self.task_instances.iter().find(|t| t.task_id == task_id)
    }

    /// Result value produced by `task_id`, if it succeeded.
    pub fn result(&self, task_id: &str) -> Option<&Value> {
        self.results.get(task_id)
    }

    /// Whether every task succeeded.
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }
}

/// A directed acyclic graph of tasks.
pub struct Dag {
    dag_id: String,
    description: String,
    default_args: DefaultArgs,
    catchup: bool,
    tasks: Vec<Arc<dyn Task>>,
    edges: Vec<(String, String)>,
    metrics: MetricsCollector,
}

impl std::fmt::Debug for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dag")
            .field("dag_id", &self.dag_id)
            .field("tasks", &self.task_ids())
            .field("edges", &self.edges)
            .finish()
    }
}

impl Dag {
    /// Creates an empty DAG.
    pub fn new(dag_id: impl Into<String>, default_args: DefaultArgs) -> Self {
        Self {
            dag_id: dag_id.into(),
            description: String::new(),
            default_args,
            catchup: false,
            tasks: Vec::new(),
            edges: Vec::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Sets the human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets whether missed schedule intervals would be backfilled.
    pub fn with_catchup(mut self, catchup: bool) -> Self {
        self.catchup = catchup;
        self
    }

    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_args(&self) -> &DefaultArgs {
        &self.default_args
    }

    pub fn catchup(&self) -> bool {
        self.catchup
    }

    /// Adds a task. Ids must be unique.
    pub fn add_task(&mut self, task: Arc<dyn Task>) -> Result<(), DagError> {
        if self.index_of(task.task_id()).is_some() {
            return Err(DagError::DuplicateTask(task.task_id().to_string()));
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Declares `upstream >> downstream`.
    pub fn set_downstream(&mut self, upstream: &str, downstream: &str) -> Result<(), DagError> {
        for id in [upstream, downstream] {
            if self.index_of(id).is_none() {
                return Err(DagError::UnknownTask(id.to_string()));
            }
        }
        let edge = (upstream.to_string(), downstream.to_string());
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        Ok(())
    }

    /// Task ids in insertion order.
    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.task_id()).collect()
    }

    /// Declared edges as `(upstream, downstream)`.
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Direct upstream ids of `task_id`.
    pub fn upstream_of(&self, task_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, down)| down == task_id)
            .map(|(up, _)| up.as_str())
            .collect()
    }

    /// Task ids in execution order. Ties keep insertion order.
    pub fn topological_order(&self) -> Result<Vec<&str>, DagError> {
        let mut indegree: HashMap<&str, usize> =
            self.tasks.iter().map(|t| (t.task_id(), 0)).collect();
        for (_, down) in &self.edges {
            if let Some(d) = indegree.get_mut(down.as_str()) {
                *d += 1;
            }
        }

        let mut ready: VecDeque<&str> = self
            .task_ids()
            .into_iter()
            .filter(|id| indegree.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for (up, down) in &self.edges {
                if up != id {
                    continue;
                }
                if let Some(d) = indegree.get_mut(down.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(down.as_str());
                    }
                }
            }
        }

        if order.len() != self.tasks.len() {
            let stuck: Vec<&str> = self
                .task_ids()
                .into_iter()
                .filter(|id| !order.contains(id))
                .collect();
            return Err(DagError::Cycle(stuck.join(", ")));
        }
        Ok(order)
    }

    /// Checks the graph is acyclic.
    pub fn validate(&self) -> Result<(), DagError> {
        self.topological_order().map(|_| ())
    }

    /// Renders the graph for display.
    pub fn describe(&self) -> String {
        let mut out = format!("{}: {}\n", self.dag_id, self.description);
        out.push_str(&format!(
            "  owner={} start_date={} retries={} retry_delay={}s catchup={}\n",
            self.default_args.owner,
            self.default_args.start_date,
            self.default_args.retries,
            self.default_args.retry_delay.as_secs(),
            self.catchup
        ));
        for id in self.task_ids() {
            let upstream = self.upstream_of(id);
            if upstream.is_empty() {
                out.push_str(&format!("  {}\n", id));
            } else {
                out.push_str(&format!("  {} (after {})\n", id, upstream.join(", ")));
            }
        }
        out
    }

    /// Executes one run with the current time as logical date.
    pub async fn run(&self) -> Result<DagRun, DagError> {
        self.run_at(Utc::now()).await
    }

    /// Executes one run for `logical_date`.
    ///
    /// Only graph errors are returned as `Err`; task failures are recorded in
    /// the returned run.
    pub async fn run_at(&self, logical_date: DateTime<Utc>) -> Result<DagRun, DagError> {
        let order = self.topological_order()?;
        let run_id = Uuid::new_v4();
        info!(dag_id = %self.dag_id, %run_id, %logical_date, "Starting DAG run");

        let mut states: HashMap<&str, TaskState> =
            order.iter().map(|id| (*id, TaskState::Pending)).collect();
        let mut results: HashMap<String, Value> = HashMap::new();
        let mut instances = Vec::with_capacity(order.len());

        for id in order {
            let blocked: Vec<&str> = self
                .upstream_of(id)
                .into_iter()
                .filter(|up| states.get(up) != Some(&TaskState::Succeeded))
                .collect();

            if !blocked.is_empty() {
                warn!(dag_id = %self.dag_id, task_id = id, upstream = ?blocked, "Skipping task: upstream did not succeed");
                let mut instance = TaskInstance::new(id);
                instance.state = TaskState::UpstreamFailed;
                states.insert(id, TaskState::UpstreamFailed);
                instances.push(instance);
                continue;
            }

            let Some(index) = self.index_of(id) else {
                return Err(DagError::UnknownTask(id.to_string()));
            };
            let task = Arc::clone(&self.tasks[index]);

            let (instance, value) = self.run_task(task.as_ref(), run_id, logical_date, &results).await;
            states.insert(id, instance.state);
            if let Some(value) = value {
                results.insert(id.to_string(), value);
            }
            instances.push(instance);
        }

        let state = if instances.iter().all(|t| t.state == TaskState::Succeeded) {
            RunState::Succeeded
        } else {
            RunState::Failed
        };

        self.metrics.record_run(&self.dag_id, &state.to_string());
        match state {
            RunState::Succeeded => info!(dag_id = %self.dag_id, %run_id, "DAG run succeeded"),
            RunState::Failed => error!(dag_id = %self.dag_id, %run_id, "DAG run failed"),
        }

        Ok(DagRun {
            run_id,
            dag_id: self.dag_id.clone(),
            logical_date,
            state,
            task_instances: instances,
            results,
        })
    }

    async fn run_task(
        &self,
        task: &dyn Task,
        run_id: Uuid,
        logical_date: DateTime<Utc>,
        results: &HashMap<String, Value>,
    ) -> (TaskInstance, Option<Value>) {
        let task_id = task.task_id();
        let max_attempts = self.default_args.retries.saturating_add(1);
        let mut instance = TaskInstance::new(task_id);
        let started = Instant::now();

        for try_number in 1..=max_attempts {
            instance.state = TaskState::Running;
            instance.try_number = try_number;
            info!(dag_id = %self.dag_id, task_id, try_number, max_attempts, "Running task");

            let ctx = TaskContext {
                run_id,
                dag_id: &self.dag_id,
                logical_date,
                try_number,
                results,
            };

            let attempt_start = Instant::now();
            let outcome = task.execute(&ctx).await;
            let attempt_secs = attempt_start.elapsed().as_secs_f64();
            self.metrics
                .record_task_attempt(task_id, outcome.is_ok(), attempt_secs);

            match outcome {
                Ok(value) => {
                    instance.state = TaskState::Succeeded;
                    instance.error = None;
                    instance.error_kind = None;
                    instance.duration_ms = started.elapsed().as_millis() as u64;
                    info!(task_id, try_number, duration_secs = attempt_secs, "Task succeeded");
                    return (instance, Some(value));
                }
                Err(e) => {
                    instance.error = Some(e.to_string());
                    instance.error_kind = Some(e.kind());
                    if try_number < max_attempts {
                        warn!(
                            task_id,
                            try_number,
                            kind = e.kind(),
                            error = %e,
                            retry_in_secs = self.default_args.retry_delay.as_secs(),
                            "Task attempt failed, will retry"
                        );
                        tokio::time::sleep(self.default_args.retry_delay).await;
                    } else {
                        error!(task_id, try_number, kind = e.kind(), error = %e, "Task failed");
                    }
                }
            }
        }

        instance.state = TaskState::Failed;
        instance.duration_ms = started.elapsed().as_millis() as u64;
        (instance, None)
    }

    fn index_of(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.task_id() == task_id)
    }
}
