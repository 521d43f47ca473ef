//! Persistence contract for workflows and runs.
//!
//! The engine only talks to storage through [`RunStore`]. Every call is
//! treated as fallible I/O and wrapped in [`with_retry`], which retries
//! transient failures with exponential backoff before giving up.
//!
//! [`InMemoryRunStore`] implements the contract in process. It backs the
//! server binary and the tests; durable storage plugs in behind the same
//! trait.

use crate::definition::{Workflow, WorkflowSummary};
use crate::error::PersistenceError;
use crate::execution::{RunStatus, StepResult, WorkflowRun};
use crate::graph::WorkflowGraph;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;
use weaver_core::{WorkflowId, WorkflowRunId};

/// Storage used by the run engine.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Loads the current graph of a workflow.
    async fn load_graph(&self, workflow_id: WorkflowId) -> Result<WorkflowGraph, PersistenceError>;

    /// Creates a run in `Pending`.
    async fn create_run(
        &self,
        workflow_id: WorkflowId,
        input: JsonValue,
    ) -> Result<WorkflowRun, PersistenceError>;

    /// Appends a step to a run's log.
    async fn append_step_result(
        &self,
        run_id: WorkflowRunId,
        step: StepResult,
    ) -> Result<(), PersistenceError>;

    /// Moves a run to a new status.
    async fn set_run_status(
        &self,
        run_id: WorkflowRunId,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Result<(), PersistenceError>;

    /// Runs of a workflow, newest first.
    async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowRun>, PersistenceError>;

    /// The current snapshot of a run.
    async fn get_run(&self, run_id: WorkflowRunId) -> Result<WorkflowRun, PersistenceError>;
}

/// Bounded exponential backoff for run store calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Values below one are raised to one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    fn retries(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Runs `call`, retrying transient failures according to `policy`.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient error.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, PersistenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PersistenceError>>,
{
    let retries = policy.retries();
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retries => {
                let backoff = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "retrying run store call"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Default)]
struct Inner {
    workflows: HashMap<WorkflowId, Workflow>,
    runs: HashMap<WorkflowRunId, WorkflowRun>,
}

/// In-process run store.
#[derive(Default)]
pub struct InMemoryRunStore {
    inner: RwLock<Inner>,
}

impl InMemoryRunStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a workflow.
    pub async fn save_workflow(&self, workflow: Workflow) {
        self.inner.write().await.workflows.insert(workflow.id, workflow);
    }

    pub async fn get_workflow(&self, workflow_id: WorkflowId) -> Result<Workflow, PersistenceError> {
        self.inner
            .read()
            .await
            .workflows
            .get(&workflow_id)
            .cloned()
            .ok_or(PersistenceError::WorkflowNotFound { workflow_id })
    }

    /// Summaries of all workflows, most recently updated first.
    pub async fn list_workflows(&self) -> Vec<WorkflowSummary> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<_> = inner.workflows.values().map(WorkflowSummary::from).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn load_graph(&self, workflow_id: WorkflowId) -> Result<WorkflowGraph, PersistenceError> {
        self.get_workflow(workflow_id).await.map(|w| w.graph)
    }

    async fn create_run(
        &self,
        workflow_id: WorkflowId,
        input: JsonValue,
    ) -> Result<WorkflowRun, PersistenceError> {
        let mut inner = self.inner.write().await;
        if !inner.workflows.contains_key(&workflow_id) {
            return Err(PersistenceError::WorkflowNotFound { workflow_id });
        }
        let run = WorkflowRun::new(workflow_id, input);
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn append_step_result(
        &self,
        run_id: WorkflowRunId,
        step: StepResult,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write().await;
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or(PersistenceError::RunNotFound { run_id })?;
        if run.status.is_terminal() {
            return Err(PersistenceError::RunImmutable { run_id });
        }
        run.steps.push(step);
        Ok(())
    }

    async fn set_run_status(
        &self,
        run_id: WorkflowRunId,
        status: RunStatus,
        completed_at: Option<DateTime<Utc>>,
        error: Option<String>,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write().await;
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or(PersistenceError::RunNotFound { run_id })?;
        if run.status == status {
            return Ok(());
        }
        if !run.transition(status, error) {
            return Err(PersistenceError::RunImmutable { run_id });
        }
        if let Some(completed_at) = completed_at {
            run.completed_at = Some(completed_at);
        }
        Ok(())
    }

    async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowRun>, PersistenceError> {
        let inner = self.inner.read().await;
        if !inner.workflows.contains_key(&workflow_id) {
            return Err(PersistenceError::WorkflowNotFound { workflow_id });
        }
        let mut runs: Vec<_> = inner
            .runs
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(runs)
    }

    async fn get_run(&self, run_id: WorkflowRunId) -> Result<WorkflowRun, PersistenceError> {
        self.inner
            .read()
            .await
            .runs
            .get(&run_id)
            .cloned()
            .ok_or(PersistenceError::RunNotFound { run_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::trigger;
    use crate::node::NodeId;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn zero_retries_still_retries_once() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.retries(), 1);
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(PersistenceError::Unavailable {
                        reason: "reset".to_string(),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(PersistenceError::Unavailable {
                    reason: "down".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let run_id = WorkflowRunId::new();
        let result: Result<(), _> = with_retry(&fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(PersistenceError::RunNotFound { run_id }) }
        })
        .await;
        assert_eq!(result, Err(PersistenceError::RunNotFound { run_id }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_lifecycle_in_memory() {
        let store = InMemoryRunStore::new();
        let mut graph = WorkflowGraph::new();
        graph.add_node(trigger("start")).expect("add");
        let workflow = Workflow::new("test", graph);
        let workflow_id = workflow.id;
        store.save_workflow(workflow).await;

        let run = store.create_run(workflow_id, json!({ "x": 1 })).await.expect("create");
        assert_eq!(run.status, RunStatus::Pending);

        store
            .set_run_status(run.id, RunStatus::Running, None, None)
            .await
            .expect("running");
        store
            .append_step_result(
                run.id,
                StepResult::succeeded(NodeId::from("start"), Utc::now(), json!({ "x": 1 })),
            )
            .await
            .expect("append");
        store
            .set_run_status(run.id, RunStatus::Succeeded, Some(Utc::now()), None)
            .await
            .expect("succeeded");

        let snapshot = store.get_run(run.id).await.expect("get");
        assert_eq!(snapshot.status, RunStatus::Succeeded);
        assert_eq!(snapshot.steps.len(), 1);
        assert!(snapshot.completed_at.is_some());

        let err = store
            .append_step_result(run.id, StepResult::failed(NodeId::from("x"), Utc::now(), "late"))
            .await
            .unwrap_err();
        assert_eq!(err, PersistenceError::RunImmutable { run_id: run.id });

        let runs = store.list_runs(workflow_id).await.expect("list");
        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let store = InMemoryRunStore::new();
        let workflow_id = WorkflowId::new();
        assert_eq!(
            store.load_graph(workflow_id).await.unwrap_err(),
            PersistenceError::WorkflowNotFound { workflow_id }
        );
    }
}
