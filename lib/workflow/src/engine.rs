//! The run engine.
//!
//! The [`Orchestrator`] turns a stored workflow into a running task:
//! 1. Load the graph and validate it. Blocking errors are returned as a
//!    whole and no run is created.
//! 2. Build the execution plan and create the run record.
//! 3. Spawn one task per run that walks the plan in order, decides
//!    reachability, executes each reachable node and records every step,
//!    skipped ones included.
//! 4. Finalize the run as succeeded, failed or cancelled.
//!
//! Runs share nothing but the store, the connector registry and the event
//! fanout. Cancellation is cooperative and observed between nodes. Store
//! calls are retried with backoff; a call that still fails ends the run.

use crate::connector::ConnectorRegistry;
use crate::context::RunContext;
use crate::error::{NodeExecutionError, OrchestratorError, PersistenceError};
use crate::execution::{ExecutionEvent, RunStatus, SkipReason, StepResult, WorkflowRun};
use crate::fanout::EventFanout;
use crate::node::{LogicNodeConfig, Node, NodeConfig, NodeId};
use crate::plan::{ExecutionPlan, plan};
use crate::reachability::{Reachability, ReachableSet};
use crate::store::{RetryPolicy, RunStore, with_retry};
use crate::validation::{ValidationError, validate};
use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use weaver_core::{Result, WorkflowId, WorkflowRunId};

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a single action node.
    pub node_timeout: Duration,
    /// Backoff for run store calls.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

struct Shared {
    store: Arc<dyn RunStore>,
    connectors: ConnectorRegistry,
    fanout: EventFanout,
    config: EngineConfig,
    active: Mutex<HashMap<WorkflowRunId, CancellationToken>>,
    shutdown: CancellationToken,
}

/// Starts, tracks and cancels workflow runs.
///
/// Cheap to clone; clones share the same set of active runs.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

/// A started run.
pub struct RunHandle {
    /// The run as created, in `Pending`.
    pub run: WorkflowRun,
    /// Non-blocking validation findings for the graph that was started.
    pub warnings: Vec<ValidationError>,
    task: JoinHandle<RunStatus>,
}

impl RunHandle {
    #[must_use]
    pub fn run_id(&self) -> WorkflowRunId {
        self.run.id
    }

    /// Waits for the run task and returns the final status.
    ///
    /// A task that panicked counts as failed.
    pub async fn wait(self) -> RunStatus {
        self.task.await.unwrap_or(RunStatus::Failed)
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn RunStore>,
        connectors: ConnectorRegistry,
        fanout: EventFanout,
        config: EngineConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                connectors,
                fanout,
                config,
                active: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn fanout(&self) -> &EventFanout {
        &self.shared.fanout
    }

    /// Validates, plans and starts a run of `workflow_id`.
    ///
    /// With `trigger` set, only that trigger fires and the other triggers
    /// are skipped as not triggered. Otherwise every trigger fires.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` with every validation error if any is blocking
    /// - `UnknownTrigger` if `trigger` is not a trigger node of the graph
    /// - `Persistence` if the graph cannot be loaded or the run created
    /// - `ShuttingDown` once [`Orchestrator::shutdown`] was called
    #[instrument(skip(self, input), fields(workflow_id = %workflow_id))]
    pub async fn start_run(
        &self,
        workflow_id: WorkflowId,
        input: JsonValue,
        trigger: Option<NodeId>,
    ) -> Result<RunHandle, OrchestratorError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown.into());
        }

        let store = self.shared.store.as_ref();
        let retry = &self.shared.config.retry;
        let graph = with_retry(retry, "load_graph", || store.load_graph(workflow_id))
            .await
            .map_err(OrchestratorError::from)?;

        let validated = validate(&graph).map_err(|errors| {
            debug!(errors = errors.len(), "workflow failed validation");
            OrchestratorError::ValidationFailed { errors }
        })?;
        let warnings = validated.warnings().to_vec();
        for warning in &warnings {
            warn!(warning = %warning, "starting run despite validation warning");
        }

        let plan = plan(&validated).map_err(|report| OrchestratorError::Planning {
            details: report.to_string(),
        })?;

        let fired = match trigger {
            Some(node_id) => {
                let is_trigger = graph.get_node(&node_id).is_some_and(Node::is_trigger);
                if !is_trigger {
                    return Err(OrchestratorError::UnknownTrigger { node_id }.into());
                }
                vec![node_id]
            }
            None => plan.triggers().to_vec(),
        };

        let run = with_retry(retry, "create_run", || {
            store.create_run(workflow_id, input.clone())
        })
        .await
        .map_err(OrchestratorError::from)?;

        let cancel = self.shared.shutdown.child_token();
        self.shared.active.lock().await.insert(run.id, cancel.clone());

        info!(run_id = %run.id, steps = plan.len(), "starting run");
        let driver = RunDriver {
            shared: Arc::clone(&self.shared),
            run_id: run.id,
            workflow_id,
            input: run.input.clone(),
            plan,
            fired,
            cancel,
            seq: AtomicU64::new(0),
        };
        let task = tokio::spawn(driver.drive());

        Ok(RunHandle {
            run,
            warnings,
            task,
        })
    }

    /// Requests cooperative cancellation of an active run.
    ///
    /// The node in flight finishes; every later node is skipped.
    ///
    /// # Errors
    ///
    /// Returns `RunNotActive` if the run is unknown or already finished.
    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: WorkflowRunId) -> Result<(), OrchestratorError> {
        let active = self.shared.active.lock().await;
        let token = active
            .get(&run_id)
            .ok_or(OrchestratorError::RunNotActive { run_id })?;
        token.cancel();
        info!(run_id = %run_id, "cancellation requested");
        Ok(())
    }

    /// Current snapshot of a run from the store.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the run does not exist or the store fails.
    pub async fn get_run(&self, run_id: WorkflowRunId) -> Result<WorkflowRun, OrchestratorError> {
        let store = self.shared.store.as_ref();
        let run = with_retry(&self.shared.config.retry, "get_run", || store.get_run(run_id))
            .await
            .map_err(OrchestratorError::from)?;
        Ok(run)
    }

    /// Runs of a workflow, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the workflow does not exist or the store fails.
    pub async fn list_runs(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<WorkflowRun>, OrchestratorError> {
        let store = self.shared.store.as_ref();
        let runs = with_retry(&self.shared.config.retry, "list_runs", || {
            store.list_runs(workflow_id)
        })
        .await
        .map_err(OrchestratorError::from)?;
        Ok(runs)
    }

    pub async fn is_active(&self, run_id: WorkflowRunId) -> bool {
        self.shared.active.lock().await.contains_key(&run_id)
    }

    pub async fn active_runs(&self) -> usize {
        self.shared.active.lock().await.len()
    }

    /// Refuses new runs and cancels every active one.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let active = self.shared.active.lock().await.len();
        info!(active, "orchestrator shutting down");
    }
}

/// Walks one run's plan. Owned by the run's task.
struct RunDriver {
    shared: Arc<Shared>,
    run_id: WorkflowRunId,
    workflow_id: WorkflowId,
    input: JsonValue,
    plan: ExecutionPlan,
    fired: Vec<NodeId>,
    cancel: CancellationToken,
    seq: AtomicU64,
}

impl RunDriver {
    #[instrument(skip(self), fields(run_id = %self.run_id, workflow_id = %self.workflow_id))]
    async fn drive(self) -> RunStatus {
        let status = match self.execute_plan().await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "run store failed, failing run");
                let message = format!("run store failure: {e}");
                if let Err(e) = self.set_status(RunStatus::Failed, Some(message)).await {
                    error!(error = %e, "could not record run failure");
                }
                RunStatus::Failed
            }
        };
        self.shared.active.lock().await.remove(&self.run_id);
        info!(status = %status, "run finished");
        status
    }

    async fn execute_plan(&self) -> std::result::Result<RunStatus, PersistenceError> {
        self.set_status(RunStatus::Running, None).await?;

        let mut ctx = RunContext::new(self.input.clone());
        let mut reachable = ReachableSet::new(self.fired.iter().cloned());
        let mut failure: Option<String> = None;
        let mut cancelled = false;

        for step in self.plan.steps() {
            let node_id = step.node.id.clone();
            if !cancelled && failure.is_none() && self.cancel.is_cancelled() {
                info!(node_id = %node_id, "run cancelled before node");
                cancelled = true;
            }

            let record = if cancelled {
                StepResult::skipped(node_id, SkipReason::RunCancelled)
            } else if failure.is_some() {
                StepResult::skipped(node_id, SkipReason::RunFailed)
            } else {
                match reachable.status(step) {
                    Reachability::Skip(reason) => {
                        debug!(node_id = %node_id, reason = %reason, "skipping node");
                        reachable.mark_skipped(step, reason);
                        StepResult::skipped(node_id, reason)
                    }
                    Reachability::Reachable => {
                        let started_at = Utc::now();
                        match self.execute_node(&step.node, &mut ctx).await {
                            Ok((output, outcome)) => {
                                ctx.record_output(&node_id, output.clone());
                                reachable.mark_succeeded(step, outcome);
                                StepResult::succeeded(node_id, started_at, output)
                            }
                            Err(e) => {
                                warn!(node_id = %node_id, error = %e, "node failed");
                                failure = Some(format!("node {node_id} failed: {e}"));
                                StepResult::failed(node_id, started_at, e.to_string())
                            }
                        }
                    }
                }
            };
            self.record_step(record).await?;
        }

        let (status, error) = if cancelled {
            (RunStatus::Cancelled, None)
        } else if let Some(error) = failure {
            (RunStatus::Failed, Some(error))
        } else {
            (RunStatus::Succeeded, None)
        };
        self.set_status(status, error).await?;
        Ok(status)
    }

    /// Runs one node. Returns its output and, for conditions, the branch
    /// taken.
    async fn execute_node(
        &self,
        node: &Node,
        ctx: &mut RunContext,
    ) -> std::result::Result<(JsonValue, Option<bool>), NodeExecutionError> {
        debug!(node_id = %node.id, subtype = %node.subtype(), "executing node");
        if !node.is_trigger() {
            let fields = node.config.missing_fields();
            if !fields.is_empty() {
                return Err(NodeExecutionError::MissingConfig { fields });
            }
        }

        match &node.config {
            NodeConfig::Trigger(_) => Ok((self.input.clone(), None)),
            NodeConfig::Action(action) => {
                let subtype = action.subtype();
                let connector = self
                    .shared
                    .connectors
                    .get(subtype)
                    .ok_or(NodeExecutionError::ConnectorUnavailable { subtype })?;
                let after = self.shared.config.node_timeout;
                let output = tokio::time::timeout(after, connector.execute(action, ctx))
                    .await
                    .map_err(|_| NodeExecutionError::Timeout { after })??;
                Ok((output, None))
            }
            NodeConfig::Logic(LogicNodeConfig::Condition { predicate }) => {
                let predicate = predicate.as_ref().ok_or(NodeExecutionError::MissingConfig {
                    fields: vec!["predicate"],
                })?;
                let result = predicate.evaluate(ctx)?;
                Ok((json!({ "result": result }), Some(result)))
            }
            NodeConfig::Logic(LogicNodeConfig::Transform { output, transform }) => {
                let transform = transform.as_ref().ok_or(NodeExecutionError::MissingConfig {
                    fields: vec!["transform"],
                })?;
                let value = transform.apply(ctx)?;
                ctx.insert(output.clone(), value.clone());
                Ok((value, None))
            }
            NodeConfig::Logic(LogicNodeConfig::Delay { duration_ms }) => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                Ok((json!({ "delayed_ms": duration_ms }), None))
            }
        }
    }

    async fn record_step(&self, step: StepResult) -> std::result::Result<(), PersistenceError> {
        let store = self.shared.store.as_ref();
        let run_id = self.run_id;
        with_retry(&self.shared.config.retry, "append_step_result", || {
            store.append_step_result(run_id, step.clone())
        })
        .await?;

        self.shared.fanout.publish(&ExecutionEvent::StepCompleted {
            run_id,
            workflow_id: self.workflow_id,
            seq: self.next_seq(),
            step,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn set_status(
        &self,
        status: RunStatus,
        error: Option<String>,
    ) -> std::result::Result<(), PersistenceError> {
        let store = self.shared.store.as_ref();
        let run_id = self.run_id;
        let completed_at = status.is_terminal().then(Utc::now);
        with_retry(&self.shared.config.retry, "set_run_status", || {
            store.set_run_status(run_id, status, completed_at, error.clone())
        })
        .await?;

        self.shared.fanout.publish(&ExecutionEvent::RunStatusChanged {
            run_id,
            workflow_id: self.workflow_id,
            seq: self.next_seq(),
            status,
            error,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }
}
