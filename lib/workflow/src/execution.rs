//! Run records and the events a run emits.
//!
//! A run moves `Pending -> Running -> {Succeeded, Failed, Cancelled}` and is
//! immutable once terminal. Its step log is append-only with one entry per
//! planned node, skipped nodes included.

use crate::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use weaver_core::{WorkflowId, WorkflowRunId};

/// The overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns true if a run may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The outcome of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Skipped,
    Succeeded,
    Failed,
}

/// Why a node was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Every path to the node went through a condition's unchosen port.
    BranchNotTaken,
    /// No path from a fired trigger reaches the node.
    Unreachable,
    /// A trigger that did not start this run, or a node only it feeds.
    NotTriggered,
    /// An earlier node failed.
    RunFailed,
    /// The run was cancelled before the node started.
    RunCancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BranchNotTaken => write!(f, "branch not taken"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::NotTriggered => write!(f, "not triggered"),
            Self::RunFailed => write!(f, "run failed"),
            Self::RunCancelled => write!(f, "run cancelled"),
        }
    }
}

/// Immutable record of one node's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub node_id: NodeId,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl StepResult {
    #[must_use]
    pub fn succeeded(node_id: NodeId, started_at: DateTime<Utc>, output: JsonValue) -> Self {
        Self {
            node_id,
            status: StepStatus::Succeeded,
            started_at,
            completed_at: Utc::now(),
            output: Some(output),
            error: None,
            skip_reason: None,
        }
    }

    #[must_use]
    pub fn failed(node_id: NodeId, started_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            node_id,
            status: StepStatus::Failed,
            started_at,
            completed_at: Utc::now(),
            output: None,
            error: Some(error.into()),
            skip_reason: None,
        }
    }

    #[must_use]
    pub fn skipped(node_id: NodeId, reason: SkipReason) -> Self {
        let now = Utc::now();
        Self {
            node_id,
            status: StepStatus::Skipped,
            started_at: now,
            completed_at: now,
            output: None,
            error: None,
            skip_reason: Some(reason),
        }
    }
}

/// A record of a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: WorkflowRunId,
    pub workflow_id: WorkflowId,
    pub status: RunStatus,
    /// Input handed to the triggers.
    pub input: JsonValue,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepResult>,
    /// Run-level failure cause, if any.
    pub error: Option<String>,
}

impl WorkflowRun {
    /// Creates a new run in `Pending`.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, input: JsonValue) -> Self {
        Self {
            id: WorkflowRunId::new(),
            workflow_id,
            status: RunStatus::Pending,
            input,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            steps: Vec::new(),
            error: None,
        }
    }

    /// Applies a status change, stamping start and completion times.
    ///
    /// Returns false and leaves the run untouched if the transition is not
    /// allowed.
    pub fn transition(&mut self, status: RunStatus, error: Option<String>) -> bool {
        if !self.status.can_transition_to(status) {
            return false;
        }
        let now = Utc::now();
        if status == RunStatus::Running {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.completed_at = Some(now);
            self.started_at.get_or_insert(now);
        }
        self.status = status;
        self.error = error;
        true
    }

    #[must_use]
    pub fn step(&self, node_id: &NodeId) -> Option<&StepResult> {
        self.steps.iter().find(|s| &s.node_id == node_id)
    }

    /// Sequence number of the last event this snapshot already reflects.
    ///
    /// A run publishes `Running` as seq 0, step `i` as seq `i + 1` and its
    /// terminal status last. `None` while the run is still pending.
    #[must_use]
    pub fn last_seq(&self) -> Option<u64> {
        let steps = self.steps.len() as u64;
        match self.status {
            RunStatus::Pending => None,
            RunStatus::Running => Some(steps),
            _ => Some(steps + 1),
        }
    }

    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some(end - start)
    }
}

/// Events emitted while a run executes.
///
/// `seq` increases by one per event within a run, so an observer that
/// resynchronizes from a snapshot can drop events it has already seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStatusChanged {
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        seq: u64,
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        seq: u64,
        step: StepResult,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    #[must_use]
    pub fn run_id(&self) -> WorkflowRunId {
        match self {
            Self::RunStatusChanged { run_id, .. } | Self::StepCompleted { run_id, .. } => *run_id,
        }
    }

    #[must_use]
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            Self::RunStatusChanged { workflow_id, .. }
            | Self::StepCompleted { workflow_id, .. } => *workflow_id,
        }
    }

    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::RunStatusChanged { seq, .. } | Self::StepCompleted { seq, .. } => *seq,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RunStatusChanged { timestamp, .. } | Self::StepCompleted { timestamp, .. } => {
                *timestamp
            }
        }
    }
}
