//! Error types for the workflow crate.
//!
//! Errors are plain enums layered with rootcause:
//! - `GraphError`: graph construction (unknown or duplicate node ids)
//! - `EvaluationError`: condition predicates and transforms
//! - `PlanningError`: a plan was requested for a graph that cannot run
//! - `ConnectorError`: an action connector failed
//! - `NodeExecutionError`: why a single step failed
//! - `PersistenceError`: the run store failed
//! - `OrchestratorError`: starting, cancelling or inspecting runs
//!
//! Validation problems are not errors in this sense; they are reported as a
//! list of `ValidationError` values (see `validation`).

use crate::edge::Edge;
use crate::node::{ActionSubtype, NodeId};
use crate::validation::ValidationError;
use weaver_core::{WorkflowId, WorkflowRunId};
use std::fmt;
use std::time::Duration;

/// Errors from graph construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An edge referenced a node id that is not in the graph.
    UnknownNode { node_id: NodeId },
    /// A node with this id already exists.
    DuplicateNode { node_id: NodeId },
    /// No such edge exists.
    EdgeNotFound { edge: Edge },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode { node_id } => write!(f, "unknown node: {node_id}"),
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::EdgeNotFound { edge } => write!(f, "edge not found: {edge}"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from evaluating predicates and transforms against run context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// A path that must resolve did not.
    PathNotFound { path: String },
    /// The operator cannot compare these value types.
    TypeMismatch {
        path: String,
        operator: String,
        actual: &'static str,
        expected: &'static str,
    },
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathNotFound { path } => write!(f, "path not found in run context: {path}"),
            Self::TypeMismatch {
                path,
                operator,
                actual,
                expected,
            } => write!(
                f,
                "cannot apply '{operator}' to {path} ({actual}) and {expected}"
            ),
        }
    }
}

impl std::error::Error for EvaluationError {}

/// A plan was requested for a graph that cannot be run.
///
/// Reaching this is a caller bug: graphs are validated before planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    /// The graph has no trigger node.
    NoTrigger,
    /// Edges with unknown endpoints are still present.
    UnresolvedEdges { count: usize },
    /// Topological ordering could not consume these nodes.
    CycleDetected { unscheduled: Vec<NodeId> },
}

impl fmt::Display for PlanningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTrigger => write!(f, "cannot plan a graph without a trigger"),
            Self::UnresolvedEdges { count } => {
                write!(f, "cannot plan a graph with {count} unresolved edge(s)")
            }
            Self::CycleDetected { unscheduled } => {
                write!(f, "cannot plan a cyclic graph; unscheduled nodes: ")?;
                write_ids(f, unscheduled)
            }
        }
    }
}

impl std::error::Error for PlanningError {}

/// Errors reported by action connectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// The node configuration cannot be executed as given.
    InvalidConfig { reason: String },
    /// The remote service could not be reached.
    ConnectionFailed { reason: String },
    /// The remote service answered with a failure status.
    RequestFailed { status: u16, body: String },
    /// A database statement was rejected.
    QueryFailed { reason: String },
    /// Local I/O failed.
    Io { reason: String },
    /// The connector does not handle this action.
    Unsupported { subtype: ActionSubtype },
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "invalid configuration: {reason}"),
            Self::ConnectionFailed { reason } => write!(f, "connection failed: {reason}"),
            Self::RequestFailed { status, body } => {
                write!(f, "request failed with status {status}: {body}")
            }
            Self::QueryFailed { reason } => write!(f, "query failed: {reason}"),
            Self::Io { reason } => write!(f, "i/o error: {reason}"),
            Self::Unsupported { subtype } => write!(f, "connector does not support {subtype}"),
        }
    }
}

impl std::error::Error for ConnectorError {}

/// Why a single node failed. Recorded on the step and fails the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeExecutionError {
    /// No connector is registered for this action subtype.
    ConnectorUnavailable { subtype: ActionSubtype },
    /// The connector returned an error.
    Connector(ConnectorError),
    /// The node did not finish within the node timeout.
    Timeout { after: Duration },
    /// A predicate or transform could not be evaluated.
    Evaluation(EvaluationError),
    /// Required configuration is missing, so the node cannot run.
    MissingConfig { fields: Vec<&'static str> },
}

impl fmt::Display for NodeExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectorUnavailable { subtype } => {
                write!(f, "no connector registered for {subtype}")
            }
            Self::Connector(e) => write!(f, "connector error: {e}"),
            Self::Timeout { after } => write!(f, "timed out after {}ms", after.as_millis()),
            Self::Evaluation(e) => write!(f, "evaluation failed: {e}"),
            Self::MissingConfig { fields } => {
                write!(f, "missing required configuration: {}", fields.join(", "))
            }
        }
    }
}

impl std::error::Error for NodeExecutionError {}

impl From<ConnectorError> for NodeExecutionError {
    fn from(e: ConnectorError) -> Self {
        Self::Connector(e)
    }
}

impl From<EvaluationError> for NodeExecutionError {
    fn from(e: EvaluationError) -> Self {
        Self::Evaluation(e)
    }
}

/// Errors from the run store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    WorkflowNotFound { workflow_id: WorkflowId },
    RunNotFound { run_id: WorkflowRunId },
    /// The run is terminal and can no longer be changed.
    RunImmutable { run_id: WorkflowRunId },
    /// The store could not be reached or the write failed.
    Unavailable { reason: String },
}

impl PersistenceError {
    /// Returns true if repeating the call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowNotFound { workflow_id } => write!(f, "workflow not found: {workflow_id}"),
            Self::RunNotFound { run_id } => write!(f, "run not found: {run_id}"),
            Self::RunImmutable { run_id } => write!(f, "run {run_id} is already terminal"),
            Self::Unavailable { reason } => write!(f, "store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// Errors from the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// The graph has blocking validation errors; nothing was run.
    ValidationFailed { errors: Vec<ValidationError> },
    /// A plan could not be built for a graph that passed validation.
    Planning { details: String },
    /// The store failed while starting or inspecting a run.
    Persistence(PersistenceError),
    /// The requested trigger is not a trigger node of this graph.
    UnknownTrigger { node_id: NodeId },
    /// The run is not active in this orchestrator.
    RunNotActive { run_id: WorkflowRunId },
    /// The orchestrator is shutting down and accepts no new runs.
    ShuttingDown,
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed { errors } => {
                write!(f, "workflow failed validation with {} error(s)", errors.len())?;
                for error in errors {
                    write!(f, "; {error}")?;
                }
                Ok(())
            }
            Self::Planning { details } => write!(f, "planning error: {details}"),
            Self::Persistence(e) => write!(f, "persistence error: {e}"),
            Self::UnknownTrigger { node_id } => write!(f, "not a trigger node: {node_id}"),
            Self::RunNotActive { run_id } => write!(f, "run is not active: {run_id}"),
            Self::ShuttingDown => write!(f, "orchestrator is shutting down"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<PersistenceError> for OrchestratorError {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}

pub(crate) fn write_ids(f: &mut fmt::Formatter<'_>, ids: &[NodeId]) -> fmt::Result {
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{id}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_display() {
        let err = GraphError::UnknownNode {
            node_id: NodeId::from("ghost"),
        };
        assert_eq!(err.to_string(), "unknown node: ghost");
    }

    #[test]
    fn planning_error_lists_unscheduled_nodes() {
        let err = PlanningError::CycleDetected {
            unscheduled: vec![NodeId::from("a"), NodeId::from("b")],
        };
        assert!(err.to_string().ends_with("unscheduled nodes: a, b"));
    }

    #[test]
    fn node_execution_error_wraps_connector_error() {
        let err: NodeExecutionError = ConnectorError::RequestFailed {
            status: 503,
            body: "busy".to_string(),
        }
        .into();
        assert!(err.to_string().contains("status 503"));

        let err = NodeExecutionError::Timeout {
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "timed out after 1500ms");
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(
            PersistenceError::Unavailable {
                reason: "connection reset".to_string()
            }
            .is_transient()
        );
        assert!(
            !PersistenceError::RunNotFound {
                run_id: WorkflowRunId::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn validation_failure_display_includes_every_error() {
        let err = OrchestratorError::ValidationFailed {
            errors: vec![
                ValidationError::NoTrigger,
                ValidationError::SelfLoop {
                    node_id: NodeId::from("loop"),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 error(s)"));
        assert!(text.contains("loop"));
    }
}
