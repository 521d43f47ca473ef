//! Workflow engine for weaver.
//!
//! This crate provides the core of the automation service:
//!
//! - **Graph Model**: directed graphs using petgraph with typed trigger,
//!   action and logic nodes and port-tagged edges
//! - **Validation**: every structural problem of a graph reported at once
//! - **Planning**: a deterministic topological execution plan
//! - **Run Engine**: the [`Orchestrator`], which executes plans step by step
//!   with branch selection, timeouts, cancellation and persistence retries
//! - **Event Fanout**: live delivery of run events to observers

pub mod condition;
pub mod connector;
pub mod context;
pub mod definition;
pub mod edge;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod execution;
pub mod fanout;
pub mod graph;
pub mod node;
pub mod plan;
pub mod reachability;
pub mod store;
pub mod validation;

pub use condition::{CompareOp, Predicate};
pub use connector::{ActionConnector, ConnectorRegistry, MockConnector};
pub use context::{RunContext, TransformOp};
pub use definition::{Workflow, WorkflowMetadata, WorkflowSummary};
pub use edge::{Edge, Port};
pub use engine::{EngineConfig, Orchestrator, RunHandle};
pub use envelope::Envelope;
pub use error::{
    ConnectorError, EvaluationError, GraphError, NodeExecutionError, OrchestratorError,
    PersistenceError, PlanningError,
};
pub use execution::{ExecutionEvent, RunStatus, SkipReason, StepResult, StepStatus, WorkflowRun};
pub use fanout::{ClientMessage, EventFanout, ObserverSession, SessionEvents, SubscriptionScope};
pub use graph::WorkflowGraph;
pub use node::{
    ActionNodeConfig, ActionSubtype, FileOperationKind, LogicNodeConfig, Node, NodeConfig, NodeId,
    NodeKind, NodeSubtype, TriggerNodeConfig,
};
pub use plan::{ExecutionPlan, PlannedStep, Successors, plan};
pub use store::{InMemoryRunStore, RetryPolicy, RunStore};
pub use validation::{Severity, ValidatedGraph, ValidationError, check, validate};
