//! Compiles a validated graph into an execution plan.
//!
//! The plan is a topological order produced by Kahn's algorithm, where the
//! smallest ready node id always goes next. A join is scheduled only after
//! every inbound edge has been consumed. Branches are not evaluated here:
//! each condition node keeps both candidate successor sets and the engine
//! picks one at run time.
//!
//! The plan owns copies of the nodes it schedules, so a run can hold its
//! plan without borrowing the graph.

use crate::edge::{Edge, Port};
use crate::error::PlanningError;
use crate::node::{Node, NodeId};
use crate::validation::ValidatedGraph;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use weaver_core::Result;

/// The successors of a planned node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Successors {
    /// Every successor follows once this node succeeds.
    Unconditional { targets: Vec<NodeId> },
    /// A condition node: one set follows, chosen at run time.
    Branch {
        on_true: Vec<NodeId>,
        on_false: Vec<NodeId>,
    },
}

impl Successors {
    /// Targets that follow from the given condition outcome.
    ///
    /// Unconditional successors follow regardless of outcome.
    #[must_use]
    pub fn for_outcome(&self, outcome: bool) -> &[NodeId] {
        match self {
            Self::Unconditional { targets } => targets,
            Self::Branch { on_true, .. } if outcome => on_true,
            Self::Branch { on_false, .. } => on_false,
        }
    }
}

/// One scheduled node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    pub node: Node,
    pub inbound: Vec<Edge>,
    pub outgoing: Vec<Edge>,
    pub successors: Successors,
}

impl PlannedStep {
    /// Outgoing edges that carry control for a condition outcome.
    ///
    /// Ports only matter on condition nodes; elsewhere every outgoing edge
    /// is active.
    pub fn active_edges(&self, outcome: Option<bool>) -> impl Iterator<Item = (&Edge, bool)> {
        let branching = self.node.config.is_condition();
        self.outgoing.iter().map(move |edge| {
            let active = match outcome {
                Some(taken) if branching => edge.source_port.branch() == taken,
                _ => true,
            };
            (edge, active)
        })
    }
}

/// Read-only execution plan for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    order: Vec<NodeId>,
    steps: HashMap<NodeId, PlannedStep>,
    triggers: Vec<NodeId>,
}

impl ExecutionPlan {
    /// Node ids in execution order.
    #[must_use]
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    #[must_use]
    pub fn step(&self, node_id: &NodeId) -> Option<&PlannedStep> {
        self.steps.get(node_id)
    }

    /// Steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &PlannedStep> {
        self.order.iter().filter_map(|id| self.steps.get(id))
    }

    /// Trigger node ids, ascending.
    #[must_use]
    pub fn triggers(&self) -> &[NodeId] {
        &self.triggers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Builds the execution plan for a validated graph.
///
/// # Errors
///
/// Returns a `PlanningError` report if the graph has no trigger, still has
/// unresolved edges, or cannot be fully ordered. Each of these means the
/// graph did not really pass validation.
pub fn plan(validated: &ValidatedGraph<'_>) -> Result<ExecutionPlan, PlanningError> {
    let graph = validated.graph();

    let triggers: Vec<NodeId> = graph.triggers().into_iter().map(|n| n.id.clone()).collect();
    if triggers.is_empty() {
        return Err(PlanningError::NoTrigger.into());
    }
    if !graph.unresolved_edges().is_empty() {
        return Err(PlanningError::UnresolvedEdges {
            count: graph.unresolved_edges().len(),
        }
        .into());
    }

    let mut in_degree: HashMap<&NodeId, usize> = graph.nodes().map(|n| (&n.id, 0)).collect();
    for edge in graph.edges() {
        if let Some(degree) = in_degree.get_mut(&edge.target) {
            *degree += 1;
        }
    }

    let mut ready: BTreeSet<&NodeId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(graph.node_count());

    while let Some(current) = ready.pop_first() {
        order.push(current.clone());
        for edge in graph.outgoing(current) {
            if let Some(degree) = in_degree.get_mut(&edge.target) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(&edge.target);
                }
            }
        }
    }

    if order.len() < graph.node_count() {
        let scheduled: BTreeSet<&NodeId> = order.iter().collect();
        let mut unscheduled: Vec<NodeId> = graph
            .nodes()
            .map(|n| &n.id)
            .filter(|id| !scheduled.contains(id))
            .cloned()
            .collect();
        unscheduled.sort();
        return Err(PlanningError::CycleDetected { unscheduled }.into());
    }

    let mut steps = HashMap::with_capacity(order.len());
    for node_id in &order {
        let Some(node) = graph.get_node(node_id) else {
            continue;
        };
        let outgoing: Vec<Edge> = graph.outgoing(node_id).into_iter().cloned().collect();
        let inbound: Vec<Edge> = graph.incoming(node_id).into_iter().cloned().collect();
        let successors = successors_of(node, &outgoing);
        steps.insert(
            node_id.clone(),
            PlannedStep {
                node: node.clone(),
                inbound,
                outgoing,
                successors,
            },
        );
    }

    debug!(nodes = order.len(), triggers = triggers.len(), "built execution plan");

    Ok(ExecutionPlan {
        order,
        steps,
        triggers,
    })
}

fn successors_of(node: &Node, outgoing: &[Edge]) -> Successors {
    if node.config.is_condition() {
        Successors::Branch {
            on_true: targets_where(outgoing, Port::branch),
            on_false: targets_where(outgoing, |port| !port.branch()),
        }
    } else {
        Successors::Unconditional {
            targets: targets_where(outgoing, |_| true),
        }
    }
}

fn targets_where(outgoing: &[Edge], keep: impl Fn(Port) -> bool) -> Vec<NodeId> {
    let set: BTreeSet<NodeId> = outgoing
        .iter()
        .filter(|e| keep(e.source_port))
        .map(|e| e.target.clone())
        .collect();
    set.into_iter().collect()
}
