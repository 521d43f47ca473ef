//! Structural and semantic checks run before a graph may be planned.
//!
//! Every check runs independently and every violation is reported, so an
//! author can fix all problems in one pass. Blocking errors stop a graph
//! from being planned; warnings are surfaced alongside a successful result.
//!
//! The only way to obtain a [`ValidatedGraph`] is through [`validate`], and
//! the planner only accepts a `ValidatedGraph`.

use crate::edge::Edge;
use crate::graph::WorkflowGraph;
use crate::node::{NodeId, NodeSubtype};
use petgraph::algo::tarjan_scc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;

/// Whether a validation error prevents the graph from running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Warning,
}

/// A problem found in a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// The graph has no trigger node.
    NoTrigger,
    /// An edge connects a node to itself.
    SelfLoop { node_id: NodeId },
    /// An edge references nodes that do not exist.
    UnknownReference { edge: Edge, missing: Vec<NodeId> },
    /// An edge leads into a trigger node.
    TriggerHasInbound { node_id: NodeId, edge: Edge },
    /// The listed nodes form a cycle, in edge order.
    Cycle { nodes: Vec<NodeId> },
    /// Required configuration fields are empty.
    DanglingConfig {
        node_id: NodeId,
        subtype: NodeSubtype,
        missing_fields: Vec<String>,
    },
    /// No path leads from any trigger to this node.
    UnreachableNode { node_id: NodeId },
}

impl ValidationError {
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::DanglingConfig { .. } | Self::UnreachableNode { .. } => Severity::Warning,
            _ => Severity::Blocking,
        }
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.severity() == Severity::Blocking
    }

    /// The wire name of this error's kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoTrigger => "no_trigger",
            Self::SelfLoop { .. } => "self_loop",
            Self::UnknownReference { .. } => "unknown_reference",
            Self::TriggerHasInbound { .. } => "trigger_has_inbound",
            Self::Cycle { .. } => "cycle",
            Self::DanglingConfig { .. } => "dangling_config",
            Self::UnreachableNode { .. } => "unreachable_node",
        }
    }

    /// The nodes this error points at.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        match self {
            Self::NoTrigger => Vec::new(),
            Self::SelfLoop { node_id }
            | Self::TriggerHasInbound { node_id, .. }
            | Self::DanglingConfig { node_id, .. }
            | Self::UnreachableNode { node_id } => vec![node_id.clone()],
            Self::UnknownReference { edge, .. } => vec![edge.source.clone(), edge.target.clone()],
            Self::Cycle { nodes } => nodes.clone(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTrigger => write!(f, "workflow has no trigger node"),
            Self::SelfLoop { node_id } => write!(f, "node {node_id} has an edge to itself"),
            Self::UnknownReference { edge, missing } => {
                write!(f, "edge {edge} references unknown node(s): ")?;
                crate::error::write_ids(f, missing)
            }
            Self::TriggerHasInbound { node_id, edge } => {
                write!(f, "trigger {node_id} has an inbound edge ({edge})")
            }
            Self::Cycle { nodes } => {
                write!(f, "cycle detected: ")?;
                for node in nodes {
                    write!(f, "{node} -> ")?;
                }
                match nodes.first() {
                    Some(first) => write!(f, "{first}"),
                    None => Ok(()),
                }
            }
            Self::DanglingConfig {
                node_id,
                subtype,
                missing_fields,
            } => write!(
                f,
                "{subtype} node {node_id} is missing required field(s): {}",
                missing_fields.join(", ")
            ),
            Self::UnreachableNode { node_id } => {
                write!(f, "node {node_id} is not reachable from any trigger")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// A graph that passed validation, with any warnings found.
///
/// Borrows the graph, so the graph cannot change while a plan is derived
/// from it.
#[derive(Debug, Clone)]
pub struct ValidatedGraph<'g> {
    graph: &'g WorkflowGraph,
    warnings: Vec<ValidationError>,
}

impl<'g> ValidatedGraph<'g> {
    #[must_use]
    pub fn graph(&self) -> &'g WorkflowGraph {
        self.graph
    }

    #[must_use]
    pub fn warnings(&self) -> &[ValidationError] {
        &self.warnings
    }

    /// Skips validation. Lets planner tests feed graphs validation would reject.
    #[cfg(test)]
    pub(crate) fn assume_valid(graph: &'g WorkflowGraph) -> Self {
        Self {
            graph,
            warnings: Vec::new(),
        }
    }
}

/// Validates a graph.
///
/// # Errors
///
/// Returns every error and warning found when at least one is blocking.
pub fn validate(graph: &WorkflowGraph) -> Result<ValidatedGraph<'_>, Vec<ValidationError>> {
    let errors = check(graph);
    if errors.iter().any(ValidationError::is_blocking) {
        return Err(errors);
    }
    Ok(ValidatedGraph {
        graph,
        warnings: errors,
    })
}

/// Runs every check and returns all findings, blocking and warning.
#[must_use]
pub fn check(graph: &WorkflowGraph) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if graph.triggers().is_empty() {
        errors.push(ValidationError::NoTrigger);
    }
    check_self_loops(graph, &mut errors);
    check_unknown_references(graph, &mut errors);
    check_trigger_inbound(graph, &mut errors);
    check_cycles(graph, &mut errors);
    check_dangling_config(graph, &mut errors);
    check_unreachable(graph, &mut errors);

    errors
}

fn all_edges(graph: &WorkflowGraph) -> impl Iterator<Item = &Edge> {
    graph.edges().chain(graph.unresolved_edges())
}

fn check_self_loops(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    let looped: BTreeSet<&NodeId> = all_edges(graph)
        .filter(|e| e.is_self_loop())
        .map(|e| &e.source)
        .collect();
    errors.extend(looped.into_iter().map(|node_id| ValidationError::SelfLoop {
        node_id: node_id.clone(),
    }));
}

fn check_unknown_references(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    for edge in graph.unresolved_edges() {
        let mut missing: Vec<NodeId> = [&edge.source, &edge.target]
            .into_iter()
            .filter(|id| !graph.contains_node(id))
            .cloned()
            .collect();
        missing.dedup();
        errors.push(ValidationError::UnknownReference {
            edge: edge.clone(),
            missing,
        });
    }
}

fn check_trigger_inbound(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    for trigger in graph.triggers() {
        for edge in graph.incoming(&trigger.id) {
            errors.push(ValidationError::TriggerHasInbound {
                node_id: trigger.id.clone(),
                edge: edge.clone(),
            });
        }
    }
}

/// Reports at least one cycle through every node that lies on a cycle.
///
/// Strongly connected components of two or more nodes are exactly the
/// nodes on cycles (single-node loops are reported as `SelfLoop`). Within a
/// component, the smallest uncovered node is walked back to itself along a
/// shortest path until every member appears in some reported cycle.
fn check_cycles(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    let inner = graph.inner();
    let mut components: Vec<BTreeSet<NodeId>> = tarjan_scc(inner)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .map(|scc| {
            scc.into_iter()
                .filter_map(|index| inner.node_weight(index))
                .map(|node| node.id.clone())
                .collect()
        })
        .collect();
    components.sort();

    for component in components {
        let mut uncovered = component.clone();
        while let Some(start) = uncovered.pop_first() {
            let Some(cycle) = shortest_cycle(graph, &component, &start) else {
                continue;
            };
            for node in &cycle {
                uncovered.remove(node);
            }
            errors.push(ValidationError::Cycle { nodes: cycle });
        }
    }
}

fn shortest_cycle(
    graph: &WorkflowGraph,
    component: &BTreeSet<NodeId>,
    start: &NodeId,
) -> Option<Vec<NodeId>> {
    let successors = |id: &NodeId| -> BTreeSet<NodeId> {
        graph
            .outgoing(id)
            .into_iter()
            .map(|e| e.target.clone())
            .filter(|t| component.contains(t))
            .collect()
    };

    let mut parent: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut queue = VecDeque::from([start.clone()]);
    while let Some(current) = queue.pop_front() {
        for next in successors(&current) {
            if &next == start {
                let mut path = vec![current.clone()];
                let mut cursor = current;
                while let Some(prev) = parent.get(&cursor) {
                    path.push(prev.clone());
                    cursor = prev.clone();
                }
                path.reverse();
                return Some(path);
            }
            if !parent.contains_key(&next) && next != *start {
                parent.insert(next.clone(), current.clone());
                queue.push_back(next);
            }
        }
    }
    None
}

fn check_dangling_config(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    let mut nodes: Vec<_> = graph.nodes().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    for node in nodes {
        let missing = node.config.missing_fields();
        if !missing.is_empty() {
            errors.push(ValidationError::DanglingConfig {
                node_id: node.id.clone(),
                subtype: node.subtype(),
                missing_fields: missing.into_iter().map(str::to_string).collect(),
            });
        }
    }
}

fn check_unreachable(graph: &WorkflowGraph, errors: &mut Vec<ValidationError>) {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = graph.triggers().into_iter().map(|n| n.id.clone()).collect();
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        queue.extend(graph.outgoing(&current).into_iter().map(|e| e.target.clone()));
    }

    let mut unreachable: Vec<_> = graph
        .nodes()
        .filter(|n| !n.is_trigger() && !seen.contains(&n.id))
        .map(|n| n.id.clone())
        .collect();
    unreachable.sort();
    errors.extend(
        unreachable
            .into_iter()
            .map(|node_id| ValidationError::UnreachableNode { node_id }),
    );
}
