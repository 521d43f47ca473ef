//! Workflow graph implementation using petgraph.
//!
//! The graph is a `StableDiGraph` so that removing a node never shifts the
//! indices of the others. Node ids map to petgraph indices through
//! `node_index_map`.
//!
//! Construction is strict: an edge can only be added between existing
//! nodes. Loading is lenient: a stored graph may carry edges whose
//! endpoints no longer exist, and those are kept aside as unresolved edges so
//! that validation can report them instead of silently dropping them.

use crate::edge::{Edge, Port};
use crate::error::GraphError;
use crate::node::{Node, NodeId};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A workflow graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphRepr", into = "GraphRepr")]
pub struct WorkflowGraph {
    graph: StableDiGraph<Node, Edge>,
    node_index_map: HashMap<NodeId, NodeIndex>,
    unresolved_edges: Vec<Edge>,
}

impl WorkflowGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNode` if a node with the same id exists.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.node_index_map.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
        let node_id = node.id.clone();
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        Ok(())
    }

    /// Removes a node together with every edge touching it.
    pub fn remove_node(&mut self, node_id: &NodeId) -> Option<Node> {
        let index = self.node_index_map.remove(node_id)?;
        self.graph.remove_node(index)
    }

    #[must_use]
    pub fn get_node(&self, node_id: &NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    #[must_use]
    pub fn contains_node(&self, node_id: &NodeId) -> bool {
        self.node_index_map.contains_key(node_id)
    }

    /// Adds an edge. Adding an edge that already exists is a no-op.
    ///
    /// Self-loops are accepted here and rejected by validation.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNode` if either endpoint is not in the graph.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        let source = self.index_of(&edge.source)?;
        let target = self.index_of(&edge.target)?;

        let exists = self
            .graph
            .edges_connecting(source, target)
            .any(|e| e.weight().source_port == edge.source_port);
        if !exists {
            self.graph.add_edge(source, target, edge);
        }
        Ok(())
    }

    /// Removes an edge, resolved or not.
    ///
    /// # Errors
    ///
    /// Returns `EdgeNotFound` if the graph has no such edge.
    pub fn remove_edge(&mut self, edge: &Edge) -> Result<Edge, GraphError> {
        if let Some(pos) = self.unresolved_edges.iter().position(|e| e == edge) {
            return Ok(self.unresolved_edges.remove(pos));
        }

        let not_found = || GraphError::EdgeNotFound { edge: edge.clone() };
        let (Some(&source), Some(&target)) = (
            self.node_index_map.get(&edge.source),
            self.node_index_map.get(&edge.target),
        ) else {
            return Err(not_found());
        };

        let edge_index = self
            .graph
            .edges_connecting(source, target)
            .find(|e| e.weight().source_port == edge.source_port)
            .map(|e| e.id())
            .ok_or_else(not_found)?;

        self.graph.remove_edge(edge_index).ok_or_else(not_found)
    }

    /// Returns all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns all edges between existing nodes.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edge_weights()
    }

    /// Edges loaded from storage whose source or target does not exist.
    #[must_use]
    pub fn unresolved_edges(&self) -> &[Edge] {
        &self.unresolved_edges
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges of a node, grouped by source port.
    #[must_use]
    pub fn outgoing_by_port(&self, node_id: &NodeId) -> BTreeMap<Port, Vec<&Edge>> {
        let mut grouped: BTreeMap<Port, Vec<&Edge>> = BTreeMap::new();
        for edge in self.edges_directed(node_id, Direction::Outgoing) {
            grouped.entry(edge.source_port).or_default().push(edge);
        }
        grouped
    }

    /// Outgoing edges of a node.
    #[must_use]
    pub fn outgoing(&self, node_id: &NodeId) -> Vec<&Edge> {
        self.edges_directed(node_id, Direction::Outgoing)
    }

    /// Incoming edges of a node.
    #[must_use]
    pub fn incoming(&self, node_id: &NodeId) -> Vec<&Edge> {
        self.edges_directed(node_id, Direction::Incoming)
    }

    /// Trigger nodes, ordered by id.
    #[must_use]
    pub fn triggers(&self) -> Vec<&Node> {
        let mut triggers: Vec<_> = self.nodes().filter(|n| n.is_trigger()).collect();
        triggers.sort_by(|a, b| a.id.cmp(&b.id));
        triggers
    }

    /// The underlying petgraph, for graph algorithms.
    pub(crate) fn inner(&self) -> &StableDiGraph<Node, Edge> {
        &self.graph
    }

    fn index_of(&self, node_id: &NodeId) -> Result<NodeIndex, GraphError> {
        self.node_index_map
            .get(node_id)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode {
                node_id: node_id.clone(),
            })
    }

    fn edges_directed(&self, node_id: &NodeId, direction: Direction) -> Vec<&Edge> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };
        let mut edges: Vec<&Edge> = self
            .graph
            .edges_directed(index, direction)
            .map(|e| e.weight())
            .collect();
        // petgraph yields the most recently added edge first.
        edges.reverse();
        edges
    }
}

/// Wire form of a graph: `{ "nodes": [...], "edges": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GraphRepr {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

impl TryFrom<GraphRepr> for WorkflowGraph {
    type Error = GraphError;

    fn try_from(repr: GraphRepr) -> Result<Self, Self::Error> {
        let mut graph = Self::new();
        for node in repr.nodes {
            graph.add_node(node)?;
        }
        for edge in repr.edges {
            if graph.contains_node(&edge.source) && graph.contains_node(&edge.target) {
                graph.add_edge(edge)?;
            } else {
                graph.unresolved_edges.push(edge);
            }
        }
        Ok(graph)
    }
}

impl From<WorkflowGraph> for GraphRepr {
    fn from(graph: WorkflowGraph) -> Self {
        let mut edges: Vec<Edge> = graph.graph.edge_weights().cloned().collect();
        edges.extend(graph.unresolved_edges);
        Self {
            nodes: graph.graph.node_weights().cloned().collect(),
            edges,
        }
    }
}
