//! Workflow definition types.
//!
//! A workflow is a named automation: metadata plus the graph the user
//! composed in the editor. Runs reference it by id.

use crate::graph::WorkflowGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weaver_core::WorkflowId;

/// Metadata for a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub name: String,
    pub description: Option<String>,
    /// Inactive workflows can still be run by hand but are not scheduled.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub metadata: WorkflowMetadata,
    pub graph: WorkflowGraph,
}

impl Workflow {
    #[must_use]
    pub fn new(name: impl Into<String>, graph: WorkflowGraph) -> Self {
        Self {
            id: WorkflowId::new(),
            metadata: WorkflowMetadata::new(name),
            graph,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Replaces the graph and bumps `updated_at`.
    pub fn replace_graph(&mut self, graph: WorkflowGraph) {
        self.graph = graph;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }
}

/// Summary information about a workflow, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub node_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id,
            name: workflow.metadata.name.clone(),
            description: workflow.metadata.description.clone(),
            is_active: workflow.metadata.is_active,
            node_count: workflow.graph.node_count(),
            updated_at: workflow.metadata.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::trigger;

    #[test]
    fn summary_counts_nodes() {
        let mut graph = WorkflowGraph::new();
        graph.add_node(trigger("start")).expect("add");
        let workflow = Workflow::new("Weekly report", graph);

        let summary = WorkflowSummary::from(&workflow);
        assert_eq!(summary.id, workflow.id);
        assert_eq!(summary.name, "Weekly report");
        assert_eq!(summary.node_count, 1);
        assert!(summary.is_active);
    }

    #[test]
    fn replace_graph_touches_timestamp() {
        let mut workflow = Workflow::new("Test", WorkflowGraph::new());
        let before = workflow.metadata.updated_at;
        let mut graph = WorkflowGraph::new();
        graph.add_node(trigger("start")).expect("add");

        workflow.replace_graph(graph);
        assert_eq!(workflow.graph.node_count(), 1);
        assert!(workflow.metadata.updated_at >= before);
    }

    #[test]
    fn workflow_serde_roundtrip() {
        let mut graph = WorkflowGraph::new();
        graph.add_node(trigger("start")).expect("add");
        let workflow = Workflow::new("Serialization Test", graph);
        let json = serde_json::to_string(&workflow).expect("serialize");
        let parsed: Workflow = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(workflow.id, parsed.id);
        assert_eq!(parsed.name(), "Serialization Test");
        assert_eq!(parsed.graph.node_count(), 1);
    }
}
