//! Edge types for workflow graphs.
//!
//! An edge says "target happens after source". Most nodes have a single
//! outgoing port; condition nodes expose `true` and `false`, and an edge
//! leaving a condition on the default port belongs to the `true` branch.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The source port an edge leaves from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    #[default]
    Default,
    True,
    False,
}

impl Port {
    /// The branch this port selects on a condition node.
    #[must_use]
    pub fn branch(self) -> bool {
        !matches!(self, Self::False)
    }

    /// The port a condition outcome activates.
    #[must_use]
    pub fn for_outcome(outcome: bool) -> Self {
        if outcome { Self::True } else { Self::False }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
        }
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub source_port: Port,
}

impl Edge {
    /// Creates an edge on the default port.
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self::with_port(source, target, Port::Default)
    }

    #[must_use]
    pub fn with_port(source: impl Into<NodeId>, target: impl Into<NodeId>, port: Port) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_port: port,
        }
    }

    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_port {
            Port::Default => write!(f, "{} -> {}", self.source, self.target),
            port => write!(f, "{}[{port}] -> {}", self.source, self.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn port_defaults_when_absent() {
        let edge: Edge =
            serde_json::from_value(json!({ "source": "a", "target": "b" })).expect("deserialize");
        assert_eq!(edge.source_port, Port::Default);
        assert!(edge.source_port.branch());
    }

    #[test]
    fn false_port_is_the_only_false_branch() {
        assert!(Port::True.branch());
        assert!(!Port::False.branch());
        assert_eq!(Port::for_outcome(false), Port::False);
    }

    #[test]
    fn display_shows_non_default_port() {
        assert_eq!(Edge::new("a", "b").to_string(), "a -> b");
        assert_eq!(
            Edge::with_port("check", "b", Port::False).to_string(),
            "check[false] -> b"
        );
    }
}
