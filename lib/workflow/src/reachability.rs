//! Tracks which nodes a run will actually execute.
//!
//! Reachability is decided per edge. An edge becomes *live* when its source
//! succeeds and the edge is on an active port (for a condition, the port of
//! the chosen branch). It becomes *dead* when its source is skipped or the
//! edge leaves a condition on the unchosen port. A node is reachable as soon
//! as one inbound edge is live, so joins have OR semantics: a node fed by
//! both a taken and an untaken branch still runs.
//!
//! The engine visits nodes in plan order, so every inbound edge of a node is
//! resolved before the node itself is asked about.

use crate::edge::Edge;
use crate::execution::SkipReason;
use crate::node::NodeId;
use crate::plan::PlannedStep;
use std::collections::{BTreeSet, HashMap};

/// Whether the engine should execute a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Skip(SkipReason),
}

/// The reachable set of one run.
#[derive(Debug, Clone, Default)]
pub struct ReachableSet {
    reachable: BTreeSet<NodeId>,
    dead: HashMap<Edge, SkipReason>,
}

impl ReachableSet {
    /// Starts with the fired triggers reachable.
    #[must_use]
    pub fn new(fired: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            reachable: fired.into_iter().collect(),
            dead: HashMap::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.reachable.contains(node_id)
    }

    /// Nodes known to be reachable so far.
    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.reachable.iter()
    }

    /// Decides whether `step` runs, given everything resolved so far.
    #[must_use]
    pub fn status(&self, step: &PlannedStep) -> Reachability {
        if self.reachable.contains(&step.node.id) {
            return Reachability::Reachable;
        }
        if step.node.is_trigger() {
            return Reachability::Skip(SkipReason::NotTriggered);
        }

        let reasons: Vec<SkipReason> = step
            .inbound
            .iter()
            .filter_map(|edge| self.dead.get(edge).copied())
            .collect();
        let reason = if reasons.contains(&SkipReason::BranchNotTaken) {
            SkipReason::BranchNotTaken
        } else if !reasons.is_empty() && reasons.iter().all(|r| *r == SkipReason::NotTriggered) {
            SkipReason::NotTriggered
        } else {
            SkipReason::Unreachable
        };
        Reachability::Skip(reason)
    }

    /// Records that `step` ran. `outcome` is the branch a condition chose.
    pub fn mark_succeeded(&mut self, step: &PlannedStep, outcome: Option<bool>) {
        for (edge, active) in step.active_edges(outcome) {
            if active {
                self.reachable.insert(edge.target.clone());
            } else {
                self.dead.insert(edge.clone(), SkipReason::BranchNotTaken);
            }
        }
    }

    /// Records that `step` was skipped; its outgoing edges die with it.
    pub fn mark_skipped(&mut self, step: &PlannedStep, reason: SkipReason) {
        for edge in &step.outgoing {
            self.dead.insert(edge.clone(), reason);
        }
    }
}
