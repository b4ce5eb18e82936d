// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Process layout: how many ranks go on which node, and where they are pinned.

mod order;
mod pinning;
mod planner;

pub use order::apply_order;
pub use pinning::{placement_hints, CoreSet};
pub use planner::plan;

/// Processes assigned to one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAssignment {
    pub node: String,
    /// Cores the allocation has on this node
    pub cores: usize,
    /// Number of ranks started on this node
    pub processes: usize,
    /// Core set per local rank, only filled for a pinning override
    pub hints: Vec<CoreSet>,
}

/// Ordered (node, process count) pairs for one launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLayout {
    nodes: Vec<NodeAssignment>,
}

impl ProcessLayout {
    pub(crate) fn new(nodes: Vec<NodeAssignment>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[NodeAssignment] {
        &self.nodes
    }

    /// Nodes that actually receive ranks
    pub fn active_nodes(&self) -> impl Iterator<Item = &NodeAssignment> {
        self.nodes.iter().filter(|n| n.processes > 0)
    }

    /// Total rank count, always the sum of the per-node counts
    pub fn total(&self) -> usize {
        self.nodes.iter().map(|n| n.processes).sum()
    }

    /// Common per-node count if every active node runs the same number of ranks
    pub fn uniform_per_node(&self) -> Option<usize> {
        let mut counts = self.active_nodes().map(|n| n.processes);
        let first = counts.next()?;
        counts.all(|c| c == first).then_some(first)
    }

    /// (node, count) pairs, the shape most callers care about
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.nodes
            .iter()
            .map(|n| (n.node.as_str(), n.processes))
            .collect()
    }
}
