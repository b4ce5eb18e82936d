// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Resource inventory captured once per invocation.

use std::collections::HashMap;

/// One allocated node and the cores available on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResources {
    /// Hostname as known to the scheduler
    pub name: String,
    /// Number of cores allocated on this node
    pub cores: usize,
}

impl NodeResources {
    pub fn new(name: impl Into<String>, cores: usize) -> Self {
        Self {
            name: name.into(),
            cores,
        }
    }
}

/// Immutable snapshot of the allocation the job runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// Scheduler job id (or a generated one for local runs)
    pub job_id: String,
    nodes: Vec<NodeResources>,
}

impl ResourceSnapshot {
    pub fn new(job_id: impl Into<String>, nodes: Vec<NodeResources>) -> Self {
        Self {
            job_id: job_id.into(),
            nodes,
        }
    }

    /// Build a snapshot from a slot list with one entry per allocated core
    /// (the PBS node file format). Node order is the order of first appearance.
    pub fn from_slot_list<I, S>(job_id: impl Into<String>, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut nodes: Vec<NodeResources> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for slot in slots {
            let name = slot.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            match index.get(name) {
                Some(&i) => nodes[i].cores += 1,
                None => {
                    index.insert(name.to_string(), nodes.len());
                    nodes.push(NodeResources::new(name, 1));
                }
            }
        }

        Self::new(job_id, nodes)
    }

    pub fn nodes(&self) -> &[NodeResources] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn total_cores(&self) -> usize {
        self.nodes.iter().map(|n| n.cores).sum()
    }
}
