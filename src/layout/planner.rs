// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Turns the resource snapshot and the count options into a `ProcessLayout`.

use tracing::{debug, warn};

use super::{apply_order, placement_hints, NodeAssignment, ProcessLayout};
use crate::error::{ResourceError, Result, ValidationError};
use crate::options::OptionSet;
use crate::sched::ResourceSnapshot;

fn positive(option: &'static str, value: Option<i64>) -> Result<Option<usize>> {
    match value {
        None => Ok(None),
        Some(v) if v > 0 => usize::try_from(v)
            .map(Some)
            .map_err(|_| ValidationError::NotPositive { option, value: v }.into()),
        Some(v) => Err(ValidationError::NotPositive { option, value: v }.into()),
    }
}

/// Compute the layout for one launch
pub fn plan(snapshot: &ResourceSnapshot, opts: &OptionSet) -> Result<ProcessLayout> {
    let universe = positive("universe", opts.universe)?;
    let hybrid = positive("hybrid", opts.hybrid)?;
    let multi = positive("multi", opts.multi)?;

    if universe.is_some() && hybrid.is_some() {
        return Err(ValidationError::Conflict("universe", "hybrid").into());
    }
    if opts.double && multi.is_some() {
        return Err(ValidationError::Conflict("double", "multi").into());
    }

    if snapshot.is_empty() {
        return Err(ResourceError::NoNodes.into());
    }

    let nodes = apply_order(snapshot.nodes(), opts.order);
    let node_count = nodes.len();

    let base: Vec<usize> = match (universe, hybrid) {
        (Some(total), _) => {
            let (each, extra) = (total / node_count, total % node_count);
            (0..node_count).map(|i| each + usize::from(i < extra)).collect()
        }
        (None, Some(per_node)) => vec![per_node; node_count],
        (None, None) => nodes.iter().map(|n| n.cores).collect(),
    };

    let factor = if opts.double { 2 } else { multi.unwrap_or(1) };

    let mut assignments = Vec::with_capacity(node_count);
    let mut total: usize = 0;
    for (node, count) in nodes.into_iter().zip(base) {
        let too_many = || ValidationError::TooManyProcesses(node.name.clone());
        let processes = count.checked_mul(factor).ok_or_else(too_many)?;
        total = total.checked_add(processes).ok_or_else(too_many)?;

        if processes > node.cores {
            warn!(
                node = %node.name,
                processes,
                cores = node.cores,
                "oversubscribing node"
            );
        }

        // Only the numactl wrapper reads the per-rank map
        let hints = match opts.overridepin {
            Some(pin) => placement_hints(pin, processes, node.cores).ok_or_else(too_many)?,
            None => Vec::new(),
        };

        assignments.push(NodeAssignment {
            node: node.name,
            cores: node.cores,
            processes,
            hints,
        });
    }

    let layout = ProcessLayout::new(assignments);
    if total == 0 {
        let name = layout
            .nodes()
            .first()
            .map(|n| n.node.clone())
            .unwrap_or_default();
        return Err(ResourceError::NoCores(name).into());
    }

    debug!(total, cores = snapshot.total_cores(), layout = ?layout.counts(), "process layout planned");
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::options::OrderMode;
    use crate::sched::NodeResources;

    fn snapshot(nodes: &[(&str, usize)]) -> ResourceSnapshot {
        ResourceSnapshot::new(
            "1",
            nodes
                .iter()
                .map(|(name, cores)| NodeResources::new(*name, *cores))
                .collect(),
        )
    }

    fn two_by_four() -> ResourceSnapshot {
        snapshot(&[("node1", 4), ("node2", 4)])
    }

    #[test]
    fn test_default_uses_all_cores() {
        let layout = plan(&two_by_four(), &OptionSet::default()).unwrap();
        assert_eq!(layout.counts(), vec![("node1", 4), ("node2", 4)]);
        assert_eq!(layout.total(), 8);
    }

    #[test]
    fn test_default_heterogeneous() {
        let layout = plan(&snapshot(&[("a", 8), ("b", 2)]), &OptionSet::default()).unwrap();
        assert_eq!(layout.counts(), vec![("a", 8), ("b", 2)]);
    }

    #[test]
    fn test_hybrid_total() {
        for node_count in 1..6 {
            let names: Vec<String> = (0..node_count).map(|i| format!("n{i}")).collect();
            let nodes: Vec<(&str, usize)> = names.iter().map(|n| (n.as_str(), 16)).collect();
            for hybrid in 1..5 {
                let opts = OptionSet {
                    hybrid: Some(hybrid),
                    ..Default::default()
                };
                let layout = plan(&snapshot(&nodes), &opts).unwrap();
                assert_eq!(layout.total(), hybrid as usize * node_count);
                assert!(layout.nodes().iter().all(|n| n.processes == hybrid as usize));
            }
        }
    }

    #[test]
    fn test_universe_split() {
        let opts = OptionSet {
            universe: Some(3),
            ..Default::default()
        };
        let layout = plan(&two_by_four(), &opts).unwrap();
        assert_eq!(layout.counts(), vec![("node1", 2), ("node2", 1)]);
        assert_eq!(layout.total(), 3);
    }

    #[test]
    fn test_universe_balanced() {
        let snap = snapshot(&[("a", 4), ("b", 4), ("c", 4)]);
        for universe in 1..20 {
            let opts = OptionSet {
                universe: Some(universe),
                ..Default::default()
            };
            let layout = plan(&snap, &opts).unwrap();
            assert_eq!(layout.total(), universe as usize);
            let max = layout.nodes().iter().map(|n| n.processes).max().unwrap();
            let min = layout.nodes().iter().map(|n| n.processes).min().unwrap();
            assert!(max - min <= 1);
        }
    }

    #[test]
    fn test_universe_smaller_than_nodes_keeps_idle_nodes() {
        let opts = OptionSet {
            universe: Some(1),
            ..Default::default()
        };
        let layout = plan(&two_by_four(), &opts).unwrap();
        assert_eq!(layout.counts(), vec![("node1", 1), ("node2", 0)]);
        assert_eq!(layout.active_nodes().count(), 1);
    }

    #[test]
    fn test_order_decides_universe_extra() {
        let snap = snapshot(&[("b", 4), ("a", 4)]);
        let opts = OptionSet {
            universe: Some(3),
            order: OrderMode::Sort,
            ..Default::default()
        };
        let layout = plan(&snap, &opts).unwrap();
        assert_eq!(layout.counts(), vec![("a", 2), ("b", 1)]);
    }

    #[test]
    fn test_double_equals_multi_two() {
        let double = OptionSet {
            double: true,
            ..Default::default()
        };
        let multi = OptionSet {
            multi: Some(2),
            ..Default::default()
        };
        let a = plan(&two_by_four(), &double).unwrap();
        let b = plan(&two_by_four(), &multi).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total(), 16);
    }

    #[test]
    fn test_multiplier_after_universe() {
        let opts = OptionSet {
            universe: Some(3),
            multi: Some(3),
            ..Default::default()
        };
        let layout = plan(&two_by_four(), &opts).unwrap();
        assert_eq!(layout.counts(), vec![("node1", 6), ("node2", 3)]);
    }

    #[test]
    fn test_conflicts() {
        let opts = OptionSet {
            double: true,
            multi: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            plan(&two_by_four(), &opts),
            Err(Error::Validation(ValidationError::Conflict("double", "multi")))
        ));

        let opts = OptionSet {
            universe: Some(2),
            hybrid: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            plan(&two_by_four(), &opts),
            Err(Error::Validation(ValidationError::Conflict("universe", "hybrid")))
        ));
    }

    #[test]
    fn test_non_positive_values() {
        for (opts, name) in [
            (OptionSet { universe: Some(0), ..Default::default() }, "universe"),
            (OptionSet { hybrid: Some(-2), ..Default::default() }, "hybrid"),
            (OptionSet { multi: Some(0), ..Default::default() }, "multi"),
        ] {
            match plan(&two_by_four(), &opts) {
                Err(Error::Validation(ValidationError::NotPositive { option, .. })) => {
                    assert_eq!(option, name)
                }
                other => panic!("unexpected result for {name}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_no_nodes() {
        let err = plan(&snapshot(&[]), &OptionSet::default()).unwrap_err();
        assert!(matches!(err, Error::Resource(ResourceError::NoNodes)));
    }

    #[test]
    fn test_no_cores() {
        let err = plan(&snapshot(&[("a", 0)]), &OptionSet::default()).unwrap_err();
        assert!(matches!(err, Error::Resource(ResourceError::NoCores(_))));
    }

    #[test]
    fn test_oversubscription_is_allowed() {
        let opts = OptionSet {
            hybrid: Some(8),
            ..Default::default()
        };
        let layout = plan(&two_by_four(), &opts).unwrap();
        assert_eq!(layout.total(), 16);
    }

    #[test]
    fn test_hints_follow_pinning() {
        let opts = OptionSet {
            hybrid: Some(2),
            overridepin: Some("compact".parse().unwrap()),
            ..Default::default()
        };
        let layout = plan(&two_by_four(), &opts).unwrap();
        assert_eq!(layout.nodes()[0].hints.len(), 2);
        assert_eq!(layout.nodes()[0].hints[1].to_string(), "2-3");

        // native pinning alone needs no per-rank map
        let layout = plan(&two_by_four(), &OptionSet::default()).unwrap();
        assert!(layout.nodes().iter().all(|n| n.hints.is_empty()));
    }

    #[test]
    fn test_huge_counts_are_rejected() {
        let opts = OptionSet {
            universe: Some(i64::MAX),
            multi: Some(4),
            ..Default::default()
        };
        assert!(matches!(
            plan(&two_by_four(), &opts),
            Err(Error::Validation(ValidationError::TooManyProcesses(_)))
        ));

        let opts = OptionSet {
            hybrid: Some(i64::MAX),
            multi: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            plan(&two_by_four(), &opts),
            Err(Error::Validation(ValidationError::TooManyProcesses(_)))
        ));
    }

    #[test]
    fn test_huge_hybrid_without_override() {
        let opts = OptionSet {
            hybrid: Some(i64::MAX),
            ..Default::default()
        };
        let layout = plan(&snapshot(&[("node1", 4)]), &opts).unwrap();
        assert_eq!(layout.total(), i64::MAX as usize);
        assert!(layout.nodes()[0].hints.is_empty());

        let opts = OptionSet {
            hybrid: Some(i64::MAX),
            overridepin: Some("compact".parse().unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            plan(&snapshot(&[("node1", 4)]), &opts),
            Err(Error::Validation(ValidationError::TooManyProcesses(_)))
        ));
    }
}
