// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Per-rank core placement hints.
//!
//! Core numbering follows the OS numbering on the node. Hints are computed
//! per node from its own core count, so heterogeneous allocations get
//! per-node maps.

use std::fmt;

use crate::options::{PinOverride, PinStrategy};

/// Set of core indices one local rank may run on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSet(Vec<usize>);

impl CoreSet {
    pub fn single(core: usize) -> Self {
        CoreSet(vec![core])
    }

    pub fn range(start: usize, len: usize) -> Self {
        CoreSet((start..start + len).collect())
    }
}

/// Renders in `numactl --physcpubind` syntax: `3`, `0-3` or `0,4,8`
impl fmt::Display for CoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let contiguous = self.0.windows(2).all(|w| w[1] == w[0] + 1);
        match self.0.as_slice() {
            [] => Ok(()),
            [only] => write!(f, "{only}"),
            [first, .., last] if contiguous => write!(f, "{first}-{last}"),
            cores => {
                let parts: Vec<String> = cores.iter().map(usize::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

/// Core set for every local rank on a node with `cores` cores running `processes` ranks.
/// `None` when a map that large cannot be allocated.
pub fn placement_hints(pin: PinOverride, processes: usize, cores: usize) -> Option<Vec<CoreSet>> {
    let mut hints = Vec::new();
    if cores == 0 {
        return Some(hints);
    }
    hints.try_reserve_exact(processes).ok()?;

    let per_rank = cores / processes.max(1);
    let oversubscribed = per_rank < 1;
    let multi_core = !pin.single_core && per_rank > 1;

    hints.extend((0..processes).map(|rank| {
        if oversubscribed {
            return CoreSet::single(rank % cores);
        }
        match (pin.strategy, multi_core) {
            (PinStrategy::Compact | PinStrategy::Spread, true) => {
                CoreSet::range(rank * per_rank, per_rank)
            }
            (PinStrategy::Compact, false) => CoreSet::single(rank),
            (PinStrategy::Spread, false) => CoreSet::single(rank * per_rank),
            (PinStrategy::Cycle, true) => {
                CoreSet((rank..cores).step_by(processes).take(per_rank).collect())
            }
            (PinStrategy::Cycle, false) => CoreSet::single(rank % cores),
        }
    }));
    Some(hints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(s: &str) -> PinOverride {
        s.parse().unwrap()
    }

    fn hints(pin: PinOverride, processes: usize, cores: usize) -> Vec<CoreSet> {
        placement_hints(pin, processes, cores).unwrap()
    }

    fn rendered(hints: &[CoreSet]) -> Vec<String> {
        hints.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_core_set_display() {
        assert_eq!(CoreSet::single(3).to_string(), "3");
        assert_eq!(CoreSet::range(4, 4).to_string(), "4-7");
        assert_eq!(CoreSet(vec![0, 4, 8]).to_string(), "0,4,8");
    }

    #[test]
    fn test_compact() {
        assert_eq!(rendered(&hints(pin("compact"), 2, 8)), vec!["0-3", "4-7"]);
        assert_eq!(rendered(&hints(pin("compactpin"), 2, 8)), vec!["0", "1"]);
        assert_eq!(rendered(&hints(pin("compact"), 4, 4)), vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn test_spread() {
        assert_eq!(rendered(&hints(pin("spreadpin"), 2, 8)), vec!["0", "4"]);
        assert_eq!(rendered(&hints(pin("spread"), 2, 8)), vec!["0-3", "4-7"]);
    }

    #[test]
    fn test_cycle() {
        assert_eq!(rendered(&hints(pin("cyclepin"), 3, 8)), vec!["0", "1", "2"]);
        assert_eq!(rendered(&hints(pin("cycle"), 2, 8)), vec!["0,2,4,6", "1,3,5,7"]);
    }

    #[test]
    fn test_oversubscribed_wraps_around() {
        assert_eq!(
            rendered(&hints(pin("spread"), 6, 4)),
            vec!["0", "1", "2", "3", "0", "1"]
        );
    }

    #[test]
    fn test_no_cores_no_hints() {
        assert!(hints(pin("compact"), 2, 0).is_empty());
    }

    #[test]
    fn test_unallocatable_map() {
        assert!(placement_hints(pin("compact"), usize::MAX / 2, 4).is_none());
    }
}
