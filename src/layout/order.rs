// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Node ordering applied before ranks are assigned.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::options::OrderMode;
use crate::sched::NodeResources;

/// Reorder the snapshot's nodes according to `mode`
pub fn apply_order(nodes: &[NodeResources], mode: OrderMode) -> Vec<NodeResources> {
    let mut ordered = nodes.to_vec();
    match mode {
        OrderMode::Normal => {}
        OrderMode::Sort => ordered.sort_by(|a, b| a.name.cmp(&b.name)),
        OrderMode::Random { seed } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            ordered.shuffle(&mut rng);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(names: &[&str]) -> Vec<NodeResources> {
        names.iter().map(|n| NodeResources::new(*n, 4)).collect()
    }

    fn names(nodes: &[NodeResources]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_normal_keeps_order() {
        let input = nodes(&["n3", "n1", "n2"]);
        assert_eq!(names(&apply_order(&input, OrderMode::Normal)), vec!["n3", "n1", "n2"]);
    }

    #[test]
    fn test_sort() {
        let input = nodes(&["n3", "n1", "n2"]);
        assert_eq!(names(&apply_order(&input, OrderMode::Sort)), vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let input = nodes(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let mode = OrderMode::Random { seed: Some(7) };

        let first = apply_order(&input, mode);
        let second = apply_order(&input, mode);
        assert_eq!(first, second);

        let mut sorted = names(&first);
        sorted.sort();
        assert_eq!(sorted, names(&input));
    }
}
