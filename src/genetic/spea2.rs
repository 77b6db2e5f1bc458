//! SPEA2 environmental selection (Zitzler, Laumanns & Thiele, 2001).

use super::{squared_distance, Individual};
use crate::objective::ObjectiveSet;
use ordered_float::OrderedFloat;

/// Select `k` individuals into the next archive.
///
/// Every individual gets a strength (how many it dominates), a raw fitness
/// (sum of the strengths of its dominators) and a density estimated from
/// the distance to its `floor(sqrt(N))`-th nearest neighbour in objective
/// space. Non-dominated individuals are kept first; a short archive is
/// completed with the best dominated ones, an overfull one is truncated by
/// repeatedly removing the most crowded member.
pub fn sel_spea2(individuals: &[Individual], k: usize, objectives: &ObjectiveSet) -> Vec<Individual> {
    let n = individuals.len();
    if k >= n {
        return individuals.to_vec();
    }
    if k == 0 {
        return Vec::new();
    }

    let mut strength = vec![0usize; n];
    let mut dominators: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in 0..n {
            if i != j && objectives.dominates(individuals[i].values(), individuals[j].values()) {
                strength[i] += 1;
                dominators[j].push(i);
            }
        }
    }

    let raw: Vec<usize> = dominators.iter()
        .map(|doms| doms.iter().map(|&d| strength[d]).sum())
        .collect();

    let distances: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| squared_distance(individuals[i].values(), individuals[j].values()).sqrt())
                .collect()
        })
        .collect();

    let mut chosen: Vec<usize> = (0..n).filter(|&i| raw[i] == 0).collect();

    if chosen.len() < k {
        let neighbour = ((n as f64).sqrt() as usize).max(1);
        let mut rest: Vec<(f64, usize)> = (0..n)
            .filter(|&i| raw[i] > 0)
            .map(|i| {
                let mut others: Vec<f64> = (0..n).filter(|&j| j != i).map(|j| distances[i][j]).collect();
                others.sort_by_key(|&d| OrderedFloat(d));
                let sigma = others.get(neighbour.min(others.len()) - 1).copied().unwrap_or(0.0);
                (raw[i] as f64 + 1.0 / (sigma + 2.0), i)
            })
            .collect();
        rest.sort_by_key(|&(f, i)| (OrderedFloat(f), i));
        chosen.extend(rest.into_iter().take(k - chosen.len()).map(|(_, i)| i));
    } else if chosen.len() > k {
        truncate(&mut chosen, k, &distances);
    }

    chosen.sort_unstable();
    chosen.into_iter().map(|i| individuals[i].clone()).collect()
}

/// Archive truncation: while too many remain, drop the member whose sorted
/// distances to the others are lexicographically smallest.
fn truncate(chosen: &mut Vec<usize>, k: usize, distances: &[Vec<f64>]) {
    while chosen.len() > k {
        let mut victim = 0;
        let mut victim_profile: Option<Vec<OrderedFloat<f64>>> = None;

        for (pos, &i) in chosen.iter().enumerate() {
            let mut profile: Vec<OrderedFloat<f64>> = chosen.iter()
                .filter(|&&j| j != i)
                .map(|&j| OrderedFloat(distances[i][j]))
                .collect();
            profile.sort();

            let closer = match &victim_profile {
                None => true,
                Some(current) => profile < *current,
            };
            if closer {
                victim = pos;
                victim_profile = Some(profile);
            }
        }

        chosen.remove(victim);
    }
}
