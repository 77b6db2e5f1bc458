//! NSGA-II environmental selection (Deb et al., 2002).

use super::pareto::{crowding_distance, non_dominated_sort};
use super::Individual;
use crate::objective::ObjectiveSet;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

/// Select `k` individuals: whole Pareto fronts are taken in order, and the
/// front that does not fit is cut by descending crowding distance.
pub fn sel_nsga2(individuals: &[Individual], k: usize, objectives: &ObjectiveSet) -> Vec<Individual> {
    let mut chosen: Vec<usize> = Vec::with_capacity(k);

    for front in non_dominated_sort(individuals, objectives) {
        if chosen.len() >= k {
            break;
        }
        let room = k - chosen.len();
        if front.len() <= room {
            chosen.extend(front);
        } else {
            let distances = crowding_distance(individuals, &front, objectives);
            let mut order: Vec<usize> = (0..front.len()).collect();
            order.sort_by_key(|&p| Reverse(OrderedFloat(distances[p])));
            chosen.extend(order.into_iter().take(room).map(|p| front[p]));
        }
    }

    chosen.into_iter().map(|i| individuals[i].clone()).collect()
}
