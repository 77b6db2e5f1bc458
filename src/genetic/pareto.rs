//! Pareto dominance utilities: fast non-dominated sorting, crowding
//! distance and a hall of fame of non-dominated individuals.

use super::Individual;
use crate::objective::ObjectiveSet;
use ordered_float::OrderedFloat;
use std::collections::HashSet;

/// Sort `individuals` into Pareto fronts (Deb's fast non-dominated sort).
/// Returns the fronts as index lists, best front first.
pub fn non_dominated_sort(individuals: &[Individual], objectives: &ObjectiveSet) -> Vec<Vec<usize>> {
    let n = individuals.len();
    let mut dominated_by_me: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (individuals[i].values(), individuals[j].values());
            if objectives.dominates(a, b) {
                dominated_by_me[i].push(j);
                domination_count[j] += 1;
            } else if objectives.dominates(b, a) {
                dominated_by_me[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominated_by_me[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }

    fronts
}

/// Crowding distance of each member of `front`, in the order of `front`.
/// Boundary individuals on any objective get an infinite distance.
pub fn crowding_distance(individuals: &[Individual], front: &[usize], objectives: &ObjectiveSet) -> Vec<f64> {
    let n = front.len();
    let mut distances = vec![0.0; n];
    if n == 0 {
        return distances;
    }

    let n_obj = objectives.len();
    for m in 0..n_obj {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&p| OrderedFloat(individuals[front[p]].values()[m]));

        let first = individuals[front[order[0]]].values()[m];
        let last = individuals[front[order[n - 1]]].values()[m];

        distances[order[0]] = f64::INFINITY;
        distances[order[n - 1]] = f64::INFINITY;

        let range = last - first;
        if range == 0.0 {
            continue;
        }
        let norm = n_obj as f64 * range;

        for w in 1..n.saturating_sub(1) {
            let prev = individuals[front[order[w - 1]]].values()[m];
            let next = individuals[front[order[w + 1]]].values()[m];
            distances[order[w]] += (next - prev) / norm;
        }
    }

    distances
}

/// Hall of fame holding every non-dominated individual seen so far,
/// unique by key.
#[derive(Debug, Clone, Default)]
pub struct ParetoFront {
    items: Vec<Individual>,
}

impl ParetoFront {
    pub fn new() -> Self {
        ParetoFront { items: Vec::new() }
    }

    /// Insert every individual of `population` not dominated by a member,
    /// evicting the members it dominates.
    pub fn update(&mut self, population: &[Individual], objectives: &ObjectiveSet) {
        for ind in population.iter().filter(|ind| ind.is_evaluated()) {
            let key = ind.key();
            if self.items.iter().any(|m| m.key() == key) {
                continue;
            }
            if self.items.iter().any(|m| objectives.dominates(m.values(), ind.values())) {
                continue;
            }
            self.items.retain(|m| !objectives.dominates(ind.values(), m.values()));
            self.items.push(ind.clone());
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.items
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.iter().map(|m| m.key()).collect()
    }
}

/// Distinct keys, in first-seen order
pub(crate) fn unique_keys(individuals: &[Individual]) -> Vec<String> {
    let mut seen = HashSet::new();
    individuals.iter()
        .map(|ind| ind.key())
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ind(key: &str, fitness: &[f64]) -> Individual {
        let mut i = Individual::from_key(key).unwrap();
        i.fitness = Some(fitness.to_vec());
        i
    }

    fn two_objectives() -> ObjectiveSet {
        "precision,risk".parse().unwrap()
    }

    #[test]
    fn test_non_dominated_sort_layers() {
        let objectives = two_objectives();
        let pop = vec![
            ind("000", &[0.9, 0.1]),
            ind("001", &[0.1, 0.9]),
            ind("010", &[0.5, 0.5]),
            ind("011", &[0.4, 0.4]),
            ind("100", &[0.0, 0.0]),
        ];
        let fronts = non_dominated_sort(&pop, &objectives);
        assert_eq!(fronts, vec![vec![0, 1, 2], vec![3], vec![4]]);
    }

    #[test]
    fn test_crowding_distance_boundaries_are_infinite() {
        let objectives = two_objectives();
        let pop = vec![
            ind("000", &[0.0, 1.0]),
            ind("001", &[0.25, 0.75]),
            ind("010", &[0.5, 0.5]),
            ind("011", &[1.0, 0.0]),
        ];
        let front = vec![0, 1, 2, 3];
        let d = crowding_distance(&pop, &front, &objectives);

        assert!(d[0].is_infinite());
        assert!(d[3].is_infinite());
        assert!((d[1] - 0.5).abs() < 1e-12);
        assert!((d[2] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_pareto_front_update() {
        let objectives = two_objectives();
        let mut front = ParetoFront::new();

        front.update(&[ind("01", &[0.5, 0.5]), ind("10", &[0.4, 0.4])], &objectives);
        assert_eq!(front.keys(), vec!["01".to_string()]);

        // A trade-off joins, a dominating point evicts.
        front.update(&[ind("11", &[0.9, 0.1])], &objectives);
        assert_eq!(front.len(), 2);
        front.update(&[ind("00", &[0.6, 0.6])], &objectives);
        let mut keys = front.keys();
        keys.sort();
        assert_eq!(keys, vec!["00".to_string(), "11".to_string()]);

        // Duplicate keys are ignored.
        front.update(&[ind("00", &[0.6, 0.6])], &objectives);
        assert_eq!(front.len(), 2);

        front.clear();
        assert!(front.is_empty());
    }

    #[test]
    fn test_unique_keys_keep_order() {
        let pop = vec![ind("10", &[0.0]), ind("01", &[0.0]), ind("10", &[0.0])];
        assert_eq!(unique_keys(&pop), vec!["10".to_string(), "01".to_string()]);
    }
}
