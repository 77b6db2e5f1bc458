//! Variation and selection operators on bit-mask individuals.

use super::Individual;
use crate::objective::ObjectiveSet;
use rand::Rng;
use std::cmp::Ordering;

/// Two-point crossover, exchanging the segment between two cut points in
/// place. Parents shorter than two genes are left untouched.
pub fn cx_two_point<R: Rng + ?Sized>(a: &mut [bool], b: &mut [bool], rng: &mut R) {
    let size = a.len().min(b.len());
    if size < 2 {
        return;
    }

    let mut p1 = rng.gen_range(1..=size);
    let mut p2 = rng.gen_range(1..size);
    if p2 >= p1 {
        p2 += 1;
    } else {
        std::mem::swap(&mut p1, &mut p2);
    }

    a[p1..p2].swap_with_slice(&mut b[p1..p2]);
}

/// Flip every gene independently with probability `indpb`
pub fn mut_flip_bit<R: Rng + ?Sized>(genes: &mut [bool], indpb: f64, rng: &mut R) {
    for gene in genes.iter_mut() {
        if rng.gen::<f64>() < indpb {
            *gene = !*gene;
        }
    }
}

/// Tournament selection: `k` times, draw `tournsize` individuals with
/// replacement and keep the one with the lexicographically best weighted
/// fitness.
pub fn sel_tournament<R: Rng + ?Sized>(
    individuals: &[Individual],
    k: usize,
    tournsize: usize,
    objectives: &ObjectiveSet,
    rng: &mut R,
) -> Vec<Individual> {
    if individuals.is_empty() {
        return Vec::new();
    }

    (0..k)
        .map(|_| {
            let mut best = rng.gen_range(0..individuals.len());
            for _ in 1..tournsize.max(1) {
                let candidate = rng.gen_range(0..individuals.len());
                if objectives.compare(individuals[candidate].values(), individuals[best].values()) == Ordering::Greater {
                    best = candidate;
                }
            }
            individuals[best].clone()
        })
        .collect()
}

/// Variation "and": clone the population, mate consecutive pairs with
/// probability `cxpb`, then mutate each offspring with probability `mutpb`.
/// Every touched individual loses its fitness.
pub fn var_and<R: Rng + ?Sized>(
    population: &[Individual],
    cxpb: f64,
    mutpb: f64,
    indpb: f64,
    rng: &mut R,
) -> Vec<Individual> {
    let mut offspring: Vec<Individual> = population.to_vec();

    for i in (1..offspring.len()).step_by(2) {
        if rng.gen::<f64>() < cxpb {
            let (left, right) = offspring.split_at_mut(i);
            let a = &mut left[i - 1];
            let b = &mut right[0];
            cx_two_point(&mut a.genes, &mut b.genes, rng);
            a.invalidate();
            b.invalidate();
        }
    }

    for ind in offspring.iter_mut() {
        if rng.gen::<f64>() < mutpb {
            mut_flip_bit(&mut ind.genes, indpb, rng);
            ind.invalidate();
        }
    }

    offspring
}
