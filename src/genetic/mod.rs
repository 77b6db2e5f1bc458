//! Evolutionary toolbox and the genetic tree selector.
//!
//! An individual is a bit mask over the trees of the forest. The toolbox
//! provides the classic operators (two-point crossover, bit-flip mutation,
//! tournament selection), Pareto utilities and the two archive-based
//! multi-objective selection schemes, SPEA2 and NSGA2. The [`engine`]
//! module wires them to the fitness cache and to the persistence layer.

pub mod operators;
pub mod pareto;
pub mod spea2;
pub mod nsga2;
pub mod engine;

pub use operators::*;
pub use pareto::{ParetoFront, non_dominated_sort, crowding_distance};
pub use spea2::sel_spea2;
pub use nsga2::sel_nsga2;
pub use engine::{GeneticConfig, GeneticSelector, RunOutput, SelectionMethod, SelectionOutcome};

use rand::Rng;

/// A candidate tree mask
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    /// One gene per tree; `true` keeps the tree
    pub genes: Vec<bool>,
    /// Raw objective values, `None` until evaluated
    pub fitness: Option<Vec<f64>>,
}

impl Individual {
    pub fn new(genes: Vec<bool>) -> Self {
        Individual { genes, fitness: None }
    }

    /// Each gene drawn uniformly from {0, 1}
    pub fn random<R: Rng + ?Sized>(n_genes: usize, rng: &mut R) -> Self {
        Individual::new((0..n_genes).map(|_| rng.gen_bool(0.5)).collect())
    }

    /// Parse a bitstring such as `"01101"`
    pub fn from_key(key: &str) -> Result<Self, String> {
        let genes = key.chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(format!("Invalid gene '{}' in individual '{}'", other, key)),
            })
            .collect::<Result<Vec<bool>, String>>()?;
        Ok(Individual::new(genes))
    }

    /// Bitstring used as cache key and in every persisted bank
    pub fn key(&self) -> String {
        self.genes.iter().map(|&g| if g { '1' } else { '0' }).collect()
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Number of kept trees
    pub fn count_ones(&self) -> usize {
        self.genes.iter().filter(|&&g| g).count()
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Fitness values, or an empty slice when not evaluated
    pub fn values(&self) -> &[f64] {
        self.fitness.as_deref().unwrap_or(&[])
    }

    pub fn invalidate(&mut self) {
        self.fitness = None;
    }
}

/// Squared Euclidean distance between two fitness vectors
pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_key_round_trip() {
        let ind = Individual::from_key("01101").unwrap();
        assert_eq!(ind.genes, vec![false, true, true, false, true]);
        assert_eq!(ind.key(), "01101");
        assert_eq!(ind.count_ones(), 3);
        assert!(!ind.is_evaluated());
        assert!(ind.values().is_empty());
    }

    #[test]
    fn test_invalid_key() {
        assert!(Individual::from_key("01a1").is_err());
    }

    #[test]
    fn test_random_individual_is_seeded() {
        let mut a = ChaCha8Rng::seed_from_u64(1313);
        let mut b = ChaCha8Rng::seed_from_u64(1313);
        let x = Individual::random(64, &mut a);
        let y = Individual::random(64, &mut b);
        assert_eq!(x, y);
        assert_eq!(x.len(), 64);
        // 64 fair coin flips are never all equal in practice.
        assert!(x.count_ones() > 0 && x.count_ones() < 64);
    }
}
