//! Random regression forest with tree masking.
//!
//! The forest is the ranking model whose trees the genetic selector prunes:
//! every prediction can be restricted to the trees whose bit is set in a
//! mask, which is how an individual of the search is scored.

pub mod tree;

pub use tree::{RegressionTree, TreeNode, TreeParams};

use crate::dataset::Dataset;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Forest training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees (and therefore of genes per individual)
    pub n_estimators: usize,
    /// Fraction of the features drawn as split candidates
    pub max_features: f64,
    /// Maximum number of leaves per tree
    pub max_leaf_nodes: Option<usize>,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Train each tree on a bootstrap sample
    pub bootstrap: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            n_estimators: 50,
            max_features: 0.3,
            max_leaf_nodes: Some(100),
            min_samples_leaf: 1,
            bootstrap: true,
            seed: 2567,
        }
    }
}

/// A fitted forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Train the forest on a dataset, using the relevance labels as
    /// regression targets. Trees are trained in parallel.
    pub fn fit(config: &ForestConfig, dataset: &Dataset) -> Result<Self, String> {
        if dataset.is_empty() {
            return Err("Cannot train a forest on an empty dataset".to_string());
        }
        if dataset.n_features == 0 {
            return Err("Cannot train a forest without features".to_string());
        }
        if config.n_estimators == 0 {
            return Err("n_estimators must be at least 1".to_string());
        }
        if !(config.max_features > 0.0 && config.max_features <= 1.0) {
            return Err(format!("max_features must be in (0, 1], got {}", config.max_features));
        }
        if config.max_leaf_nodes.map(|m| m < 2).unwrap_or(false) {
            return Err("max_leaf_nodes must be at least 2".to_string());
        }

        let n_samples = dataset.len();
        let params = TreeParams {
            max_features: ((dataset.n_features as f64 * config.max_features) as usize).max(1),
            max_leaf_nodes: config.max_leaf_nodes,
            min_samples_leaf: config.min_samples_leaf,
        };

        log::info!(
            "Training forest: {} trees, {} samples, {} features ({} per split)",
            config.n_estimators, n_samples, dataset.n_features, params.max_features
        );

        let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
        let tree_seeds: Vec<u64> = (0..config.n_estimators).map(|_| master_rng.gen()).collect();

        let trees: Vec<RegressionTree> = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let indices: Vec<usize> = if config.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                RegressionTree::fit(&dataset.features, &dataset.labels, indices, &params, &mut rng)
            })
            .collect();

        Ok(RandomForest {
            trees,
            n_features: dataset.n_features,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Mean prediction over every tree
    pub fn predict(&self, x: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }

    /// Mean prediction over the trees selected by `mask`
    pub fn predict_masked(&self, x: &[f64], mask: &[bool]) -> Result<f64, String> {
        let selected = self.check_mask(mask)?;
        Ok(self.masked_mean(x, mask, selected))
    }

    /// Masked predictions for every row of a dataset
    pub fn predict_dataset_masked(&self, dataset: &Dataset, mask: &[bool]) -> Result<Vec<f64>, String> {
        if dataset.n_features != self.n_features {
            return Err(format!(
                "Dataset has {} features, forest was trained on {}",
                dataset.n_features, self.n_features
            ));
        }
        let selected = self.check_mask(mask)?;
        Ok(dataset.features.iter().map(|x| self.masked_mean(x, mask, selected)).collect())
    }

    fn check_mask(&self, mask: &[bool]) -> Result<usize, String> {
        if mask.len() != self.trees.len() {
            return Err(format!("Mask has {} bits, forest has {} trees", mask.len(), self.trees.len()));
        }
        let selected = mask.iter().filter(|&&b| b).count();
        if selected == 0 {
            return Err("Mask selects no tree".to_string());
        }
        Ok(selected)
    }

    fn masked_mean(&self, x: &[f64], mask: &[bool], selected: usize) -> f64 {
        self.trees.iter()
            .zip(mask)
            .filter(|(_, &keep)| keep)
            .map(|(tree, _)| tree.predict(x))
            .sum::<f64>() / selected as f64
    }

    /// Persist the model as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Cannot create {:?}: {}", parent, e))?;
        }
        let json = serde_json::to_string(self)
            .map_err(|e| format!("Cannot serialize forest: {}", e))?;
        std::fs::write(&path, json)
            .map_err(|e| format!("Cannot write {:?}: {}", path.as_ref(), e))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let json = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read {:?}: {}", path.as_ref(), e))?;
        serde_json::from_str(&json)
            .map_err(|e| format!("Invalid forest file {:?}: {}", path.as_ref(), e))
    }
}
