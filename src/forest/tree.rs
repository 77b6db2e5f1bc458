//! CART regression tree grown best-first.
//!
//! Nodes live in a flat arena; the tree keeps splitting the leaf whose best
//! split reduces the squared error the most until `max_leaf_nodes` is hit or
//! no leaf can be split any further.

use ordered_float::OrderedFloat;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A node of the tree arena
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth parameters shared by every tree of a forest
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    /// Number of candidate features drawn at each split
    pub max_features: usize,
    /// Maximum number of leaves, `None` for unlimited growth
    pub max_leaf_nodes: Option<usize>,
    /// Minimum number of samples in each child
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    improvement: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// A fitted regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Fit a tree on the rows listed in `indices` (duplicates allowed, as
    /// produced by bootstrap sampling).
    pub fn fit(
        features: &[Vec<f64>],
        targets: &[f64],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut nodes = vec![TreeNode::Leaf {
            value: mean_target(targets, &indices),
            n_samples: indices.len(),
        }];

        let mut pending: Vec<(usize, SplitCandidate)> = Vec::new();
        if let Some(split) = best_split(features, targets, &indices, params, rng) {
            pending.push((0, split));
        }

        let mut n_leaves = 1;
        while !pending.is_empty() {
            if params.max_leaf_nodes.map(|max| n_leaves >= max).unwrap_or(false) {
                break;
            }

            let best_pos = pending.iter()
                .enumerate()
                .max_by_key(|(_, (_, split))| OrderedFloat(split.improvement))
                .map(|(pos, _)| pos)
                .unwrap_or(0);
            let (node_idx, split) = pending.swap_remove(best_pos);

            let left_idx = nodes.len();
            nodes.push(TreeNode::Leaf {
                value: mean_target(targets, &split.left),
                n_samples: split.left.len(),
            });
            let right_idx = nodes.len();
            nodes.push(TreeNode::Leaf {
                value: mean_target(targets, &split.right),
                n_samples: split.right.len(),
            });

            nodes[node_idx] = TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: left_idx,
                right: right_idx,
            };
            n_leaves += 1;

            for (child, child_indices) in [(left_idx, split.left), (right_idx, split.right)] {
                if let Some(child_split) = best_split(features, targets, &child_indices, params, rng) {
                    pending.push((child, child_split));
                }
            }
        }

        RegressionTree { nodes }
    }

    /// Predict the target of a single row
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, TreeNode::Leaf { .. })).count()
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

fn mean_target(targets: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64
}

/// Find the split with the largest squared-error reduction among a random
/// subset of features.
fn best_split(
    features: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<SplitCandidate> {
    let n = indices.len();
    let min_leaf = params.min_samples_leaf.max(1);
    if n < 2 * min_leaf {
        return None;
    }

    let n_features = features.first().map(|r| r.len()).unwrap_or(0);
    if n_features == 0 {
        return None;
    }

    let total_sum: f64 = indices.iter().map(|&i| targets[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| targets[i] * targets[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;
    if parent_sse <= 1e-12 {
        return None;
    }

    let candidates = sample(rng, n_features, params.max_features.clamp(1, n_features));

    let mut best: Option<(usize, f64, f64)> = None;
    let mut column: Vec<(f64, f64)> = Vec::with_capacity(n);

    for feature in candidates.iter() {
        column.clear();
        column.extend(indices.iter().map(|&i| (features[i][feature], targets[i])));
        column.sort_by_key(|&(value, _)| OrderedFloat(value));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for i in 1..n {
            let (prev_value, prev_target) = column[i - 1];
            left_sum += prev_target;
            left_sq += prev_target * prev_target;

            if i < min_leaf || n - i < min_leaf {
                continue;
            }
            let value = column[i].0;
            if value <= prev_value {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let left_sse = left_sq - left_sum * left_sum / i as f64;
            let right_sse = right_sq - right_sum * right_sum / (n - i) as f64;
            let improvement = parent_sse - left_sse - right_sse;

            if improvement > 1e-12 && best.map(|(_, _, b)| improvement > b).unwrap_or(true) {
                let mut threshold = (prev_value + value) / 2.0;
                if threshold >= value {
                    threshold = prev_value;
                }
                best = Some((feature, threshold, improvement));
            }
        }
    }

    let (feature, threshold, improvement) = best?;
    let (left, right): (Vec<usize>, Vec<usize>) = indices.iter()
        .partition(|&&i| features[i][feature] <= threshold);

    Some(SplitCandidate {
        feature,
        threshold,
        improvement,
        left,
        right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let features: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 0.0]).collect();
        let targets: Vec<f64> = (0..20).map(|i| if i < 10 { 1.0 } else { 5.0 }).collect();
        (features, targets)
    }

    #[test]
    fn test_tree_learns_step_function() {
        let (features, targets) = step_data();
        let params = TreeParams { max_features: 2, max_leaf_nodes: Some(10), min_samples_leaf: 1 };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let tree = RegressionTree::fit(&features, &targets, (0..20).collect(), &params, &mut rng);

        assert_eq!(tree.predict(&[3.0, 0.0]), 1.0);
        assert_eq!(tree.predict(&[15.0, 0.0]), 5.0);
        // A single split separates the two plateaus perfectly.
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn test_max_leaf_nodes_is_respected() {
        let features: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..50).map(|i| (i * i) as f64).collect();
        let params = TreeParams { max_features: 1, max_leaf_nodes: Some(4), min_samples_leaf: 1 };
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let tree = RegressionTree::fit(&features, &targets, (0..50).collect(), &params, &mut rng);
        assert_eq!(tree.n_leaves(), 4);
        assert_eq!(tree.n_nodes(), 7);
    }

    #[test]
    fn test_constant_target_stays_a_leaf() {
        let features: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();
        let targets = vec![2.0; 5];
        let params = TreeParams { max_features: 1, max_leaf_nodes: None, min_samples_leaf: 1 };
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let tree = RegressionTree::fit(&features, &targets, (0..5).collect(), &params, &mut rng);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict(&[100.0]), 2.0);
    }

    #[test]
    fn test_min_samples_leaf() {
        let (features, targets) = step_data();
        let params = TreeParams { max_features: 2, max_leaf_nodes: None, min_samples_leaf: 15 };
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let tree = RegressionTree::fit(&features, &targets, (0..20).collect(), &params, &mut rng);
        assert_eq!(tree.n_leaves(), 1);
    }
}
