//! Fitness of a tree mask.
//!
//! An individual is scored by restricting the forest to the trees it keeps,
//! ranking the validation queries with the pruned ensemble and comparing the
//! per-query effectiveness with a baseline ranker.

use crate::dataset::{Dataset, QueryGroup};
use crate::forest::RandomForest;
use crate::metrics::{self, RankingMetric};
use crate::objective::{Objective, ObjectiveSet};
use serde::{Deserialize, Serialize};

/// Risk sensitivity used by GeoRisk and TRisk
pub const DEFAULT_RISK_ALPHA: f64 = 5.0;

/// Every measure computed for one mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Effectiveness of every validation query
    pub ndcg: Vec<f64>,
    /// Mean of `ndcg`
    pub precision: f64,
    /// GeoRisk of the pruned model next to the baseline
    pub risk: f64,
    /// Number of kept trees
    pub feature: usize,
    /// TRisk t statistic against the baseline
    pub trisk: f64,
    /// Risk-adjusted per-query deltas behind `trisk`
    pub trisk_per_query: Vec<f64>,
}

impl Evaluation {
    /// Fitness of a mask that keeps no tree: nothing is ranked, every
    /// measure is zero and the tree count is the full gene count.
    pub fn empty_mask(n_genes: usize) -> Self {
        Evaluation {
            ndcg: Vec::new(),
            precision: 0.0,
            risk: 0.0,
            feature: n_genes,
            trisk: 0.0,
            trisk_per_query: Vec::new(),
        }
    }

    pub fn value(&self, objective: Objective) -> f64 {
        match objective {
            Objective::Precision => self.precision,
            Objective::Risk => self.risk,
            Objective::Feature => self.feature as f64,
            Objective::TRisk => self.trisk,
        }
    }

    /// Raw values in the order of the objective set
    pub fn fitness(&self, objectives: &ObjectiveSet) -> Vec<f64> {
        objectives.objectives().iter().map(|&o| self.value(o)).collect()
    }
}

/// Anything able to score a mask. Evaluations run on several threads.
pub trait FitnessEvaluator: Sync {
    fn evaluate(&self, mask: &[bool]) -> Result<Evaluation, String>;

    fn objectives(&self) -> &ObjectiveSet;

    /// Length of the masks this evaluator accepts
    fn n_genes(&self) -> usize;
}

/// Scores masks of a trained forest on a validation split
pub struct ForestEvaluator<'a> {
    forest: &'a RandomForest,
    dataset: &'a Dataset,
    queries: Vec<QueryGroup>,
    baseline: Vec<f64>,
    objectives: ObjectiveSet,
    metric: RankingMetric,
    alpha: f64,
}

impl<'a> ForestEvaluator<'a> {
    pub fn new(
        forest: &'a RandomForest,
        dataset: &'a Dataset,
        baseline: Vec<f64>,
        objectives: ObjectiveSet,
        metric: RankingMetric,
    ) -> Result<Self, String> {
        let queries = dataset.queries();
        if baseline.len() != queries.len() {
            return Err(format!(
                "Baseline has {} values but {} has {} queries",
                baseline.len(), dataset.name, queries.len()
            ));
        }
        if dataset.n_features != forest.n_features() {
            return Err(format!(
                "{} has {} features, forest was trained on {}",
                dataset.name, dataset.n_features, forest.n_features()
            ));
        }

        Ok(ForestEvaluator {
            forest,
            dataset,
            queries,
            baseline,
            objectives,
            metric,
            alpha: DEFAULT_RISK_ALPHA,
        })
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn metric(&self) -> RankingMetric {
        self.metric
    }
}

impl FitnessEvaluator for ForestEvaluator<'_> {
    fn evaluate(&self, mask: &[bool]) -> Result<Evaluation, String> {
        if mask.len() != self.forest.n_trees() {
            return Err(format!("Mask has {} bits, forest has {} trees", mask.len(), self.forest.n_trees()));
        }
        let feature = mask.iter().filter(|&&b| b).count();
        if feature == 0 {
            return Ok(Evaluation::empty_mask(mask.len()));
        }

        let scores = self.forest.predict_dataset_masked(self.dataset, mask)?;
        let ndcg = self.metric.per_query(&scores, &self.dataset.labels, &self.queries);
        let precision = metrics::mean(&ndcg);

        let matrix: Vec<Vec<f64>> = self.baseline.iter()
            .zip(&ndcg)
            .map(|(&b, &m)| vec![b, m])
            .collect();
        let risk = metrics::geo_risk(&matrix, self.alpha)?[1];
        let (trisk, trisk_per_query) = metrics::t_risk(&ndcg, &self.baseline, self.alpha)?;

        Ok(Evaluation { ndcg, precision, risk, feature, trisk, trisk_per_query })
    }

    fn objectives(&self) -> &ObjectiveSet {
        &self.objectives
    }

    fn n_genes(&self) -> usize {
        self.forest.n_trees()
    }
}

/// Score several masks side by side on `dataset`.
///
/// Builds one query x system matrix holding every baseline column followed
/// by one column per mask, and returns for each mask its per-query
/// effectiveness and the GeoRisk of its column.
pub fn evaluate_compare(
    forest: &RandomForest,
    dataset: &Dataset,
    metric: RankingMetric,
    masks: &[Vec<bool>],
    baselines: &[Vec<f64>],
    alpha: f64,
) -> Result<Vec<(Vec<f64>, f64)>, String> {
    let queries = dataset.queries();
    for (i, baseline) in baselines.iter().enumerate() {
        if baseline.len() != queries.len() {
            return Err(format!(
                "Baseline #{} has {} values but {} has {} queries",
                i, baseline.len(), dataset.name, queries.len()
            ));
        }
    }

    let per_mask: Vec<Vec<f64>> = masks.iter()
        .map(|mask| {
            let scores = forest.predict_dataset_masked(dataset, mask)?;
            Ok(metric.per_query(&scores, &dataset.labels, &queries))
        })
        .collect::<Result<_, String>>()?;

    let matrix: Vec<Vec<f64>> = (0..queries.len())
        .map(|q| {
            baselines.iter()
                .map(|b| b[q])
                .chain(per_mask.iter().map(|m| m[q]))
                .collect()
        })
        .collect();
    let risks = metrics::geo_risk(&matrix, alpha)?;

    Ok(per_mask.into_iter()
        .enumerate()
        .map(|(i, ndcg)| (ndcg, risks[baselines.len() + i]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestConfig;

    fn toy_dataset() -> Dataset {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        let mut qids = Vec::new();
        for q in 0..4 {
            for d in 0..6 {
                let x = d as f64;
                features.push(vec![x, (q * d) as f64 % 3.0]);
                labels.push(if d >= 4 { 2.0 } else if d >= 2 { 1.0 } else { 0.0 });
                qids.push(format!("{}", q));
            }
        }
        Dataset::from_rows(features, labels, qids).unwrap()
    }

    fn toy_forest(dataset: &Dataset) -> RandomForest {
        let config = ForestConfig { n_estimators: 6, max_features: 1.0, ..Default::default() };
        RandomForest::fit(&config, dataset).unwrap()
    }

    #[test]
    fn test_evaluate_full_mask() {
        let dataset = toy_dataset();
        let forest = toy_forest(&dataset);
        let objectives: ObjectiveSet = "precision,risk,feature,trisk".parse().unwrap();
        let evaluator = ForestEvaluator::new(&forest, &dataset, vec![0.5; 4], objectives.clone(), RankingMetric::default()).unwrap();

        let eval = evaluator.evaluate(&[true; 6]).unwrap();
        assert_eq!(eval.ndcg.len(), 4);
        assert_eq!(eval.feature, 6);
        assert!(eval.precision > 0.5 && eval.precision <= 1.0);
        assert!(eval.risk > 0.0);
        assert_eq!(eval.trisk_per_query.len(), 4);

        let fitness = eval.fitness(&objectives);
        assert_eq!(fitness, vec![eval.precision, eval.risk, 6.0, eval.trisk]);
    }

    #[test]
    fn test_empty_mask_is_not_ranked() {
        let dataset = toy_dataset();
        let forest = toy_forest(&dataset);
        let evaluator = ForestEvaluator::new(&forest, &dataset, vec![0.5; 4], "precision".parse().unwrap(), RankingMetric::default()).unwrap();

        let eval = evaluator.evaluate(&[false; 6]).unwrap();
        assert_eq!(eval, Evaluation::empty_mask(6));
        assert_eq!(eval.value(Objective::Feature), 6.0);
    }

    #[test]
    fn test_baseline_length_is_checked() {
        let dataset = toy_dataset();
        let forest = toy_forest(&dataset);
        let result = ForestEvaluator::new(&forest, &dataset, vec![0.5; 3], "precision".parse().unwrap(), RankingMetric::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_evaluate_compare_columns() {
        let dataset = toy_dataset();
        let forest = toy_forest(&dataset);
        let masks = vec![vec![true; 6], vec![true, false, true, false, true, false]];
        let baselines = vec![vec![0.4; 4], vec![0.6; 4]];

        let results = evaluate_compare(&forest, &dataset, RankingMetric::default(), &masks, &baselines, 5.0).unwrap();
        assert_eq!(results.len(), 2);
        for (ndcg, risk) in &results {
            assert_eq!(ndcg.len(), 4);
            assert!(risk.is_finite());
        }

        assert!(evaluate_compare(&forest, &dataset, RankingMetric::default(), &masks, &[vec![0.4; 2]], 5.0).is_err());
    }
}
