//! Fold analysis of finished runs.
//!
//! For every fold the best mask found by the selector is compared with the
//! unpruned forest on the test split, next to every baseline ranker of the
//! fold. A final report pools the folds and tests whether pruning changed
//! the per-query effectiveness significantly.

use crate::config::model_path;
use crate::dataset::{fold_path, load_baseline_dir, Dataset, Split};
use crate::evaluator::{evaluate_compare, DEFAULT_RISK_ALPHA};
use crate::forest::RandomForest;
use crate::genetic::engine::BankEntry;
use crate::genetic::Individual;
use crate::metrics::{self, RankingMetric};
use crate::objective::ObjectiveSet;
use crate::persist::DictPersist;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Significance level of the final t-test
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Test-split effectiveness of one mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskReport {
    pub ndcg: Vec<f64>,
    pub georisk: f64,
    pub n_trees: usize,
    pub ndcg_mean: f64,
}

/// Unpruned (`initial`) against pruned (`final`) forest on one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldComparison {
    pub initial: MaskReport,
    #[serde(rename = "final")]
    pub pruned: MaskReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub ndcg_mean: f64,
    pub georisk_mean: f64,
    pub n_trees_mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub folds: Vec<String>,
    pub initial: SummaryStats,
    #[serde(rename = "final")]
    pub pruned: SummaryStats,
    pub p_value: f64,
    pub ndcg_differs: bool,
}

impl FinalReport {
    pub fn summary(&self) -> String {
        format!(
            "Folds: {}\n\
             Initial: NDCG {:.4}, GeoRisk {:.4}, {:.1} trees\n\
             Final:   NDCG {:.4}, GeoRisk {:.4}, {:.1} trees\n\
             Paired t-test p = {:.4} ({})",
            self.folds.join(", "),
            self.initial.ndcg_mean, self.initial.georisk_mean, self.initial.n_trees_mean,
            self.pruned.ndcg_mean, self.pruned.georisk_mean, self.pruned.n_trees_mean,
            self.p_value,
            if self.ndcg_differs { "significant" } else { "not significant" }
        )
    }
}

/// Evolution of one objective across the archives of a run
#[derive(Debug, Clone, Serialize)]
struct EvolutionRow {
    gen: usize,
    max: f64,
    mean: f64,
    min: f64,
    std: f64,
    var: f64,
}

pub struct Analyst {
    objectives: ObjectiveSet,
    metric: RankingMetric,
    persist: DictPersist,
    models_root: PathBuf,
    baselines_root: PathBuf,
    data_dir: PathBuf,
    dataset: String,
    n_trees: usize,
    seed: u64,
    alpha: f64,
}

impl Analyst {
    /// `persist` is rooted where the selector wrote its dumps and
    /// `baselines_root` holds one `Fold<f>` directory of baselines per fold.
    #[allow(clippy::too_many_arguments)]
    pub fn new<P: AsRef<Path>>(
        objectives: ObjectiveSet,
        metric: RankingMetric,
        persist: DictPersist,
        models_root: P,
        baselines_root: P,
        data_dir: P,
        dataset: &str,
        n_trees: usize,
        seed: u64,
    ) -> Self {
        Analyst {
            objectives,
            metric,
            persist,
            models_root: models_root.as_ref().to_path_buf(),
            baselines_root: baselines_root.as_ref().to_path_buf(),
            data_dir: data_dir.as_ref().to_path_buf(),
            dataset: dataset.to_string(),
            n_trees,
            seed,
            alpha: DEFAULT_RISK_ALPHA,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn report(&self, folds: &[String]) -> Result<Vec<FoldComparison>, String> {
        folds.iter()
            .map(|fold| {
                log::info!("Analysing fold {}", fold);
                let comparison = self.process_fold(fold)?;
                self.write_evolution(fold)?;
                Ok(comparison)
            })
            .collect()
    }

    fn process_fold(&self, fold: &str) -> Result<FoldComparison, String> {
        let forest = RandomForest::load(model_path(&self.models_root, fold, self.n_trees, self.seed))?;
        let bank: BTreeMap<String, BankEntry> = self.persist.load(&format!("Fold{}/population_bank", fold))?;
        let best = self.best_individual(fold, &bank)?;

        let mask = Individual::from_key(&best)?.genes;
        if mask.len() != forest.n_trees() {
            return Err(format!("Best mask has {} genes, model has {} trees", mask.len(), forest.n_trees()));
        }

        let test = Dataset::from_file(fold_path(&self.data_dir, &self.dataset, fold, Split::Test), forest.n_features())?;
        let baselines: Vec<Vec<f64>> = load_baseline_dir(self.baselines_root.join(format!("Fold{}", fold)))?
            .into_iter()
            .map(|(_, values)| values)
            .collect();
        log::debug!("Fold {}: {} baselines, best mask keeps {} trees", fold, baselines.len(), mask.iter().filter(|&&b| b).count());

        let masks = vec![vec![true; forest.n_trees()], mask];
        let mut results = evaluate_compare(&forest, &test, self.metric, &masks, &baselines, self.alpha)?.into_iter();
        let (initial, pruned) = match (results.next(), results.next()) {
            (Some(i), Some(p)) => (i, p),
            _ => return Err("Comparison returned fewer than two masks".to_string()),
        };

        let to_report = |(ndcg, georisk): (Vec<f64>, f64), n_trees: usize| {
            let ndcg_mean = metrics::mean(&ndcg);
            MaskReport { ndcg, georisk, n_trees, ndcg_mean }
        };
        let comparison = FoldComparison {
            initial: to_report(initial, best.len()),
            pruned: to_report(pruned, best.matches('1').count()),
        };

        self.persist.save(&comparison, &format!("Fold{}/fold_comparison", fold))?;
        Ok(comparison)
    }

    /// With two objectives, the front member with the highest mean NDCG on
    /// the validation split; otherwise the stored best individual.
    fn best_individual(&self, fold: &str, bank: &BTreeMap<String, BankEntry>) -> Result<String, String> {
        if self.objectives.len() != 2 {
            return self.persist.load(&format!("Fold{}/best_ind", fold));
        }

        let front: Vec<String> = self.persist.load(&format!("Fold{}/pareto_front", fold))?;
        front.into_iter()
            .max_by_key(|key| OrderedFloat(bank.get(key).map(|e| metrics::mean(&e.ndcg)).unwrap_or(f64::NEG_INFINITY)))
            .ok_or_else(|| format!("Empty Pareto front for fold {}", fold))
    }

    /// `<objective>_evolution.csv` for every objective, plus the mean NDCG
    fn write_evolution(&self, fold: &str) -> Result<(), String> {
        let archive_bank: BTreeMap<usize, Vec<String>> = self.persist.load(&format!("Fold{}/archive_bank", fold))?;
        let bank: BTreeMap<String, BankEntry> = self.persist.load(&format!("Fold{}/population_bank", fold))?;

        let mut series: Vec<String> = self.objectives.names().iter().map(|s| s.to_string()).collect();
        series.push("ndcg".to_string());

        for name in &series {
            let value_of = |entry: &BankEntry| {
                if name == "ndcg" {
                    Some(metrics::mean(&entry.ndcg))
                } else {
                    entry.fitness.get(name).copied()
                }
            };

            let path = self.persist.path().join(format!("Fold{}", fold)).join(format!("{}_evolution.csv", name));
            let file = File::create(&path)
                .map_err(|e| format!("Cannot create {:?}: {}", path, e))?;
            let mut writer = csv::Writer::from_writer(file);

            for (&gen, keys) in &archive_bank {
                let values: Vec<f64> = keys.iter()
                    .filter_map(|k| bank.get(k))
                    .filter_map(value_of)
                    .collect();
                if values.is_empty() {
                    continue;
                }
                let row = EvolutionRow {
                    gen,
                    max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    mean: metrics::mean(&values),
                    min: values.iter().copied().fold(f64::INFINITY, f64::min),
                    std: metrics::std_dev(&values),
                    var: metrics::variance(&values),
                };
                writer.serialize(&row).map_err(|e| format!("CSV write error: {}", e))?;
            }
            writer.flush().map_err(|e| format!("CSV flush error: {}", e))?;
        }

        Ok(())
    }

    /// Pool every `Fold*/fold_comparison.json` under the dump root
    pub fn final_report(&self) -> Result<FinalReport, String> {
        let entries = std::fs::read_dir(self.persist.path())
            .map_err(|e| format!("Cannot read {:?}: {}", self.persist.path(), e))?;
        let mut folds: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().join("fold_comparison.json").exists())
            .filter_map(|entry| entry.file_name().to_str().map(|s| s.to_string()))
            .filter(|name| name.starts_with("Fold"))
            .collect();
        folds.sort();

        if folds.is_empty() {
            return Err(format!("No fold comparison found under {:?}", self.persist.path()));
        }

        let comparisons: Vec<FoldComparison> = folds.iter()
            .map(|fold| self.persist.load(&format!("{}/fold_comparison", fold)))
            .collect::<Result<_, String>>()?;

        let initial_ndcg: Vec<f64> = comparisons.iter().flat_map(|c| c.initial.ndcg.iter().copied()).collect();
        let final_ndcg: Vec<f64> = comparisons.iter().flat_map(|c| c.pruned.ndcg.iter().copied()).collect();
        let p_value = metrics::paired_t_test(&initial_ndcg, &final_ndcg)?;

        let report = FinalReport {
            folds,
            initial: summarise(&comparisons, |c| &c.initial),
            pruned: summarise(&comparisons, |c| &c.pruned),
            p_value,
            ndcg_differs: p_value < SIGNIFICANCE_LEVEL,
        };

        self.persist.save(&report, "final_report")?;
        Ok(report)
    }
}

fn summarise(comparisons: &[FoldComparison], pick: impl Fn(&FoldComparison) -> &MaskReport) -> SummaryStats {
    let reports: Vec<&MaskReport> = comparisons.iter().map(pick).collect();
    SummaryStats {
        ndcg_mean: metrics::mean(&reports.iter().map(|r| r.ndcg_mean).collect::<Vec<_>>()),
        georisk_mean: metrics::mean(&reports.iter().map(|r| r.georisk).collect::<Vec<_>>()),
        n_trees_mean: metrics::mean(&reports.iter().map(|r| r.n_trees as f64).collect::<Vec<_>>()),
    }
}
