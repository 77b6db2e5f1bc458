//! Experiment configuration: where the data lives, which objectives are
//! optimised and how the forest and the selector are set up.

use crate::dataset::{fold_path, Split};
use crate::evaluator::DEFAULT_RISK_ALPHA;
use crate::forest::ForestConfig;
use crate::genetic::{GeneticConfig, RunOutput, SelectionMethod};
use crate::metrics::RankingMetric;
use crate::objective::ObjectiveSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Dataset name, also the sub-directory of the data and baseline roots
    pub dataset: String,
    /// Root of `<dataset>/Fold<f>/Norm.<split>.txt`
    pub data_dir: PathBuf,
    /// Root of `<dataset>/Fold<f>/<algorithm>.txt`
    pub baselines_dir: PathBuf,
    /// Baseline ranker compared against during the search
    pub baseline_algorithm: String,
    /// Root of every artefact written
    pub output_dir: PathBuf,
    /// Suffix distinguishing runs in file names
    pub identifier: String,
    pub objectives: ObjectiveSet,
    pub metric: RankingMetric,
    pub method: SelectionMethod,
    /// Minimum feature dimension when parsing the splits
    pub n_features: usize,
    pub risk_alpha: f64,
    pub forest: ForestConfig,
    pub genetic: GeneticConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            dataset: "2003_td_dataset".to_string(),
            data_dir: PathBuf::from("dataset"),
            baselines_dir: PathBuf::from("baselines"),
            baseline_algorithm: "reg".to_string(),
            output_dir: PathBuf::from("output"),
            identifier: String::new(),
            objectives: ObjectiveSet::default(),
            metric: RankingMetric::default(),
            method: SelectionMethod::Spea2,
            n_features: 0,
            risk_alpha: DEFAULT_RISK_ALPHA,
            forest: ForestConfig::default(),
            genetic: GeneticConfig::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let json = std::fs::read_to_string(&path)
            .map_err(|e| format!("Cannot read config {:?}: {}", path.as_ref(), e))?;
        serde_json::from_str(&json)
            .map_err(|e| format!("Invalid config {:?}: {}", path.as_ref(), e))
    }

    pub fn split_path(&self, fold: &str, split: Split) -> PathBuf {
        fold_path(&self.data_dir, &self.dataset, fold, split)
    }

    /// Baseline files of one fold
    pub fn baselines_fold_dir(&self, fold: &str) -> PathBuf {
        self.baselines_dir.join(&self.dataset).join(format!("Fold{}", fold))
    }

    pub fn baseline_path(&self, fold: &str) -> PathBuf {
        self.baselines_fold_dir(fold).join(format!("{}.txt", self.baseline_algorithm))
    }

    /// Root of the dumps of this dataset
    pub fn results_root(&self) -> PathBuf {
        self.output_dir.join(&self.dataset)
    }

    /// Trained forests live under `models/Fold<f>/<n_trees><seed>.json`
    pub fn models_root(&self) -> PathBuf {
        self.results_root().join("models")
    }

    pub fn model_path(&self, fold: &str) -> PathBuf {
        model_path(self.models_root(), fold, self.forest.n_estimators, self.forest.seed)
    }

    pub fn run_output(&self, fold: &str) -> RunOutput {
        RunOutput::new(
            &self.output_dir, &self.dataset, fold, self.method, &self.objectives, self.metric, &self.identifier,
        )
    }
}

pub fn model_path<P: AsRef<Path>>(models_root: P, fold: &str, n_trees: usize, seed: u64) -> PathBuf {
    models_root.as_ref()
        .join(format!("Fold{}", fold))
        .join(format!("{}{}.json", n_trees, seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.genetic.population_size, 75);
        assert_eq!(config.forest.max_leaf_nodes, Some(100));
        assert_eq!(config.objectives.label(), "precisionrisk");
        assert_eq!(config.baseline_path("1"), PathBuf::from("baselines/2003_td_dataset/Fold1/reg.txt"));
        assert_eq!(config.model_path("2"), PathBuf::from("output/2003_td_dataset/models/Fold2/502567.json"));
    }

    #[test]
    fn test_metric_keeps_caches_apart() {
        let ndcg = ExperimentConfig::default();
        let map = ExperimentConfig { metric: RankingMetric::Map, ..Default::default() };
        let (a, b) = (ndcg.run_output("1").collection_path, map.run_output("1").collection_path);
        assert_ne!(a, b);
        assert!(b.to_string_lossy().ends_with("-map.json"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        std::fs::write(
            &path,
            r#"{"dataset": "web10k", "method": "nsga2", "genetic": {"population_size": 20}}"#,
        ).unwrap();

        let config = ExperimentConfig::from_file(&path).unwrap();
        assert_eq!(config.dataset, "web10k");
        assert_eq!(config.method, SelectionMethod::Nsga2);
        assert_eq!(config.genetic.population_size, 20);
        assert_eq!(config.genetic.max_generations, 50);
        assert_eq!(config.forest.n_estimators, 50);
    }

    #[test]
    fn test_objectives_in_file() {
        let config: ExperimentConfig =
            serde_json::from_str(r#"{"objectives": ["precision", "feature"]}"#).unwrap();
        assert_eq!(config.objectives.label(), "precisionfeature");

        let config: ExperimentConfig =
            serde_json::from_str(r#"{"objectives": "precision,risk,trisk"}"#).unwrap();
        assert_eq!(config.objectives.len(), 3);

        assert!(serde_json::from_str::<ExperimentConfig>(r#"{"objectives": []}"#).is_err());
        assert!(serde_json::from_str::<ExperimentConfig>(r#"{"objectives": ["risk", "risk"]}"#).is_err());
    }

    #[test]
    fn test_invalid_objectives_rejected_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        std::fs::write(&path, r#"{"objectives": []}"#).unwrap();
        let err = ExperimentConfig::from_file(&path).unwrap_err();
        assert!(err.contains("Invalid config"));
    }
}
