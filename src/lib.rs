//! Random-forest ensemble pruner
//!
//! Multi-objective genetic selection of the trees of a Learning-to-Rank
//! random forest.
//!
//! # Features
//!
//! - LETOR (SVMlight-style) dataset parsing and fold layout
//! - Maskable regression forest trained on the train split
//! - Ranking metrics (NDCG@10, MAP), GeoRisk, TRisk and paired t-tests
//! - SPEA2 and NSGA2 selection over tree masks
//! - Persistent fitness cache shared between runs
//! - Per-fold reports and a cross-fold final report
//!
//! # Example
//!
//! ```no_run
//! use rf_ensemble_pruner::collection::Collection;
//! use rf_ensemble_pruner::config::ExperimentConfig;
//! use rf_ensemble_pruner::dataset::{load_baseline, Dataset, Split};
//! use rf_ensemble_pruner::evaluator::ForestEvaluator;
//! use rf_ensemble_pruner::forest::RandomForest;
//! use rf_ensemble_pruner::genetic::GeneticSelector;
//!
//! let config = ExperimentConfig::default();
//! let train = Dataset::from_file(config.split_path("1", Split::Train), 0).unwrap();
//! let vali = Dataset::from_file(config.split_path("1", Split::Vali), train.n_features).unwrap();
//! let forest = RandomForest::fit(&config.forest, &train).unwrap();
//! let baseline = load_baseline(config.baseline_path("1")).unwrap();
//!
//! let evaluator = ForestEvaluator::new(
//!     &forest, &vali, baseline, config.objectives.clone(), config.metric,
//! ).unwrap();
//! let mut selector = GeneticSelector::new(
//!     config.method, config.genetic.clone(), &evaluator, Collection::new(), config.run_output("1"),
//! );
//! let outcome = selector.evolve(config.genetic.max_generations, false).unwrap();
//! println!("{:?}", outcome);
//! ```

pub mod dataset;
pub mod forest;
pub mod metrics;
pub mod objective;
pub mod genetic;
pub mod evaluator;
pub mod collection;
pub mod persist;
pub mod logbook;
pub mod timer;
pub mod config;
pub mod report;

pub use collection::Collection;
pub use config::ExperimentConfig;
pub use dataset::Dataset;
pub use evaluator::{Evaluation, FitnessEvaluator, ForestEvaluator};
pub use forest::{ForestConfig, RandomForest};
pub use genetic::{GeneticConfig, GeneticSelector, SelectionMethod, SelectionOutcome};
pub use objective::{Objective, ObjectiveSet};
pub use report::Analyst;
