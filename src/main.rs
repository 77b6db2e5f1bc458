//! rf-ensemble-pruner - Command Line Interface
//!
//! Evolves tree masks of a Learning-to-Rank random forest and reports on the
//! selected ensembles.

use clap::{Parser, Subcommand, ValueEnum};
use rf_ensemble_pruner::collection::Collection;
use rf_ensemble_pruner::config::ExperimentConfig;
use rf_ensemble_pruner::dataset::{load_baseline, Dataset, Split};
use rf_ensemble_pruner::evaluator::ForestEvaluator;
use rf_ensemble_pruner::forest::RandomForest;
use rf_ensemble_pruner::genetic::{GeneticSelector, SelectionMethod, SelectionOutcome};
use rf_ensemble_pruner::metrics::RankingMetric;
use rf_ensemble_pruner::objective::ObjectiveSet;
use rf_ensemble_pruner::persist::DictPersist;
use rf_ensemble_pruner::report::Analyst;
use rf_ensemble_pruner::timer::Timer;

use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "rf-ensemble-pruner")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Multi-objective genetic selection of random-forest trees for Learning-to-Rank")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the genetic selector on one fold
    Evolve {
        /// Experiment configuration (JSON); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset name
        #[arg(short, long)]
        dataset: Option<String>,

        /// Fold to run
        #[arg(short, long, default_value = "1")]
        fold: String,

        /// Selection scheme
        #[arg(short, long, value_enum)]
        method: Option<Method>,

        /// Comma separated objectives: precision, risk, feature, trisk
        #[arg(short, long)]
        objectives: Option<String>,

        /// Effectiveness metric: ndcg, ndcg@<k> or map
        #[arg(long)]
        metric: Option<String>,

        /// Number of generations
        #[arg(short, long)]
        generations: Option<usize>,

        /// Population size
        #[arg(short, long)]
        population: Option<usize>,

        /// Random seed of the selector
        #[arg(short, long)]
        seed: Option<u64>,

        /// Number of trees of the forest
        #[arg(long)]
        trees: Option<usize>,

        /// Suffix of the output file names
        #[arg(long)]
        identifier: Option<String>,

        /// Continue from the last archive written by a previous run of this fold
        #[arg(long)]
        warm_start: bool,

        /// JSON list of masks (bitstrings) placed first in the initial population
        #[arg(long, conflicts_with = "warm_start")]
        initial_population: Option<PathBuf>,

        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Compare the full and the selected ensembles on the test split of each fold
    Report {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Comma separated folds
        #[arg(short, long, default_value = "1,2,3,4,5")]
        folds: String,
    },

    /// Aggregate the fold reports and test the NDCG difference
    FinalReport {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print statistics of a dataset file
    Analyze {
        /// Path to the LETOR file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Method {
    /// Strength Pareto Evolutionary Algorithm 2
    Spea2,
    /// Non-dominated Sorting Genetic Algorithm II
    Nsga2,
}

impl From<Method> for SelectionMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Spea2 => SelectionMethod::Spea2,
            Method::Nsga2 => SelectionMethod::Nsga2,
        }
    }
}

struct EvolveArgs {
    fold: String,
    warm_start: bool,
    initial_population: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evolve {
            config, dataset, fold, method, objectives, metric, generations,
            population, seed, trees, identifier, warm_start, initial_population, quiet,
        } => {
            let mut experiment = load_config(config);
            if let Some(dataset) = dataset {
                experiment.dataset = dataset;
            }
            if let Some(method) = method {
                experiment.method = method.into();
            }
            if let Some(objectives) = objectives {
                experiment.objectives = match objectives.parse::<ObjectiveSet>() {
                    Ok(set) => set,
                    Err(e) => {
                        eprintln!("Error parsing objectives: {}", e);
                        std::process::exit(1);
                    }
                };
            }
            if let Some(metric) = metric {
                experiment.metric = match metric.parse::<RankingMetric>() {
                    Ok(m) => m,
                    Err(e) => {
                        eprintln!("Error parsing metric: {}", e);
                        std::process::exit(1);
                    }
                };
            }
            if let Some(generations) = generations {
                experiment.genetic.max_generations = generations;
            }
            if let Some(population) = population {
                experiment.genetic.population_size = population;
            }
            if let Some(seed) = seed {
                experiment.genetic.seed = seed;
            }
            if let Some(trees) = trees {
                experiment.forest.n_estimators = trees;
            }
            if let Some(identifier) = identifier {
                experiment.identifier = identifier;
            }
            if quiet {
                experiment.genetic.show_progress = false;
            }

            if let Err(e) = run_evolve(&experiment, EvolveArgs { fold, warm_start, initial_population }) {
                eprintln!("Error running selector: {}", e);
                std::process::exit(1);
            }
        }

        Commands::Report { config, folds } => {
            let experiment = load_config(config);
            let folds: Vec<String> = folds.split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            run_report(&experiment, &folds);
        }

        Commands::FinalReport { config } => {
            let experiment = load_config(config);
            run_final_report(&experiment);
        }

        Commands::Analyze { file } => {
            analyze_dataset(&file);
        }
    }
}

fn load_config(path: Option<PathBuf>) -> ExperimentConfig {
    match path {
        None => ExperimentConfig::default(),
        Some(path) => match ExperimentConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        },
    }
}

fn run_evolve(config: &ExperimentConfig, args: EvolveArgs) -> Result<(), String> {
    let fold = args.fold.as_str();
    println!(
        "Dataset {} fold {}: {} over {}",
        config.dataset, fold, config.method, config.objectives
    );

    let mut reading = Timer::new("dataset reading");
    reading.start();
    let train = Dataset::from_file(config.split_path(fold, Split::Train), config.n_features)?;
    let vali = Dataset::from_file(config.split_path(fold, Split::Vali), train.n_features)?;
    let test = Dataset::from_file(config.split_path(fold, Split::Test), train.n_features)?;
    reading.stop();
    log::info!("{}: {:.2}s", reading.name(), reading.total());
    log::debug!("Train split:\n{}", train.statistics());
    log::info!(
        "{} training, {} validation and {} test documents",
        train.len(), vali.len(), test.len()
    );

    let model_path = config.model_path(fold);
    let forest = if model_path.exists() {
        log::info!("Loading forest from {:?}", model_path);
        RandomForest::load(&model_path)?
    } else {
        println!("Training a forest of {} trees...", config.forest.n_estimators);
        let start = Instant::now();
        let forest = RandomForest::fit(&config.forest, &train)?;
        forest.save(&model_path)?;
        println!("Forest trained in {:.2}s, saved to {:?}", start.elapsed().as_secs_f64(), model_path);
        forest
    };

    let baseline = load_baseline(config.baseline_path(fold))?;
    let evaluator = ForestEvaluator::new(
        &forest, &vali, baseline, config.objectives.clone(), config.metric,
    )?
    .with_alpha(config.risk_alpha);

    let output = config.run_output(fold);
    let collection = Collection::load_or_default(&output.collection_path)?;
    println!("Fitness cache: {} chromosomes", collection.len());

    let mut selector = GeneticSelector::new(
        config.method, config.genetic.clone(), &evaluator, collection, output,
    );
    if args.warm_start {
        selector = selector.resume()?;
    }
    if let Some(path) = &args.initial_population {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {:?}: {}", path, e))?;
        let keys: Vec<String> = serde_json::from_str(&json)
            .map_err(|e| format!("Invalid initial population {:?}: {}", path, e))?;
        println!("Seeding {} masks from {:?}", keys.len(), path);
        selector = selector.with_initial_population(&keys)?;
    }

    let start = Instant::now();
    let outcome = selector.evolve(config.genetic.max_generations, args.warm_start)?;
    let elapsed = start.elapsed();

    println!("\n========== Results ==========");
    println!("{}", selector.logbook().stream());
    println!("Evaluations: {}", selector.evaluations());
    println!("Cached chromosomes: {}", selector.collection().len());
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    match outcome {
        SelectionOutcome::ParetoFront(keys) => {
            println!("Pareto front ({} individuals):", keys.len());
            for key in keys {
                println!("  {} ({} trees)", key, key.chars().filter(|&c| c == '1').count());
            }
        }
        SelectionOutcome::Best(key) => {
            println!("Best individual: {} ({} trees)", key, key.chars().filter(|&c| c == '1').count());
        }
    }

    Ok(())
}

fn analyst(config: &ExperimentConfig) -> Analyst {
    Analyst::new(
        config.objectives.clone(),
        config.metric,
        DictPersist::new(config.results_root()),
        config.models_root(),
        config.baselines_dir.join(&config.dataset),
        config.data_dir.clone(),
        &config.dataset,
        config.forest.n_estimators,
        config.forest.seed,
    )
    .with_alpha(config.risk_alpha)
}

fn run_report(config: &ExperimentConfig, folds: &[String]) {
    println!("Reporting folds {} of {}...", folds.join(", "), config.dataset);

    let comparisons = match analyst(config).report(folds) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error building fold reports: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n{:<6} {:>12} {:>12} {:>8} {:>12} {:>12} {:>8}",
        "Fold", "NDCG init", "Risk init", "Trees", "NDCG final", "Risk final", "Trees");
    println!("{}", "-".repeat(76));
    for (fold, c) in folds.iter().zip(&comparisons) {
        println!("{:<6} {:>12.4} {:>12.4} {:>8} {:>12.4} {:>12.4} {:>8}",
            fold,
            c.initial.ndcg_mean, c.initial.georisk, c.initial.n_trees,
            c.pruned.ndcg_mean, c.pruned.georisk, c.pruned.n_trees);
    }
}

fn run_final_report(config: &ExperimentConfig) {
    match analyst(config).final_report() {
        Ok(report) => {
            println!("\n========== Final report: {} ==========", config.dataset);
            println!("{}", report.summary());
        }
        Err(e) => {
            eprintln!("Error building final report: {}", e);
            std::process::exit(1);
        }
    }
}

fn analyze_dataset(path: &PathBuf) {
    println!("Loading dataset from {:?}...", path);

    let dataset = match Dataset::from_file(path, 0) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error loading dataset: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", dataset.statistics());
}
