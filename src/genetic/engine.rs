//! The genetic tree selector.
//!
//! Runs SPEA2 or NSGA2 over tree masks. Fitness goes through the shared
//! [`Collection`] so a mask is never ranked twice, and the state of the run
//! (banks of chromosomes, archives, Pareto fronts, logbook) is dumped to
//! disk for the fold reports.

use super::pareto::unique_keys;
use super::{sel_nsga2, sel_spea2, sel_tournament, var_and, Individual, ParetoFront};
use crate::collection::{base_file_name, Collection};
use crate::evaluator::{Evaluation, FitnessEvaluator};
use crate::logbook::Logbook;
use crate::metrics::RankingMetric;
use crate::objective::ObjectiveSet;
use crate::persist::DictPersist;
use crate::timer::{Phase, PhaseTimers};
use indicatif::{ProgressBar, ProgressStyle};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

/// Multi-objective environmental selection scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    Spea2,
    Nsga2,
}

impl SelectionMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SelectionMethod::Spea2 => "spea2",
            SelectionMethod::Nsga2 => "nsga2",
        }
    }
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SelectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spea2" => Ok(SelectionMethod::Spea2),
            "nsga2" => Ok(SelectionMethod::Nsga2),
            other => Err(format!("Unknown selection method '{}' (expected spea2 or nsga2)", other)),
        }
    }
}

/// Genetic selector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    /// Population (and archive) size
    pub population_size: usize,
    /// Number of generations of a run
    pub max_generations: usize,
    /// Probability of mating a pair
    pub crossover_prob: f64,
    /// Probability of mutating an offspring
    pub mutation_prob: f64,
    /// Per-gene flip probability of a mutation
    pub gene_mutation_prob: f64,
    /// Tournament size for the mating pool
    pub tournament_size: usize,
    /// Random seed
    pub seed: u64,
    /// Write the collection every this many generations (0 disables)
    pub persist_every: usize,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        GeneticConfig {
            population_size: 75,
            max_generations: 50,
            crossover_prob: 0.9,
            mutation_prob: 0.2,
            gene_mutation_prob: 0.2,
            tournament_size: 2,
            seed: 2567,
            persist_every: 5,
            show_progress: true,
        }
    }
}

/// Where a run writes its artefacts
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Dumps rooted at `<output_dir>/<dataset>`
    pub persist: DictPersist,
    pub fold: String,
    pub collection_path: PathBuf,
    pub logbook_path: PathBuf,
}

impl RunOutput {
    pub fn new<P: AsRef<Path>>(
        output_dir: P,
        dataset: &str,
        fold: &str,
        method: SelectionMethod,
        objectives: &ObjectiveSet,
        metric: RankingMetric,
        identifier: &str,
    ) -> Self {
        let root = output_dir.as_ref().join(dataset);
        let fold_dir = root.join(format!("Fold{}", fold));
        let collection_path = fold_dir.join(base_file_name(dataset, fold, method, objectives, metric, identifier));
        let logbook_path = fold_dir.join(format!(
            "result{}fold{}{}{}.json",
            method.name(), fold, objectives.label(), identifier
        ));

        RunOutput {
            persist: DictPersist::new(root),
            fold: fold.to_string(),
            collection_path,
            logbook_path,
        }
    }

    /// Persist name of a per-fold artefact
    pub fn name(&self, artefact: &str) -> String {
        format!("Fold{}/{}", self.fold, artefact)
    }

    /// `<collection file stem>topind.json`
    pub fn top_individual_path(&self) -> PathBuf {
        let stem = self.collection_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.collection_path.with_file_name(format!("{}topind.json", stem))
    }
}

/// Result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectionOutcome {
    /// Keys of the final Pareto front (several objectives)
    ParetoFront(Vec<String>),
    /// Key of the best individual (single objective)
    Best(String),
}

/// A chromosome as recorded in the population bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankEntry {
    /// Raw objective values by objective name
    pub fitness: BTreeMap<String, f64>,
    /// Per-query effectiveness on the validation split
    pub ndcg: Vec<f64>,
    /// Generation in which the chromosome first appeared
    pub generated: usize,
}

#[derive(Debug, Clone, Serialize)]
struct TopIndividual {
    key: String,
    value: f64,
}

#[derive(Debug, Clone, Serialize)]
struct RunMetadata {
    method: SelectionMethod,
    objectives: Vec<String>,
    n_genes: usize,
    config: GeneticConfig,
    generations_run: usize,
    evaluations: usize,
    collection_size: usize,
    started_at: String,
    finished_at: String,
}

/// Evolves tree masks with one of the multi-objective selection schemes
pub struct GeneticSelector<'a, E: FitnessEvaluator> {
    method: SelectionMethod,
    config: GeneticConfig,
    evaluator: &'a E,
    objectives: ObjectiveSet,
    n_genes: usize,
    collection: Collection,
    output: RunOutput,
    rng: ChaCha8Rng,
    population: Vec<Individual>,
    archive: Vec<Individual>,
    population_bank: BTreeMap<String, BankEntry>,
    archive_bank: BTreeMap<usize, Vec<String>>,
    pareto_front_bank: BTreeMap<usize, Vec<String>>,
    pareto_front: ParetoFront,
    logbook: Logbook,
    timers: PhaseTimers,
    nsga2_ready: bool,
    next_gen: usize,
    has_run: bool,
    evaluations: usize,
}

impl<'a, E: FitnessEvaluator> GeneticSelector<'a, E> {
    pub fn new(
        method: SelectionMethod,
        config: GeneticConfig,
        evaluator: &'a E,
        collection: Collection,
        output: RunOutput,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let n_genes = evaluator.n_genes();
        let objectives = evaluator.objectives().clone();
        let population = (0..config.population_size)
            .map(|_| Individual::random(n_genes, &mut rng))
            .collect();
        let logbook = Logbook::new(objectives.names().iter().map(|s| s.to_string()).collect());

        GeneticSelector {
            method,
            config,
            evaluator,
            objectives,
            n_genes,
            collection,
            output,
            rng,
            population,
            archive: Vec::new(),
            population_bank: BTreeMap::new(),
            archive_bank: BTreeMap::new(),
            pareto_front_bank: BTreeMap::new(),
            pareto_front: ParetoFront::new(),
            logbook,
            timers: PhaseTimers::new(),
            nsga2_ready: false,
            next_gen: 0,
            has_run: false,
            evaluations: 0,
        }
    }

    /// Seed the first individuals of the initial population with known masks
    pub fn with_initial_population(mut self, keys: &[String]) -> Result<Self, String> {
        if keys.len() > self.population.len() {
            return Err(format!(
                "{} initial individuals given for a population of {}",
                keys.len(), self.population.len()
            ));
        }
        for (slot, key) in self.population.iter_mut().zip(keys) {
            let ind = Individual::from_key(key)?;
            if ind.len() != self.n_genes {
                return Err(format!("Initial individual has {} genes, expected {}", ind.len(), self.n_genes));
            }
            *slot = ind;
        }
        Ok(self)
    }

    /// Continue a run whose dumps are already under the output: the banks
    /// and the logbook are restored, the generation count goes on from the
    /// last archive and that archive seeds the population. Without dumps the
    /// selector is returned unchanged.
    pub fn resume(mut self) -> Result<Self, String> {
        let out = self.output.clone();
        if !out.persist.exists(&out.name("archive_bank")) {
            log::info!("No previous run under {:?}, starting from a random population", out.persist.path());
            return Ok(self);
        }

        let archive_bank: BTreeMap<usize, Vec<String>> = out.persist.load(&out.name("archive_bank"))?;
        let (last_gen, last_archive) = match archive_bank.iter().next_back() {
            Some((&gen, keys)) => (gen, keys.clone()),
            None => return Ok(self),
        };

        let seeds: Vec<String> = last_archive.into_iter().take(self.config.population_size).collect();
        self = self.with_initial_population(&seeds)?;

        self.population_bank = out.persist.load(&out.name("population_bank"))?;
        if out.persist.exists(&out.name("pareto_front_bank")) {
            self.pareto_front_bank = out.persist.load(&out.name("pareto_front_bank"))?;
        }
        if out.logbook_path.exists() {
            let names = self.objectives.names().iter().map(|s| s.to_string()).collect();
            self.logbook = Logbook::load_json(&out.logbook_path, names)?;
        }
        self.archive_bank = archive_bank;
        self.next_gen = last_gen + 1;

        log::info!(
            "Resuming at generation {} from {} archived masks",
            self.next_gen, seeds.len()
        );
        Ok(self)
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn into_collection(self) -> Collection {
        self.collection
    }

    pub fn logbook(&self) -> &Logbook {
        &self.logbook
    }

    pub fn archive(&self) -> &[Individual] {
        &self.archive
    }

    pub fn population_bank(&self) -> &BTreeMap<String, BankEntry> {
        &self.population_bank
    }

    pub fn archive_bank(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.archive_bank
    }

    /// Number of masks actually ranked by the evaluator
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Run `n_gen` generations. Without `warm_start` a selector that already
    /// ran starts over from a fresh random population.
    pub fn evolve(&mut self, n_gen: usize, warm_start: bool) -> Result<SelectionOutcome, String> {
        if !warm_start && self.has_run {
            self.reset();
        }

        let started_at = chrono::Local::now();
        let start = Instant::now();
        log::info!(
            "Evolving {} masks of {} trees with {} on [{}] for {} generations",
            self.config.population_size, self.n_genes, self.method, self.objectives, n_gen
        );

        let progress = if self.config.show_progress {
            ProgressBar::new(n_gen as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} gen ({elapsed})") {
            progress.set_style(style);
        }
        progress.set_message(self.method.name());

        if self.method == SelectionMethod::Nsga2 && !self.nsga2_ready {
            let mut population = std::mem::take(&mut self.population);
            self.evaluate_all(&mut population, self.next_gen)?;
            self.timers.start(Phase::Selection);
            self.population = sel_nsga2(&population, population.len(), &self.objectives);
            self.timers.stop(Phase::Selection);
            self.nsga2_ready = true;
        }

        for gen in self.next_gen..self.next_gen + n_gen {
            let loop_time = Instant::now();
            match self.method {
                SelectionMethod::Spea2 => self.spea2_generation(gen)?,
                SelectionMethod::Nsga2 => self.nsga2_generation(gen)?,
            }

            if self.objectives.is_multi_objective() {
                self.pareto_front.clear();
                self.pareto_front.update(&self.archive, &self.objectives);
                self.pareto_front_bank.insert(gen, unique_keys(self.pareto_front.individuals()));
            }

            self.timers.start(Phase::Statistics);
            self.logbook.record(gen, self.archive.iter().map(|ind| ind.values()));
            self.timers.stop(Phase::Statistics);
            log::debug!("{} ({:.2}s)", self.logbook.stream(), loop_time.elapsed().as_secs_f64());

            if self.config.persist_every > 0 && gen % self.config.persist_every == 0 {
                self.timers.start(Phase::Persistence);
                let saved = self.collection.save(&self.output.collection_path);
                self.timers.stop(Phase::Persistence);
                saved?;
            }

            progress.inc(1);
        }
        progress.finish_and_clear();

        self.next_gen += n_gen;
        self.has_run = true;

        let elapsed = start.elapsed().as_secs_f64();
        log::info!(
            "Finished {} generations in {:.2}s, {} masks ranked, {} cached",
            n_gen, elapsed, self.evaluations, self.collection.len()
        );

        self.persist_data(elapsed, started_at)?;
        log::info!("Phase timings: {}", self.timers.summary());

        if self.objectives.is_multi_objective() {
            Ok(SelectionOutcome::ParetoFront(self.pareto_front()?))
        } else {
            Ok(SelectionOutcome::Best(self.best_individual()?))
        }
    }

    fn spea2_generation(&mut self, gen: usize) -> Result<(), String> {
        let mut population = std::mem::take(&mut self.population);
        let mut archive = std::mem::take(&mut self.archive);
        self.evaluate_all(&mut population, gen)?;
        self.evaluate_all(&mut archive, gen)?;

        self.bank_chromosomes(&population, gen);

        self.timers.start(Phase::Selection);
        let mut pool = population;
        pool.extend(archive);
        self.archive = sel_spea2(&pool, self.config.population_size, &self.objectives);
        self.archive_bank.insert(gen, self.archive.iter().map(|ind| ind.key()).collect());

        let mating_pool = sel_tournament(
            &self.archive,
            self.config.population_size,
            self.config.tournament_size,
            &self.objectives,
            &mut self.rng,
        );
        self.timers.stop(Phase::Selection);

        self.timers.start(Phase::Variation);
        self.population = var_and(
            &mating_pool,
            self.config.crossover_prob,
            self.config.mutation_prob,
            self.config.gene_mutation_prob,
            &mut self.rng,
        );
        self.timers.stop(Phase::Variation);

        Ok(())
    }

    fn nsga2_generation(&mut self, gen: usize) -> Result<(), String> {
        self.timers.start(Phase::Variation);
        let mut offspring = var_and(
            &self.population,
            self.config.crossover_prob,
            self.config.mutation_prob,
            self.config.gene_mutation_prob,
            &mut self.rng,
        );
        self.timers.stop(Phase::Variation);

        let mut population = std::mem::take(&mut self.population);
        self.evaluate_all(&mut population, gen)?;
        self.evaluate_all(&mut offspring, gen)?;

        population.extend(offspring);
        self.bank_chromosomes(&population, gen);

        self.timers.start(Phase::Selection);
        self.population = sel_nsga2(&population, self.config.population_size, &self.objectives);
        self.timers.stop(Phase::Selection);

        self.archive = self.population.clone();
        self.archive_bank.insert(gen, self.archive.iter().map(|ind| ind.key()).collect());

        Ok(())
    }

    /// Assign fitness to every individual. Cached masks are looked up,
    /// the others are ranked once each in parallel and cached. A mask that
    /// keeps no tree gets the empty-mask fitness and is never cached.
    fn evaluate_all(&mut self, individuals: &mut [Individual], gen: usize) -> Result<(), String> {
        self.timers.start(Phase::Evaluation);

        let mut known: HashMap<String, Vec<f64>> = HashMap::new();
        let mut pending: Vec<String> = Vec::new();

        for ind in individuals.iter() {
            let key = ind.key();
            if known.contains_key(&key) || pending.contains(&key) {
                continue;
            }
            if ind.count_ones() == 0 {
                known.insert(key, Evaluation::empty_mask(ind.len()).fitness(&self.objectives));
            } else if let Some(evaluation) = self.collection.lookup(&key, self.method, gen) {
                known.insert(key, evaluation.fitness(&self.objectives));
            } else {
                pending.push(key);
            }
        }

        let evaluator = self.evaluator;
        let fresh: Vec<(String, Evaluation)> = pending
            .into_par_iter()
            .map(|key| -> Result<(String, Evaluation), String> {
                let mask = Individual::from_key(&key)?;
                let evaluation = evaluator.evaluate(&mask.genes)?;
                Ok((key, evaluation))
            })
            .collect::<Result<_, String>>()?;

        self.evaluations += fresh.len();
        for (key, evaluation) in fresh {
            known.insert(key.clone(), evaluation.fitness(&self.objectives));
            self.collection.insert(key, evaluation, self.method, gen);
        }

        for ind in individuals.iter_mut() {
            ind.fitness = known.get(&ind.key()).cloned();
        }

        self.timers.stop(Phase::Evaluation);
        Ok(())
    }

    fn bank_chromosomes(&mut self, individuals: &[Individual], gen: usize) {
        for ind in individuals {
            let key = ind.key();
            if self.population_bank.contains_key(&key) {
                continue;
            }
            let fitness = self.objectives.names().iter()
                .zip(ind.values())
                .map(|(name, &v)| (name.to_string(), v))
                .collect();
            let ndcg = self.collection.get(&key)
                .map(|entry| entry.evaluation.ndcg.clone())
                .unwrap_or_default();
            self.population_bank.insert(key, BankEntry { fitness, ndcg, generated: gen });
        }
    }

    fn reset(&mut self) {
        log::info!("Restarting the selector from a new random population");
        self.population = (0..self.config.population_size)
            .map(|_| Individual::random(self.n_genes, &mut self.rng))
            .collect();
        self.archive.clear();
        self.population_bank.clear();
        self.archive_bank.clear();
        self.pareto_front_bank.clear();
        self.pareto_front.clear();
        self.logbook.clear();
        self.nsga2_ready = false;
        self.next_gen = 0;
        self.has_run = false;
    }

    /// Archive member with the largest raw value of each objective, the
    /// earliest one on ties. Minimised objectives are not flipped, so their
    /// entry is the worst member rather than the best.
    fn top_individuals(&self) -> BTreeMap<String, TopIndividual> {
        let mut top = BTreeMap::new();
        for (m, objective) in self.objectives.objectives().iter().enumerate() {
            let mut best: Option<&Individual> = None;
            for ind in self.archive.iter().filter(|ind| ind.values().len() > m) {
                if best.map_or(true, |b| b.values()[m] < ind.values()[m]) {
                    best = Some(ind);
                }
            }
            if let Some(ind) = best {
                top.insert(objective.name().to_string(), TopIndividual { key: ind.key(), value: ind.values()[m] });
            }
        }
        top
    }

    fn persist_data(&mut self, elapsed: f64, started_at: chrono::DateTime<chrono::Local>) -> Result<(), String> {
        self.timers.start(Phase::Persistence);
        let result = self.write_artefacts(elapsed, started_at);
        self.timers.stop(Phase::Persistence);
        result
    }

    fn write_artefacts(&self, elapsed: f64, started_at: chrono::DateTime<chrono::Local>) -> Result<(), String> {
        let out = &self.output;

        self.collection.save(&out.collection_path)?;
        self.logbook.save_json(&out.logbook_path)?;
        self.logbook.save_csv(out.logbook_path.with_extension("csv"))?;

        let top = serde_json::to_string_pretty(&self.top_individuals())
            .map_err(|e| format!("Cannot serialize top individuals: {}", e))?;
        let top_path = out.top_individual_path();
        std::fs::write(&top_path, top)
            .map_err(|e| format!("Cannot write {:?}: {}", top_path, e))?;

        out.persist.save(&self.population_bank, &out.name("population_bank"))?;
        out.persist.save(&self.archive_bank, &out.name("archive_bank"))?;
        out.persist.save(&[elapsed], &out.name("elapsed_time"))?;

        let metadata = RunMetadata {
            method: self.method,
            objectives: self.objectives.names().iter().map(|s| s.to_string()).collect(),
            n_genes: self.n_genes,
            config: self.config.clone(),
            generations_run: self.next_gen,
            evaluations: self.evaluations,
            collection_size: self.collection.len(),
            started_at: started_at.to_rfc3339(),
            finished_at: chrono::Local::now().to_rfc3339(),
        };
        out.persist.save(&metadata, &out.name("run_metadata"))?;

        if self.objectives.is_multi_objective() {
            out.persist.save(&self.pareto_front.keys(), &out.name("pareto_front"))?;
            out.persist.save(&self.pareto_front_bank, &out.name("pareto_front_bank"))?;
        } else {
            out.persist.save(&self.best_individual()?, &out.name("best_ind"))?;
        }

        log::info!("Run artefacts written under {:?}", out.persist.path());
        Ok(())
    }

    /// Keys of the current Pareto front
    pub fn pareto_front(&self) -> Result<Vec<String>, String> {
        if !self.has_run {
            return Err("Evolution was not run for this model".to_string());
        }
        if !self.objectives.is_multi_objective() {
            return Err("Single objective run: use best_individual() instead".to_string());
        }
        Ok(self.pareto_front.keys())
    }

    /// Key of the archive member with the best fitness
    pub fn best_individual(&self) -> Result<String, String> {
        if !self.has_run {
            return Err("Evolution was not run for this model".to_string());
        }
        self.archive.iter()
            .max_by(|a, b| self.objectives.compare(a.values(), b.values()))
            .map(|ind| ind.key())
            .ok_or_else(|| "The archive is empty".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::SeenBy;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Rewards masks whose first half is kept and whose second half is dropped
    struct PatternEvaluator {
        objectives: ObjectiveSet,
        n_genes: usize,
        calls: AtomicUsize,
        fail_after: usize,
    }

    impl PatternEvaluator {
        fn new(objectives: &str, n_genes: usize) -> Self {
            PatternEvaluator {
                objectives: objectives.parse().unwrap(),
                n_genes,
                calls: AtomicUsize::new(0),
                fail_after: usize::MAX,
            }
        }

        /// Every call past the first `calls` fails
        fn failing_after(mut self, calls: usize) -> Self {
            self.fail_after = calls;
            self
        }
    }

    impl FitnessEvaluator for PatternEvaluator {
        fn evaluate(&self, mask: &[bool]) -> Result<Evaluation, String> {
            if self.calls.fetch_add(1, AtomicOrdering::SeqCst) >= self.fail_after {
                return Err("evaluator unavailable".to_string());
            }
            let half = mask.len() / 2;
            let hits = mask.iter()
                .enumerate()
                .filter(|&(i, &g)| (i < half) == g)
                .count();
            let precision = hits as f64 / mask.len() as f64;
            Ok(Evaluation {
                ndcg: vec![precision; 3],
                precision,
                risk: precision / 2.0,
                feature: mask.iter().filter(|&&g| g).count(),
                trisk: 0.0,
                trisk_per_query: vec![0.0; 3],
            })
        }

        fn objectives(&self) -> &ObjectiveSet {
            &self.objectives
        }

        fn n_genes(&self) -> usize {
            self.n_genes
        }
    }

    fn small_config() -> GeneticConfig {
        GeneticConfig {
            population_size: 12,
            max_generations: 6,
            show_progress: false,
            ..Default::default()
        }
    }

    fn output(dir: &Path, method: SelectionMethod, objectives: &str) -> RunOutput {
        RunOutput::new(dir, "toy", "1", method, &objectives.parse().unwrap(), RankingMetric::default(), "test")
    }

    #[test]
    fn test_run_output_paths() {
        let out = output(Path::new("/tmp/out"), SelectionMethod::Spea2, "precision,risk");
        assert_eq!(
            out.collection_path,
            PathBuf::from("/tmp/out/toy/Fold1/toy-Fold1-base-testingspea2precisionrisktest.json")
        );
        assert_eq!(out.logbook_path, PathBuf::from("/tmp/out/toy/Fold1/resultspea2fold1precisionrisktest.json"));
        assert_eq!(
            out.top_individual_path(),
            PathBuf::from("/tmp/out/toy/Fold1/toy-Fold1-base-testingspea2precisionrisktesttopind.json")
        );
        assert_eq!(out.name("archive_bank"), "Fold1/archive_bank");
    }

    #[test]
    fn test_queries_before_run_fail() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision,feature", 10);
        let selector = GeneticSelector::new(
            SelectionMethod::Spea2,
            small_config(),
            &evaluator,
            Collection::new(),
            output(dir.path(), SelectionMethod::Spea2, "precision,feature"),
        );
        assert!(selector.pareto_front().is_err());
        assert!(selector.best_individual().is_err());
    }

    #[test]
    fn test_spea2_multi_objective_run() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision,feature", 10);
        let out = output(dir.path(), SelectionMethod::Spea2, "precision,feature");
        let mut selector = GeneticSelector::new(
            SelectionMethod::Spea2, small_config(), &evaluator, Collection::new(), out.clone(),
        );

        let outcome = selector.evolve(6, false).unwrap();
        let front = match outcome {
            SelectionOutcome::ParetoFront(keys) => keys,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert!(!front.is_empty());
        assert_eq!(selector.pareto_front().unwrap(), front);
        assert_eq!(selector.archive().len(), 12);
        assert_eq!(selector.logbook().len(), 6);
        assert_eq!(selector.archive_bank().len(), 6);

        // Each distinct non-empty mask is ranked exactly once.
        let ranked = evaluator.calls.load(AtomicOrdering::SeqCst);
        assert_eq!(ranked, selector.evaluations());
        assert!(ranked <= selector.collection().len());

        assert!(out.collection_path.exists());
        assert!(out.logbook_path.exists());
        assert!(out.logbook_path.with_extension("csv").exists());
        assert!(out.top_individual_path().exists());
        for name in ["population_bank", "archive_bank", "elapsed_time", "run_metadata", "pareto_front", "pareto_front_bank"] {
            assert!(out.persist.exists(&out.name(name)), "missing {}", name);
        }

        let bank: BTreeMap<String, BankEntry> = out.persist.load(&out.name("population_bank")).unwrap();
        assert!(bank.values().all(|entry| entry.fitness.contains_key("precision")));

        // topind holds the largest raw value, also for the minimised tree count.
        let top: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.top_individual_path()).unwrap()).unwrap();
        let most_trees = selector.archive().iter().map(|ind| ind.values()[1]).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(top["feature"]["value"].as_f64().unwrap(), most_trees);
        let key = top["feature"]["key"].as_str().unwrap();
        assert_eq!(key.matches('1').count() as f64, most_trees);
    }

    #[test]
    fn test_nsga2_multi_objective_front() {
        let dir = tempfile::tempdir().unwrap();
        let objectives: ObjectiveSet = "precision,feature".parse().unwrap();
        let evaluator = PatternEvaluator::new("precision,feature", 10);
        let out = output(dir.path(), SelectionMethod::Nsga2, "precision,feature");
        let mut selector = GeneticSelector::new(
            SelectionMethod::Nsga2, small_config(), &evaluator, Collection::new(), out.clone(),
        );

        let front = match selector.evolve(5, false).unwrap() {
            SelectionOutcome::ParetoFront(keys) => keys,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert!(!front.is_empty());

        // The front is drawn from the surviving population and is mutually non-dominated.
        let population: Vec<String> = selector.archive().iter().map(|ind| ind.key()).collect();
        assert!(front.iter().all(|key| population.contains(key)));
        let members = selector.pareto_front.individuals();
        for a in members {
            for b in members {
                assert!(!objectives.dominates(a.values(), b.values()));
            }
        }

        let banked: BTreeMap<usize, Vec<String>> = out.persist.load(&out.name("pareto_front_bank")).unwrap();
        assert_eq!(banked.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        let mut last = banked[&4].clone();
        let mut expected = front.clone();
        last.sort();
        expected.sort();
        assert_eq!(last, expected);
    }

    #[test]
    fn test_collection_written_during_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeneticConfig { persist_every: 2, ..small_config() };

        // Generation 0 ranks at most 12 masks; later generations hit the failure.
        let evaluator = PatternEvaluator::new("precision,feature", 16).failing_after(12);
        let out = output(dir.path(), SelectionMethod::Spea2, "precision,feature");
        let mut selector = GeneticSelector::new(
            SelectionMethod::Spea2, config.clone(), &evaluator, Collection::new(), out.clone(),
        );
        assert!(selector.evolve(6, false).is_err());

        // Saved after generation 0, before the final dump that never came.
        let saved = Collection::load_or_default(&out.collection_path).unwrap();
        assert!(!saved.is_empty());
        assert!(saved.iter().all(|(_, entry)| entry.generation_spea2 == Some(0)));
        assert!(!out.logbook_path.exists());

        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision,feature", 16).failing_after(12);
        let out = output(dir.path(), SelectionMethod::Spea2, "precision,feature");
        let never = GeneticConfig { persist_every: 0, ..config };
        let mut selector = GeneticSelector::new(
            SelectionMethod::Spea2, never, &evaluator, Collection::new(), out.clone(),
        );
        assert!(selector.evolve(6, false).is_err());
        assert!(!out.collection_path.exists());
    }

    #[test]
    fn test_methods_share_one_collection() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision,risk", 10);

        let mut spea2 = GeneticSelector::new(
            SelectionMethod::Spea2, small_config(), &evaluator, Collection::new(),
            output(dir.path(), SelectionMethod::Spea2, "precision,risk"),
        );
        spea2.evolve(2, false).unwrap();
        let collection = spea2.into_collection();
        assert!(collection.iter().all(|(_, e)| e.seen_by == SeenBy::Spea2 && e.generation_nsga2.is_none()));
        let ranked_by_spea2 = evaluator.calls.load(AtomicOrdering::SeqCst);

        // Same seed, so NSGA2 starts from the masks SPEA2 ranked first.
        let mut nsga2 = GeneticSelector::new(
            SelectionMethod::Nsga2, small_config(), &evaluator, collection,
            output(dir.path(), SelectionMethod::Nsga2, "precision,risk"),
        );
        nsga2.evolve(2, false).unwrap();
        assert_eq!(evaluator.calls.load(AtomicOrdering::SeqCst), ranked_by_spea2 + nsga2.evaluations());

        let shared: Vec<_> = nsga2.collection().iter()
            .filter(|(_, e)| e.seen_by == SeenBy::Both)
            .collect();
        assert!(!shared.is_empty());
        assert!(shared.iter().all(|(_, e)| e.generation_spea2.is_some() && e.generation_nsga2.is_some()));
        let only_nsga2 = nsga2.collection().iter().filter(|(_, e)| e.seen_by == SeenBy::Nsga2).count();
        assert_eq!(only_nsga2, nsga2.evaluations());
    }

    #[test]
    fn test_nsga2_single_objective_improves() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision", 16);
        let out = output(dir.path(), SelectionMethod::Nsga2, "precision");
        let mut selector = GeneticSelector::new(
            SelectionMethod::Nsga2, small_config(), &evaluator, Collection::new(), out.clone(),
        );

        let outcome = selector.evolve(8, false).unwrap();
        let best = match outcome {
            SelectionOutcome::Best(key) => key,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(best.len(), 16);
        assert!(selector.pareto_front().is_err());

        let records = selector.logbook().records();
        let first = records[0].max[0];
        let last = records[records.len() - 1].max[0];
        assert!(last >= first);

        let stored: String = out.persist.load(&out.name("best_ind")).unwrap();
        assert_eq!(stored, best);
    }

    #[test]
    fn test_cached_masks_are_not_ranked_again() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision,risk", 8);
        let out = output(dir.path(), SelectionMethod::Spea2, "precision,risk");

        let mut first = GeneticSelector::new(
            SelectionMethod::Spea2, small_config(), &evaluator, Collection::new(), out.clone(),
        );
        first.evolve(3, false).unwrap();
        let collection = first.into_collection();
        let calls_after_first = evaluator.calls.load(AtomicOrdering::SeqCst);

        // Same seed, same masks: everything comes from the collection.
        let mut second = GeneticSelector::new(
            SelectionMethod::Spea2, small_config(), &evaluator, collection, out,
        );
        second.evolve(3, false).unwrap();
        assert_eq!(second.evaluations(), 0);
        assert_eq!(evaluator.calls.load(AtomicOrdering::SeqCst), calls_after_first);
    }

    #[test]
    fn test_warm_start_continues_generations() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision,feature", 8);
        let out = output(dir.path(), SelectionMethod::Spea2, "precision,feature");
        let mut selector = GeneticSelector::new(
            SelectionMethod::Spea2, small_config(), &evaluator, Collection::new(), out,
        );

        selector.evolve(2, false).unwrap();
        selector.evolve(2, true).unwrap();
        assert_eq!(selector.logbook().len(), 4);
        assert_eq!(selector.archive_bank().keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        selector.evolve(2, false).unwrap();
        assert_eq!(selector.logbook().len(), 2);
    }

    #[test]
    fn test_resume_from_previous_dumps() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision,feature", 8);
        let out = output(dir.path(), SelectionMethod::Spea2, "precision,feature");

        let mut first = GeneticSelector::new(
            SelectionMethod::Spea2, small_config(), &evaluator, Collection::new(), out.clone(),
        );
        first.evolve(3, false).unwrap();
        let last_archive: Vec<String> = first.archive().iter().map(|ind| ind.key()).collect();
        let banked = first.population_bank().len();

        let collection = Collection::load_or_default(&out.collection_path).unwrap();
        let second = GeneticSelector::new(
            SelectionMethod::Spea2, small_config(), &evaluator, collection, out.clone(),
        );
        let mut second = second.resume().unwrap();
        assert_eq!(second.next_gen, 3);
        assert_eq!(second.logbook().len(), 3);
        assert_eq!(second.population_bank().len(), banked);
        let seeded: Vec<String> = second.population.iter().map(|ind| ind.key()).collect();
        assert_eq!(seeded, last_archive);

        second.evolve(2, true).unwrap();
        assert_eq!(second.logbook().len(), 5);
        assert_eq!(second.archive_bank().keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_resume_without_dumps_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision", 8);
        let selector = GeneticSelector::new(
            SelectionMethod::Spea2, small_config(), &evaluator, Collection::new(),
            output(dir.path(), SelectionMethod::Spea2, "precision"),
        );
        let before: Vec<String> = selector.population.iter().map(|ind| ind.key()).collect();
        let selector = selector.resume().unwrap();
        assert_eq!(selector.next_gen, 0);
        assert!(selector.logbook().is_empty());
        assert_eq!(selector.population.iter().map(|ind| ind.key()).collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_initial_population_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let evaluator = PatternEvaluator::new("precision", 4);
        let out = output(dir.path(), SelectionMethod::Spea2, "precision");
        let selector = GeneticSelector::new(
            SelectionMethod::Spea2, small_config(), &evaluator, Collection::new(), out,
        );

        let selector = selector.with_initial_population(&["1100".to_string()]).unwrap();
        assert_eq!(selector.population[0].key(), "1100");
        assert!(selector.with_initial_population(&["110".to_string()]).is_err());
    }

    #[test]
    fn test_selection_method_parse() {
        assert_eq!("SPEA2".parse::<SelectionMethod>().unwrap(), SelectionMethod::Spea2);
        assert_eq!(SelectionMethod::Nsga2.to_string(), "nsga2");
        assert!("moead".parse::<SelectionMethod>().is_err());
    }
}
