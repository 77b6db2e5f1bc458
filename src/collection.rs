//! Persistent fitness cache keyed by mask bitstring.
//!
//! Evaluating a mask means ranking the whole validation split, so every
//! evaluation is remembered together with the method and generation that
//! first produced it. The cache survives across runs: a later run with the
//! other selection method reuses it and marks shared entries.

use crate::evaluator::Evaluation;
use crate::genetic::SelectionMethod;
use crate::metrics::RankingMetric;
use crate::objective::ObjectiveSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Which selection methods have produced a cached mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeenBy {
    Nsga2,
    Spea2,
    Both,
}

impl From<SelectionMethod> for SeenBy {
    fn from(method: SelectionMethod) -> Self {
        match method {
            SelectionMethod::Nsga2 => SeenBy::Nsga2,
            SelectionMethod::Spea2 => SeenBy::Spea2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    #[serde(flatten)]
    pub evaluation: Evaluation,
    /// Generation in which the SPEA2 selector last met this mask
    pub generation_spea2: Option<usize>,
    /// Generation in which the NSGA2 selector last met this mask
    pub generation_nsga2: Option<usize>,
    pub seen_by: SeenBy,
}

impl CollectionEntry {
    fn mark(&mut self, method: SelectionMethod, generation: usize) {
        match method {
            SelectionMethod::Spea2 => self.generation_spea2 = Some(generation),
            SelectionMethod::Nsga2 => self.generation_nsga2 = Some(generation),
        }
        if self.seen_by != SeenBy::Both && self.seen_by != SeenBy::from(method) {
            self.seen_by = SeenBy::Both;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection {
    entries: BTreeMap<String, CollectionEntry>,
}

impl Collection {
    pub fn new() -> Self {
        Collection { entries: BTreeMap::new() }
    }

    /// Cached evaluation of `key`. A hit records the method and generation
    /// on the entry.
    pub fn lookup(&mut self, key: &str, method: SelectionMethod, generation: usize) -> Option<&Evaluation> {
        let entry = self.entries.get_mut(key)?;
        entry.mark(method, generation);
        Some(&entry.evaluation)
    }

    pub fn insert(&mut self, key: String, evaluation: Evaluation, method: SelectionMethod, generation: usize) {
        let mut entry = CollectionEntry {
            evaluation,
            generation_spea2: None,
            generation_nsga2: None,
            seen_by: SeenBy::from(method),
        };
        entry.mark(method, generation);
        self.entries.insert(key, entry);
    }

    pub fn get(&self, key: &str) -> Option<&CollectionEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CollectionEntry)> {
        self.entries.iter()
    }

    /// Read a collection written by a previous run. A missing file starts
    /// an empty collection.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No collection at {:?}, starting a new one", path);
            return Ok(Collection::new());
        }
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read collection {:?}: {}", path, e))?;
        let collection: Collection = serde_json::from_str(&json)
            .map_err(|e| format!("Corrupt collection {:?}: {}", path, e))?;
        log::info!("Loaded {} cached evaluations from {:?}", collection.len(), path);
        Ok(collection)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Cannot create {:?}: {}", parent, e))?;
        }
        let json = serde_json::to_string(self)
            .map_err(|e| format!("Cannot serialize collection: {}", e))?;
        std::fs::write(path, json)
            .map_err(|e| format!("Cannot write {:?}: {}", path, e))
    }
}

/// `<dataset>-Fold<fold>-base-testing<method><objectives><id><metric>.json`.
/// The metric tag is empty for NDCG@10, so caches ranked with another
/// metric never share a file with it.
pub fn base_file_name(
    dataset: &str,
    fold: &str,
    method: SelectionMethod,
    objectives: &ObjectiveSet,
    metric: RankingMetric,
    identifier: &str,
) -> String {
    format!(
        "{}-Fold{}-base-testing{}{}{}{}.json",
        dataset, fold, method.name(), objectives.label(), identifier, metric.file_tag()
    )
}
