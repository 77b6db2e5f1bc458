//! Per-generation fitness statistics.

use crate::metrics::mean;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Statistics of one generation, one value per objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub gen: usize,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub mean: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Logbook {
    objective_names: Vec<String>,
    records: Vec<GenerationRecord>,
}

impl Logbook {
    pub fn new(objective_names: Vec<String>) -> Self {
        Logbook { objective_names, records: Vec::new() }
    }

    /// Summarise the fitness vectors of one generation
    pub fn record<'f, I>(&mut self, gen: usize, fitnesses: I) -> &GenerationRecord
    where
        I: IntoIterator<Item = &'f [f64]>,
    {
        let fitnesses: Vec<&[f64]> = fitnesses.into_iter().collect();
        let n_obj = self.objective_names.len();
        let mut min = vec![f64::NAN; n_obj];
        let mut max = vec![f64::NAN; n_obj];
        let mut avg = vec![f64::NAN; n_obj];

        for m in 0..n_obj {
            let column: Vec<f64> = fitnesses.iter().filter_map(|f| f.get(m).copied()).collect();
            if column.is_empty() {
                continue;
            }
            min[m] = column.iter().copied().fold(f64::INFINITY, f64::min);
            max[m] = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            avg[m] = mean(&column);
        }

        self.records.push(GenerationRecord { gen, min, max, mean: avg });
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Last record as a printable line
    pub fn stream(&self) -> String {
        match self.records.last() {
            None => String::new(),
            Some(r) => {
                let fmt = |values: &[f64]| {
                    values.iter().map(|v| format!("{:.4}", v)).collect::<Vec<_>>().join(" ")
                };
                format!(
                    "gen {:>3} | min [{}] | max [{}] | mean [{}]",
                    r.gen, fmt(&r.min), fmt(&r.max), fmt(&r.mean)
                )
            }
        }
    }

    /// Records keyed by their position in the book
    pub fn to_json_map(&self) -> BTreeMap<usize, &GenerationRecord> {
        self.records.iter().enumerate().collect()
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Cannot create {:?}: {}", parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.to_json_map())
            .map_err(|e| format!("Cannot serialize logbook: {}", e))?;
        std::fs::write(path, json)
            .map_err(|e| format!("Cannot write {:?}: {}", path, e))
    }

    /// Read back a book written by [`Logbook::save_json`]
    pub fn load_json<P: AsRef<Path>>(path: P, objective_names: Vec<String>) -> Result<Self, String> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {:?}: {}", path, e))?;
        let records: BTreeMap<usize, GenerationRecord> = serde_json::from_str(&json)
            .map_err(|e| format!("Invalid logbook {:?}: {}", path, e))?;
        Ok(Logbook { objective_names, records: records.into_values().collect() })
    }

    /// One row per generation: `gen,<obj>_min,<obj>_max,<obj>_mean,...`
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| format!("Cannot create {:?}: {}", path, e))?;
        let mut writer = csv::Writer::from_writer(file);

        let mut header = vec!["gen".to_string()];
        for name in &self.objective_names {
            for stat in ["min", "max", "mean"] {
                header.push(format!("{}_{}", name, stat));
            }
        }
        writer.write_record(&header)
            .map_err(|e| format!("CSV write error: {}", e))?;

        for r in &self.records {
            let mut row = vec![r.gen.to_string()];
            for m in 0..self.objective_names.len() {
                row.push(r.min[m].to_string());
                row.push(r.max[m].to_string());
                row.push(r.mean[m].to_string());
            }
            writer.write_record(&row)
                .map_err(|e| format!("CSV write error: {}", e))?;
        }

        writer.flush().map_err(|e| format!("CSV flush error: {}", e))
    }
}
