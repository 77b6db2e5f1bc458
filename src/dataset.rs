//! Module for parsing and representing Learning-to-Rank datasets.
//!
//! This module handles the LETOR / SVMlight text format used by the
//! MSLR, LETOR 3.0/4.0 and Yahoo! collections:
//!
//! ```text
//! <label> qid:<id> 1:<value> 2:<value> ... # optional comment
//! ```
//!
//! It also reads the per-query baseline effectiveness files used by the
//! risk-sensitive objectives.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

/// Which split of a fold to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Vali,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Vali => "vali",
            Split::Test => "test",
        }
    }
}

/// Contiguous block of documents sharing a query id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryGroup {
    /// Query identifier as written in the file
    pub qid: String,
    /// First row of the block
    pub start: usize,
    /// One past the last row of the block
    pub end: usize,
}

impl QueryGroup {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A parsed L2R dataset (one split of one fold)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Name of the file the dataset was read from
    pub name: String,
    /// Dense feature rows, one per document
    pub features: Vec<Vec<f64>>,
    /// Relevance label of every document
    pub labels: Vec<f64>,
    /// Query id of every document
    pub query_ids: Vec<String>,
    /// Number of feature columns
    pub n_features: usize,
}

impl Dataset {
    /// Parse a dataset from a LETOR / SVMlight file.
    ///
    /// `n_features_hint` forces a minimum dimension, useful when a split
    /// happens to never mention the highest feature index.
    pub fn from_file<P: AsRef<Path>>(path: P, n_features_hint: usize) -> Result<Self, String> {
        let file = File::open(&path)
            .map_err(|e| format!("Cannot open file {:?}: {}", path.as_ref(), e))?;
        let reader = BufReader::new(file);

        let mut sparse_rows: Vec<Vec<(usize, f64)>> = Vec::new();
        let mut labels = Vec::new();
        let mut query_ids = Vec::new();
        let mut max_index = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| format!("Read error: {}", e))?;
            let content = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line.as_str(),
            };
            let content = content.trim();
            if content.is_empty() {
                continue;
            }

            let (label, qid, row) = parse_line(content)
                .map_err(|e| format!("Line {}: {}", line_no + 1, e))?;

            if let Some(&(idx, _)) = row.last() {
                max_index = max_index.max(idx);
            }
            labels.push(label);
            query_ids.push(qid);
            sparse_rows.push(row);
        }

        if labels.is_empty() {
            return Err(format!("Dataset {:?} contains no documents", path.as_ref()));
        }

        let n_features = max_index.max(n_features_hint);
        let features = sparse_rows
            .into_iter()
            .map(|row| {
                let mut dense = vec![0.0; n_features];
                for (idx, value) in row {
                    dense[idx - 1] = value;
                }
                dense
            })
            .collect();

        let name = path.as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        log::debug!("Loaded {} documents, {} features from {}", labels.len(), n_features, name);

        Ok(Dataset {
            name,
            features,
            labels,
            query_ids,
            n_features,
        })
    }

    /// Build a dataset directly from rows (mostly for tests and synthetic runs)
    pub fn from_rows(features: Vec<Vec<f64>>, labels: Vec<f64>, query_ids: Vec<String>) -> Result<Self, String> {
        if features.len() != labels.len() || labels.len() != query_ids.len() {
            return Err(format!(
                "Inconsistent dataset: {} rows, {} labels, {} query ids",
                features.len(), labels.len(), query_ids.len()
            ));
        }
        let n_features = features.first().map(|r| r.len()).unwrap_or(0);
        if features.iter().any(|r| r.len() != n_features) {
            return Err("Rows have inconsistent feature counts".to_string());
        }

        Ok(Dataset {
            name: "in-memory".to_string(),
            features,
            labels,
            query_ids,
            n_features,
        })
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Group documents into queries, in file order.
    ///
    /// A new group starts whenever the query id changes, so a query id that
    /// reappears later in the file forms a second group.
    pub fn queries(&self) -> Vec<QueryGroup> {
        let mut groups: Vec<QueryGroup> = Vec::new();

        for (i, qid) in self.query_ids.iter().enumerate() {
            match groups.last_mut() {
                Some(group) if &group.qid == qid => group.end = i + 1,
                _ => groups.push(QueryGroup { qid: qid.clone(), start: i, end: i + 1 }),
            }
        }

        groups
    }

    /// Human-readable statistics block
    pub fn statistics(&self) -> String {
        let queries = self.queries();
        let mut label_counts: Vec<(i64, usize)> = Vec::new();
        for &label in &self.labels {
            let key = label.round() as i64;
            match label_counts.iter_mut().find(|(l, _)| *l == key) {
                Some(entry) => entry.1 += 1,
                None => label_counts.push((key, 1)),
            }
        }
        label_counts.sort_by_key(|(l, _)| *l);

        let avg_docs = if queries.is_empty() {
            0.0
        } else {
            self.len() as f64 / queries.len() as f64
        };

        let mut out = String::new();
        out.push_str(&format!("Dataset: {}\n", self.name));
        out.push_str(&format!("Documents: {}\n", self.len()));
        out.push_str(&format!("Queries: {}\n", queries.len()));
        out.push_str(&format!("Features: {}\n", self.n_features));
        out.push_str(&format!("Avg documents per query: {:.2}\n", avg_docs));
        out.push_str("Label distribution:\n");
        for (label, count) in label_counts {
            out.push_str(&format!("  {}: {} ({:.2}%)\n", label, count, count as f64 / self.len() as f64 * 100.0));
        }
        out
    }
}

fn parse_line(content: &str) -> Result<(f64, String, Vec<(usize, f64)>), String> {
    let mut tokens = content.split_whitespace();

    let label: f64 = tokens.next()
        .ok_or("Missing label")?
        .parse()
        .map_err(|_| "Invalid label")?;

    let qid = tokens.next()
        .and_then(|t| t.strip_prefix("qid:"))
        .ok_or("Missing qid")?
        .to_string();

    let mut row = Vec::new();
    for token in tokens {
        let (idx, value) = token.split_once(':')
            .ok_or_else(|| format!("Invalid feature token '{}'", token))?;
        let idx: usize = idx.parse()
            .map_err(|_| format!("Invalid feature index '{}'", idx))?;
        if idx == 0 {
            return Err("Feature indices are 1-based".to_string());
        }
        let value: f64 = value.parse()
            .map_err(|_| format!("Invalid feature value '{}'", value))?;
        row.push((idx, value));
    }
    row.sort_by_key(|(idx, _)| *idx);

    Ok((label, qid, row))
}

/// `<data_dir>/<dataset>/Fold<fold>/Norm.<split>.txt`
pub fn fold_path<P: AsRef<Path>>(data_dir: P, dataset: &str, fold: &str, split: Split) -> PathBuf {
    data_dir.as_ref()
        .join(dataset)
        .join(format!("Fold{}", fold))
        .join(format!("Norm.{}.txt", split.as_str()))
}

/// Read a baseline file: the first token of every non-empty line is the
/// effectiveness of the baseline ranker on the corresponding query.
pub fn load_baseline<P: AsRef<Path>>(path: P) -> Result<Vec<f64>, String> {
    let file = File::open(&path)
        .map_err(|e| format!("Cannot open baseline {:?}: {}", path.as_ref(), e))?;
    let reader = BufReader::new(file);

    let mut values = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| format!("Read error: {}", e))?;
        if let Some(token) = line.split_whitespace().next() {
            let value: f64 = token.parse()
                .map_err(|_| format!("Invalid baseline value '{}'", token))?;
            values.push(value);
        }
    }

    Ok(values)
}

/// Load every `*.txt` baseline of a directory, sorted by file name
pub fn load_baseline_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<(String, Vec<f64>)>, String> {
    let entries = std::fs::read_dir(&dir)
        .map_err(|e| format!("Cannot read baseline directory {:?}: {}", dir.as_ref(), e))?;

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "txt").unwrap_or(false))
        .collect();
    paths.sort();

    let mut baselines = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        baselines.push((name, load_baseline(&path)?));
    }

    Ok(baselines)
}
