//! Ranking effectiveness, risk-sensitive measures and significance tests.
//!
//! * NDCG@k and MAP computed per query from model scores.
//! * GeoRisk (Dinçer, Macdonald & Ounis, 2016) over a query x system matrix.
//! * TRisk, the studentised risk-reward trade-off against one baseline.
//! * A paired Student t-test used to compare the unpruned and pruned
//!   ensembles across folds.

use crate::dataset::QueryGroup;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::fmt;
use std::str::FromStr;

/// Per-query effectiveness measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingMetric {
    /// Normalised discounted cumulative gain at cut-off `k`
    Ndcg { k: usize },
    /// Mean average precision (binary relevance: label > 0)
    Map,
}

impl Default for RankingMetric {
    fn default() -> Self {
        RankingMetric::Ndcg { k: 10 }
    }
}

impl RankingMetric {
    /// Evaluate every query, in query order
    pub fn per_query(&self, scores: &[f64], labels: &[f64], queries: &[QueryGroup]) -> Vec<f64> {
        queries.iter()
            .map(|q| {
                let s = &scores[q.start..q.end];
                let l = &labels[q.start..q.end];
                match *self {
                    RankingMetric::Ndcg { k } => ndcg_at(s, l, k),
                    RankingMetric::Map => average_precision(s, l),
                }
            })
            .collect()
    }

    /// Short lowercase name used in file names
    pub fn name(&self) -> &'static str {
        match self {
            RankingMetric::Ndcg { .. } => "ndcg",
            RankingMetric::Map => "map",
        }
    }

    /// Tag of the cache file name; empty for the default NDCG@10
    pub fn file_tag(&self) -> String {
        match *self {
            m if m == RankingMetric::default() => String::new(),
            RankingMetric::Ndcg { k } => format!("-ndcg{}", k),
            RankingMetric::Map => "-map".to_string(),
        }
    }
}

impl fmt::Display for RankingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingMetric::Ndcg { k } => write!(f, "NDCG@{}", k),
            RankingMetric::Map => write!(f, "MAP"),
        }
    }
}

impl FromStr for RankingMetric {
    type Err = String;

    /// Accepts `ndcg` (cut-off 10), `ndcg@<k>` and `map`, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower == "map" {
            return Ok(RankingMetric::Map);
        }
        if lower == "ndcg" {
            return Ok(RankingMetric::Ndcg { k: 10 });
        }
        if let Some(k) = lower.strip_prefix("ndcg@") {
            let k: usize = k.parse().map_err(|_| format!("Invalid NDCG cut-off '{}'", k))?;
            if k == 0 {
                return Err("NDCG cut-off must be positive".to_string());
            }
            return Ok(RankingMetric::Ndcg { k });
        }
        Err(format!("Unknown metric '{}'", s))
    }
}

/// Document positions sorted by descending score; ties keep file order
fn ranking(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(scores[i])));
    order
}

fn dcg<I: Iterator<Item = f64>>(labels: I, k: usize) -> f64 {
    labels.take(k)
        .enumerate()
        .map(|(rank, rel)| (2f64.powf(rel) - 1.0) / ((rank + 2) as f64).log2())
        .sum()
}

/// NDCG@k of a single query. A query without any relevant document scores 0.
pub fn ndcg_at(scores: &[f64], labels: &[f64], k: usize) -> f64 {
    let mut ideal: Vec<f64> = labels.to_vec();
    ideal.sort_by_key(|&l| std::cmp::Reverse(OrderedFloat(l)));
    let idcg = dcg(ideal.into_iter(), k);
    if idcg <= 0.0 {
        return 0.0;
    }

    let order = ranking(scores);
    dcg(order.into_iter().map(|i| labels[i]), k) / idcg
}

/// Average precision of a single query
pub fn average_precision(scores: &[f64], labels: &[f64]) -> f64 {
    let total_relevant = labels.iter().filter(|&&l| l > 0.0).count();
    if total_relevant == 0 {
        return 0.0;
    }

    let mut hits = 0usize;
    let mut sum = 0.0;
    for (rank, i) in ranking(scores).into_iter().enumerate() {
        if labels[i] > 0.0 {
            hits += 1;
            sum += hits as f64 / (rank + 1) as f64;
        }
    }
    sum / total_relevant as f64
}

/// GeoRisk of every system (column) of a query x system matrix.
///
/// `matrix[q][s]` is the effectiveness of system `s` on query `q`. Negative
/// deviations from the expected score are amplified by `1 + alpha`.
pub fn geo_risk(matrix: &[Vec<f64>], alpha: f64) -> Result<Vec<f64>, String> {
    let n_queries = matrix.len();
    if n_queries == 0 {
        return Err("GeoRisk needs at least one query".to_string());
    }
    let n_systems = matrix[0].len();
    if matrix.iter().any(|row| row.len() != n_systems) {
        return Err("GeoRisk matrix rows have inconsistent lengths".to_string());
    }

    let query_totals: Vec<f64> = matrix.iter().map(|row| row.iter().sum()).collect();
    let system_totals: Vec<f64> = (0..n_systems)
        .map(|s| matrix.iter().map(|row| row[s]).sum())
        .collect();
    let grand_total: f64 = query_totals.iter().sum();

    let normal = Normal::new(0.0, 1.0).map_err(|e| format!("Normal distribution: {}", e))?;
    let c = n_queries as f64;

    let risks = (0..n_systems)
        .map(|s| {
            let z_risk: f64 = if grand_total == 0.0 {
                0.0
            } else {
                matrix.iter()
                    .zip(&query_totals)
                    .map(|(row, &t_q)| {
                        let expected = system_totals[s] * t_q / grand_total;
                        let deviation = row[s] - expected;
                        let z = if expected != 0.0 { deviation / expected.sqrt() } else { 0.0 };
                        if deviation < 0.0 { (1.0 + alpha) * z } else { z }
                    })
                    .sum()
            };
            ((system_totals[s] / c) * normal.cdf(z_risk / c)).sqrt()
        })
        .collect();

    Ok(risks)
}

/// TRisk of a model against one baseline.
///
/// Returns the t statistic together with the risk-adjusted per-query deltas.
pub fn t_risk(model: &[f64], baseline: &[f64], alpha: f64) -> Result<(f64, Vec<f64>), String> {
    if model.len() != baseline.len() {
        return Err(format!(
            "TRisk: model has {} queries, baseline has {}",
            model.len(), baseline.len()
        ));
    }
    if model.is_empty() {
        return Err("TRisk needs at least one query".to_string());
    }

    let adjusted: Vec<f64> = model.iter()
        .zip(baseline)
        .map(|(m, b)| {
            let delta = m - b;
            if delta < 0.0 { (1.0 + alpha) * delta } else { delta }
        })
        .collect();

    let urisk = mean(&adjusted);
    let standard_error = std_dev(&adjusted) / (adjusted.len() as f64).sqrt();
    let t = if standard_error > 0.0 { urisk / standard_error } else { 0.0 };

    Ok((t, adjusted))
}

/// Two-sided p-value of a paired Student t-test
pub fn paired_t_test(x: &[f64], y: &[f64]) -> Result<f64, String> {
    if x.len() != y.len() {
        return Err(format!("Paired t-test on samples of size {} and {}", x.len(), y.len()));
    }
    let n = x.len();
    if n < 2 {
        return Err("Paired t-test needs at least two pairs".to_string());
    }

    let diffs: Vec<f64> = x.iter().zip(y).map(|(a, b)| a - b).collect();
    let mean_diff = mean(&diffs);
    let sample_sd = (diffs.iter().map(|d| (d - mean_diff).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt();

    if sample_sd == 0.0 {
        return Ok(if mean_diff == 0.0 { 1.0 } else { 0.0 });
    }

    let t = mean_diff / (sample_sd / (n as f64).sqrt());
    let dist = StudentsT::new(0.0, 1.0, (n - 1) as f64)
        .map_err(|e| format!("Student t distribution: {}", e))?;

    Ok(2.0 * (1.0 - dist.cdf(t.abs())))
}

/// Whether two paired samples differ at significance level `alpha`
pub fn significantly_different(x: &[f64], y: &[f64], alpha: f64) -> Result<bool, String> {
    Ok(paired_t_test(x, y)? < alpha)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}
