//! Objectives optimised by the selector and how they are weighted.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A single optimisation objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// Mean per-query ranking effectiveness (maximised)
    Precision,
    /// GeoRisk against the baseline (maximised)
    Risk,
    /// Number of kept trees (minimised)
    Feature,
    /// TRisk against the baseline (minimised)
    TRisk,
}

impl Objective {
    pub const ALL: [Objective; 4] = [
        Objective::Precision,
        Objective::Risk,
        Objective::Feature,
        Objective::TRisk,
    ];

    /// Sign applied to the raw value: +1 maximises, -1 minimises
    pub fn weight(&self) -> f64 {
        match self {
            Objective::Precision | Objective::Risk => 1.0,
            Objective::Feature | Objective::TRisk => -1.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Objective::Precision => "precision",
            Objective::Risk => "risk",
            Objective::Feature => "feature",
            Objective::TRisk => "trisk",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Objective::ALL.iter()
            .copied()
            .find(|o| o.name() == lower)
            .ok_or_else(|| format!("Unknown objective '{}' (expected precision, risk, feature or trisk)", s))
    }
}

/// Ordered, non-empty set of objectives.
///
/// Serialised as a list of names. A comma separated string such as
/// `"precision,risk"` is accepted as well; both go through
/// [`ObjectiveSet::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ObjectiveNames", into = "Vec<Objective>")]
pub struct ObjectiveSet {
    objectives: Vec<Objective>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ObjectiveNames {
    List(Vec<Objective>),
    Joined(String),
}

impl TryFrom<ObjectiveNames> for ObjectiveSet {
    type Error = String;

    fn try_from(names: ObjectiveNames) -> Result<Self, Self::Error> {
        match names {
            ObjectiveNames::List(objectives) => ObjectiveSet::new(objectives),
            ObjectiveNames::Joined(joined) => joined.parse(),
        }
    }
}

impl From<ObjectiveSet> for Vec<Objective> {
    fn from(set: ObjectiveSet) -> Self {
        set.objectives
    }
}

impl ObjectiveSet {
    pub fn new(objectives: Vec<Objective>) -> Result<Self, String> {
        if objectives.is_empty() {
            return Err("At least one objective is required".to_string());
        }
        for (i, o) in objectives.iter().enumerate() {
            if objectives[..i].contains(o) {
                return Err(format!("Objective '{}' listed twice", o));
            }
        }
        Ok(ObjectiveSet { objectives })
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }

    pub fn is_multi_objective(&self) -> bool {
        self.objectives.len() > 1
    }

    pub fn contains(&self, objective: Objective) -> bool {
        self.objectives.contains(&objective)
    }

    pub fn weights(&self) -> Vec<f64> {
        self.objectives.iter().map(|o| o.weight()).collect()
    }

    /// Raw values multiplied by the objective weights
    pub fn weighted(&self, values: &[f64]) -> Vec<f64> {
        values.iter().zip(&self.objectives).map(|(v, o)| v * o.weight()).collect()
    }

    /// Concatenated names, used to build result file names
    pub fn label(&self) -> String {
        self.objectives.iter().map(|o| o.name()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.objectives.iter().map(|o| o.name()).collect()
    }

    /// Compare two raw fitness vectors lexicographically on weighted values.
    /// `Greater` means `a` is the better fitness.
    pub fn compare(&self, a: &[f64], b: &[f64]) -> Ordering {
        for ((x, y), o) in a.iter().zip(b).zip(&self.objectives) {
            let (wx, wy) = (x * o.weight(), y * o.weight());
            match wx.partial_cmp(&wy) {
                Some(Ordering::Equal) | None => continue,
                Some(ord) => return ord,
            }
        }
        Ordering::Equal
    }

    /// Pareto dominance on weighted values: `a` is no worse on every
    /// objective and strictly better on at least one.
    pub fn dominates(&self, a: &[f64], b: &[f64]) -> bool {
        let mut strictly_better = false;
        for ((x, y), o) in a.iter().zip(b).zip(&self.objectives) {
            let (wx, wy) = (x * o.weight(), y * o.weight());
            if wx < wy {
                return false;
            }
            if wx > wy {
                strictly_better = true;
            }
        }
        strictly_better
    }
}

impl Default for ObjectiveSet {
    /// Precision against risk
    fn default() -> Self {
        ObjectiveSet { objectives: vec![Objective::Precision, Objective::Risk] }
    }
}

impl FromStr for ObjectiveSet {
    type Err = String;

    /// Parse a comma separated list such as `precision,risk`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let objectives = s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Objective>, String>>()?;
        ObjectiveSet::new(objectives)
    }
}

impl fmt::Display for ObjectiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_objective_set() {
        let set: ObjectiveSet = "precision, risk".parse().unwrap();
        assert_eq!(set.objectives(), &[Objective::Precision, Objective::Risk]);
        assert_eq!(set.label(), "precisionrisk");
        assert_eq!(set.weights(), vec![1.0, 1.0]);
        assert!(set.is_multi_objective());

        let set: ObjectiveSet = "feature,TRISK".parse().unwrap();
        assert_eq!(set.weights(), vec![-1.0, -1.0]);
    }

    #[test]
    fn test_invalid_sets() {
        assert!("".parse::<ObjectiveSet>().is_err());
        assert!("precision,precision".parse::<ObjectiveSet>().is_err());
        assert!("accuracy".parse::<ObjectiveSet>().is_err());
    }

    #[test]
    fn test_dominance_respects_weights() {
        let set: ObjectiveSet = "precision,feature".parse().unwrap();
        // Higher precision with fewer trees dominates.
        assert!(set.dominates(&[0.8, 10.0], &[0.7, 20.0]));
        assert!(!set.dominates(&[0.7, 20.0], &[0.8, 10.0]));
        // Trade-off: neither dominates.
        assert!(!set.dominates(&[0.8, 30.0], &[0.7, 20.0]));
        assert!(!set.dominates(&[0.7, 20.0], &[0.8, 30.0]));
        // Equal fitness never dominates.
        assert!(!set.dominates(&[0.7, 20.0], &[0.7, 20.0]));
    }

    #[test]
    fn test_lexicographic_compare() {
        let set: ObjectiveSet = "precision,feature".parse().unwrap();
        assert_eq!(set.compare(&[0.8, 30.0], &[0.7, 10.0]), Ordering::Greater);
        assert_eq!(set.compare(&[0.8, 30.0], &[0.8, 10.0]), Ordering::Less);
        assert_eq!(set.compare(&[0.8, 10.0], &[0.8, 10.0]), Ordering::Equal);
    }

    #[test]
    fn test_deserialize_validates() {
        let set: ObjectiveSet = serde_json::from_str(r#"["precision", "feature"]"#).unwrap();
        assert_eq!(set.label(), "precisionfeature");
        let set: ObjectiveSet = serde_json::from_str(r#""risk,trisk""#).unwrap();
        assert_eq!(set.objectives(), &[Objective::Risk, Objective::TRisk]);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["risk","trisk"]"#);

        assert!(serde_json::from_str::<ObjectiveSet>("[]").is_err());
        assert!(serde_json::from_str::<ObjectiveSet>(r#"["risk", "risk"]"#).is_err());
        assert!(serde_json::from_str::<ObjectiveSet>(r#""""#).is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Objective::TRisk).unwrap();
        assert_eq!(json, "\"trisk\"");
        let parsed: Objective = serde_json::from_str("\"precision\"").unwrap();
        assert_eq!(parsed, Objective::Precision);
    }
}
