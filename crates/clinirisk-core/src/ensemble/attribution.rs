//! Path-based feature attribution.
//!
//! Each tree's leaf value is split evenly across the distinct features
//! tested on the path that reached it, and summed per feature across
//! trees. Positive totals become drivers, strongest first, top three.
//! This is a uniform-credit heuristic, not exact TreeSHAP.

use std::collections::BTreeMap;

use clinirisk_state::{Driver, DriverDirection, DriverImpact};
use serde::{Deserialize, Serialize};

use super::artifact::ModelArtifact;
use super::predictor::{leaf_path, sigmoid, to_score};
use crate::features::FeatureVector;

/// How many drivers an explanation keeps.
pub const MAX_DRIVERS: usize = 3;

/// Score plus ranked drivers for one feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub score: u8,
    pub probability: f64,
    pub drivers: Vec<Driver>,
}

/// Per-feature credit for one call. Never shared between calls.
pub fn contributions(model: &ModelArtifact, features: &FeatureVector) -> BTreeMap<String, f64> {
    walk(model, features).1
}

/// Summed leaf values and per-feature credit, one traversal per tree.
fn walk(model: &ModelArtifact, features: &FeatureVector) -> (f64, BTreeMap<String, f64>) {
    let mut leaves = 0.0;
    let mut acc: BTreeMap<String, f64> = BTreeMap::new();
    for tree in &model.trees {
        let path = leaf_path(tree, features);
        leaves += path.value;
        let mut distinct: Vec<&str> = Vec::with_capacity(path.features.len());
        for f in path.features {
            if !distinct.contains(&f) {
                distinct.push(f);
            }
        }
        if distinct.is_empty() {
            continue;
        }
        let share = path.value / distinct.len() as f64;
        for f in distinct {
            *acc.entry(f.to_string()).or_insert(0.0) += share;
        }
    }
    (leaves, acc)
}

/// Rank positive contributions: magnitude descending, ties by name.
pub fn rank_drivers(contributions: BTreeMap<String, f64>) -> Vec<Driver> {
    let mut positive: Vec<(String, f64)> = contributions
        .into_iter()
        .filter(|(_, v)| *v > 0.0)
        .collect();
    // BTreeMap order already sorts names; a stable sort keeps it for ties
    positive.sort_by(|a, b| b.1.total_cmp(&a.1));
    positive
        .into_iter()
        .take(MAX_DRIVERS)
        .map(|(feature, magnitude)| Driver {
            feature,
            magnitude,
            direction: DriverDirection::IncreasesRisk,
            impact: Some(DriverImpact::from_contribution(magnitude)),
        })
        .collect()
}

/// Score and explain in one traversal per tree.
pub fn explain(model: &ModelArtifact, features: &FeatureVector) -> Explanation {
    let (leaves, credit) = walk(model, features);
    let probability = sigmoid(model.base_score + leaves);
    Explanation {
        score: to_score(probability),
        probability,
        drivers: rank_drivers(credit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::predictor::predict;

    fn model(doc: &str) -> ModelArtifact {
        ModelArtifact::from_bytes(doc.as_bytes()).unwrap()
    }

    const MODEL: &str = r#"{"base_score": 0.0, "trees": [
        {"nodeid": 0, "split": "age", "split_condition": 75, "yes": 1, "no": 2,
         "children": [
           {"nodeid": 1, "split": "egfr", "split_condition": 30, "yes": 3, "no": 4,
            "children": [{"nodeid": 3, "leaf": 0.2}, {"nodeid": 4, "leaf": 0.8}]},
           {"nodeid": 2, "leaf": -0.3}]},
        {"nodeid": 0, "split": "er_visits", "split_condition": 2, "yes": 1, "no": 2,
         "children": [{"nodeid": 1, "leaf": 0.3}, {"nodeid": 2, "leaf": -0.05}]},
        {"nodeid": 0, "split": "age", "split_condition": 60, "yes": 1, "no": 2,
         "children": [
           {"nodeid": 1, "split": "age", "split_condition": 85, "yes": 3, "no": 4,
            "children": [{"nodeid": 3, "leaf": 0.4}, {"nodeid": 4, "leaf": 0.1}]},
           {"nodeid": 2, "leaf": 0.0}]}
    ]}"#;

    #[test]
    fn splits_leaf_evenly_across_distinct_path_features() {
        let m = model(MODEL);
        let fv = FeatureVector::new()
            .with("age", 90.0)
            .with("egfr", 10.0)
            .with("er_visits", 3.0);
        let acc = contributions(&m, &fv);
        // tree 1: 0.8 over {age, egfr}; tree 3: 0.4 over {age} (age twice on path)
        assert!((acc["age"] - (0.4 + 0.4)).abs() < 1e-12);
        assert!((acc["egfr"] - 0.4).abs() < 1e-12);
        assert!((acc["er_visits"] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn drivers_ranked_and_tagged() {
        let m = model(MODEL);
        let fv = FeatureVector::new()
            .with("age", 90.0)
            .with("egfr", 10.0)
            .with("er_visits", 3.0);
        let e = explain(&m, &fv);
        assert_eq!(e.score, predict(&m, &fv));

        let names: Vec<&str> = e.drivers.iter().map(|d| d.feature.as_str()).collect();
        assert_eq!(names, vec!["age", "egfr", "er_visits"]);
        assert_eq!(e.drivers[0].impact, Some(DriverImpact::Critical));
        assert_eq!(e.drivers[1].impact, Some(DriverImpact::High));
        assert_eq!(e.drivers[2].impact, Some(DriverImpact::High));
    }

    #[test]
    fn negative_contributions_dropped() {
        let m = model(MODEL);
        let e = explain(&m, &FeatureVector::new());
        // age < 60 and er_visits < 2: every reached leaf is <= 0
        assert!(e.drivers.is_empty());
    }

    #[test]
    fn ties_break_by_feature_name() {
        let mut acc = BTreeMap::new();
        acc.insert("zeta".to_string(), 0.3);
        acc.insert("alpha".to_string(), 0.3);
        acc.insert("mid".to_string(), 0.9);
        acc.insert("low".to_string(), 0.01);
        let ranked = rank_drivers(acc);
        let names: Vec<&str> = ranked.iter().map(|d| d.feature.as_str()).collect();
        assert_eq!(names, vec!["mid", "alpha", "zeta"]);
    }

    #[test]
    fn leaf_only_tree_moves_score_without_credit() {
        let m = model(
            r#"{"base_score": 0.0, "trees": [
                {"nodeid": 0, "leaf": 1.0},
                {"nodeid": 0, "split": "age", "split_condition": 75, "yes": 1, "no": 2,
                 "children": [{"nodeid": 1, "leaf": 0.5}, {"nodeid": 2, "leaf": -0.5}]}]}"#,
        );
        let fv = FeatureVector::new().with("age", 80.0);
        let e = explain(&m, &fv);
        assert_eq!(e.score, predict(&m, &fv));
        assert!((e.probability - sigmoid(1.5)).abs() < 1e-12);
        assert_eq!(e.drivers.len(), 1);
        assert_eq!(e.drivers[0].feature, "age");
        assert!((e.drivers[0].magnitude - 0.5).abs() < 1e-12);
    }

    #[test]
    fn explanation_is_deterministic() {
        let m = model(MODEL);
        let fv = FeatureVector::new().with("age", 70.0).with("er_visits", 5.0);
        assert_eq!(explain(&m, &fv), explain(&m, &fv));
    }
}
