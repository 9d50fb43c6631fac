//! Tree-ensemble scoring.
//!
//! `total = base_score + Σ leaf(tree)`, then `round(100 / (1 + e^-total))`.
//! A split sends the row to `yes` when `features[split] >= split_condition`.
//! Missing features read as 0.

use super::artifact::{ModelArtifact, TreeNode};
use crate::features::FeatureVector;

/// A reached leaf and the split features visited on the way, root first.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafPath<'a> {
    pub value: f64,
    pub features: Vec<&'a str>,
}

/// Walk one tree to its leaf.
pub fn leaf_value(tree: &TreeNode, features: &FeatureVector) -> f64 {
    let mut node = tree;
    loop {
        match node {
            TreeNode::Leaf(value) => return *value,
            TreeNode::Internal {
                feature,
                threshold,
                yes,
                no,
            } => {
                node = if features.get(feature) >= *threshold {
                    yes.as_ref()
                } else {
                    no.as_ref()
                };
            }
        }
    }
}

/// Walk one tree to its leaf, recording the split features on the path.
pub fn leaf_path<'a>(tree: &'a TreeNode, features: &FeatureVector) -> LeafPath<'a> {
    let mut node = tree;
    let mut visited = Vec::new();
    loop {
        match node {
            TreeNode::Leaf(value) => {
                return LeafPath {
                    value: *value,
                    features: visited,
                }
            }
            TreeNode::Internal {
                feature,
                threshold,
                yes,
                no,
            } => {
                visited.push(feature.as_str());
                node = if features.get(feature) >= *threshold {
                    yes.as_ref()
                } else {
                    no.as_ref()
                };
            }
        }
    }
}

/// Logistic transform.
pub fn sigmoid(total: f64) -> f64 {
    1.0 / (1.0 + (-total).exp())
}

/// Probability → integer score in [0,100].
pub fn to_score(probability: f64) -> u8 {
    (probability * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Raw margin: base score plus every tree's leaf.
pub fn margin(model: &ModelArtifact, features: &FeatureVector) -> f64 {
    model.base_score
        + model
            .trees
            .iter()
            .map(|tree| leaf_value(tree, features))
            .sum::<f64>()
}

/// Score `features` against `model`. Pure in (model, features).
pub fn predict(model: &ModelArtifact, features: &FeatureVector) -> u8 {
    to_score(sigmoid(margin(model, features)))
}
