//! Tree-ensemble model artifact: document format, parsing and digest.
//!
//! Document shape (XGBoost JSON dump plus metadata):
//!
//! ```json
//! {
//!   "model_name": "readmission-30d",
//!   "version": "2.3.0",
//!   "last_trained": "2024-05-01T00:00:00Z",
//!   "training_set_size": 12000,
//!   "base_score": 0.0,
//!   "trees": [
//!     { "nodeid": 0, "split": "age", "split_condition": 75, "yes": 1, "no": 2,
//!       "children": [ { "nodeid": 1, "leaf": 0.3 }, { "nodeid": 2, "leaf": -0.1 } ] }
//!   ]
//! }
//! ```
//!
//! Each split resolves `yes`/`no` only among its own `children`, so the
//! parsed tree is exclusively owned and acyclic by construction.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ArtifactError;

/// Deepest tree accepted.
pub const MAX_TREE_DEPTH: usize = 64;

/// Logit offset used when the document omits `base_score`.
pub const DEFAULT_BASE_SCORE: f64 = 0.5;

/// SHA-256 of the raw artifact document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelDigest(String);

impl ModelDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ModelDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ModelDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One decision tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Internal {
        feature: String,
        threshold: f64,
        yes: Box<TreeNode>,
        no: Box<TreeNode>,
    },
    Leaf(f64),
}

impl TreeNode {
    fn collect_features<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        if let TreeNode::Internal {
            feature, yes, no, ..
        } = self
        {
            out.insert(feature.as_str());
            yes.collect_features(out);
            no.collect_features(out);
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 1,
            TreeNode::Internal { yes, no, .. } => 1 + yes.depth().max(no.depth()),
        }
    }
}

/// Descriptive fields carried alongside the trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub last_trained: Option<DateTime<Utc>>,
    pub training_set_size: Option<u64>,
}

/// An immutable, fully parsed model. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub base_score: f64,
    pub trees: Vec<TreeNode>,
    pub metadata: ModelMetadata,
    pub digest: ModelDigest,
    pub loaded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Document format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    base_score: Option<f64>,
    trees: Vec<RawNode>,
    #[serde(default)]
    model_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    last_trained: Option<String>,
    #[serde(default)]
    training_set_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default)]
    nodeid: i64,
    #[serde(default)]
    leaf: Option<f64>,
    #[serde(default)]
    split: Option<String>,
    #[serde(default)]
    split_condition: Option<f64>,
    #[serde(default)]
    yes: Option<i64>,
    #[serde(default)]
    no: Option<i64>,
    #[serde(default)]
    children: Vec<RawNode>,
}

fn build_node(raw: &RawNode, tree: usize, depth: usize) -> Result<TreeNode, ArtifactError> {
    if depth > MAX_TREE_DEPTH {
        return Err(ArtifactError::TooDeep {
            tree,
            max: MAX_TREE_DEPTH,
        });
    }

    if let Some(value) = raw.leaf {
        if !value.is_finite() {
            return Err(ArtifactError::NonFinite {
                tree,
                node: raw.nodeid,
            });
        }
        return Ok(TreeNode::Leaf(value));
    }

    let (Some(feature), Some(threshold), Some(yes_id), Some(no_id)) =
        (&raw.split, raw.split_condition, raw.yes, raw.no)
    else {
        return Err(ArtifactError::InvalidNode {
            tree,
            node: raw.nodeid,
        });
    };
    if !threshold.is_finite() {
        return Err(ArtifactError::NonFinite {
            tree,
            node: raw.nodeid,
        });
    }

    let child = |id: i64| -> Result<TreeNode, ArtifactError> {
        let found = raw
            .children
            .iter()
            .find(|c| c.nodeid == id)
            .ok_or(ArtifactError::MissingChild {
                tree,
                node: raw.nodeid,
                child: id,
            })?;
        build_node(found, tree, depth + 1)
    };

    Ok(TreeNode::Internal {
        feature: feature.clone(),
        threshold,
        yes: Box::new(child(yes_id)?),
        no: Box::new(child(no_id)?),
    })
}

/// Accept RFC 3339 timestamps or bare `YYYY-MM-DD` dates.
fn parse_trained(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl ModelArtifact {
    /// Parse and validate a model document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let doc: RawDocument = serde_json::from_slice(bytes)?;
        if doc.trees.is_empty() {
            return Err(ArtifactError::NoTrees);
        }

        let trees = doc
            .trees
            .iter()
            .enumerate()
            .map(|(i, root)| build_node(root, i, 1))
            .collect::<Result<Vec<_>, _>>()?;

        let base_score = doc.base_score.unwrap_or(DEFAULT_BASE_SCORE);
        if !base_score.is_finite() {
            return Err(ArtifactError::NonFinite { tree: 0, node: -1 });
        }

        let last_trained = doc.last_trained.as_deref().and_then(|raw| {
            let parsed = parse_trained(raw);
            if parsed.is_none() {
                debug!(last_trained = %raw, "unrecognised training timestamp ignored");
            }
            parsed
        });

        Ok(Self {
            base_score,
            trees,
            metadata: ModelMetadata {
                model_name: doc
                    .model_name
                    .unwrap_or_else(|| "Generic XGBoost".to_string()),
                version: doc.version.unwrap_or_else(|| "1.0".to_string()),
                last_trained,
                training_set_size: doc.training_set_size,
            },
            digest: ModelDigest::from_bytes(bytes),
            loaded_at: Utc::now(),
        })
    }

    /// Every feature name any split in any tree tests.
    pub fn referenced_features(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        for tree in &self.trees {
            tree.collect_features(&mut out);
        }
        out
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_TREES: &str = r#"{
        "model_name": "readmission-30d",
        "version": "2.0",
        "last_trained": "2024-05-01",
        "training_set_size": 1200,
        "base_score": 0.0,
        "trees": [
            {"nodeid": 0, "split": "age", "split_condition": 75, "yes": 1, "no": 2,
             "children": [{"nodeid": 1, "leaf": 0.3}, {"nodeid": 2, "leaf": -0.2}]},
            {"nodeid": 0, "split": "er_visits", "split_condition": 1, "yes": 2, "no": 1,
             "children": [{"nodeid": 1, "leaf": 0.05}, {"nodeid": 2, "leaf": -0.1}]}
        ]
    }"#;

    #[test]
    fn parses_trees_and_metadata() {
        let model = ModelArtifact::from_bytes(TWO_TREES.as_bytes()).unwrap();
        assert_eq!(model.trees.len(), 2);
        assert_eq!(model.base_score, 0.0);
        assert_eq!(model.metadata.model_name, "readmission-30d");
        assert_eq!(model.metadata.training_set_size, Some(1200));
        assert!(model.metadata.last_trained.is_some());
        assert_eq!(
            model.referenced_features().into_iter().collect::<Vec<_>>(),
            vec!["age", "er_visits"]
        );
        assert_eq!(model.trees[0].depth(), 2);
    }

    #[test]
    fn defaults_when_metadata_missing() {
        let model =
            ModelArtifact::from_bytes(br#"{"trees": [{"nodeid": 0, "leaf": 0.1}]}"#).unwrap();
        assert_eq!(model.base_score, DEFAULT_BASE_SCORE);
        assert_eq!(model.version(), "1.0");
        assert!(model.metadata.last_trained.is_none());
    }

    #[test]
    fn digest_is_content_addressed() {
        let a = ModelArtifact::from_bytes(TWO_TREES.as_bytes()).unwrap();
        let b = ModelArtifact::from_bytes(TWO_TREES.as_bytes()).unwrap();
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.digest.as_str().len(), 64);
        assert_eq!(a.digest.short().len(), 12);
    }

    #[test]
    fn rejects_missing_child() {
        let doc = br#"{"trees": [{"nodeid": 0, "split": "age", "split_condition": 1,
                      "yes": 1, "no": 7, "children": [{"nodeid": 1, "leaf": 0.1}]}]}"#;
        assert!(matches!(
            ModelArtifact::from_bytes(doc),
            Err(ArtifactError::MissingChild { child: 7, .. })
        ));
    }

    #[test]
    fn rejects_truncated_and_empty_documents() {
        assert!(matches!(
            ModelArtifact::from_bytes(br#"{"trees": [{"nodeid": 0, "sp"#),
            Err(ArtifactError::Parse(_))
        ));
        assert!(matches!(
            ModelArtifact::from_bytes(br#"{"trees": []}"#),
            Err(ArtifactError::NoTrees)
        ));
        assert!(matches!(
            ModelArtifact::from_bytes(br#"{"trees": [{"nodeid": 0, "split": "age"}]}"#),
            Err(ArtifactError::InvalidNode { .. })
        ));
    }
}
