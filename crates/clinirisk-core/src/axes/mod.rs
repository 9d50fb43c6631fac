//! Multi-axis rule-based risk: pathology normalization, per-axis rule
//! tables and weighted composition.

pub mod aggregator;
pub mod pathology;
pub mod rules;

pub use aggregator::{assess, composite_score, AxisAssessment};
pub use pathology::normalize as normalize_pathology;
pub use rules::{Axis, AxisResult, DrugClass, FiredRule};
