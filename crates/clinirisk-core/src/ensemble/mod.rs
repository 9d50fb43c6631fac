//! Gradient-boosted tree ensemble: artifact, scoring and attribution.

pub mod artifact;
pub mod attribution;
pub mod predictor;

pub use artifact::{ModelArtifact, ModelDigest, ModelMetadata, TreeNode};
pub use attribution::{explain, Explanation};
pub use predictor::predict;

use chrono::{DateTime, Utc};
use clinirisk_state::{AssessmentSource, CompositeAssessment, RiskTier};
use uuid::Uuid;

use crate::features::{self, PatientBundle};

/// Score `bundle` against `model` and wrap the explanation as an assessment.
pub fn assess(model: &ModelArtifact, bundle: &PatientBundle, as_of: DateTime<Utc>) -> CompositeAssessment {
    let vector = features::extract(bundle, as_of).conform_to(model);
    let explanation = explain(model, &vector);
    CompositeAssessment {
        assessment_id: Uuid::new_v4(),
        patient_id: bundle.patient_id().to_string(),
        timestamp: as_of,
        total_score: explanation.score,
        risk_tier: RiskTier::from_score(explanation.score),
        drivers: explanation.drivers,
        source: AssessmentSource::TreeEnsemble {
            model_name: model.metadata.model_name.clone(),
            model_version: model.metadata.version.clone(),
        },
        axes: None,
        pathology: None,
    }
}
