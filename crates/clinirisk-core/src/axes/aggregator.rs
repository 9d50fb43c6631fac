//! Weighted composition of the three axes into one assessment.

use chrono::{DateTime, Utc};
use clinirisk_state::{
    AssessmentSource, AxisScores, CompositeAssessment, Driver, DriverDirection, Pathology,
    RiskTier,
};
use serde::Serialize;
use uuid::Uuid;

use super::rules::{self, FiredRule};
use crate::features::PatientBundle;

pub const CLINICAL_WEIGHT: f64 = 0.5;
pub const PHARMACOLOGICAL_WEIGHT: f64 = 0.3;
pub const CONTEXTUAL_WEIGHT: f64 = 0.2;

/// Rule-based assessment of one patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisAssessment {
    pub assessment_id: Uuid,
    pub patient_id: String,
    pub timestamp: DateTime<Utc>,
    pub total: u8,
    pub tier: RiskTier,
    pub axes: AxisScores,
    pub pathology_used: Pathology,
    pub drivers: Vec<Driver>,
}

impl AxisAssessment {
    pub fn to_composite(&self) -> CompositeAssessment {
        CompositeAssessment {
            assessment_id: self.assessment_id,
            patient_id: self.patient_id.clone(),
            timestamp: self.timestamp,
            total_score: self.total,
            risk_tier: self.tier,
            drivers: self.drivers.clone(),
            source: AssessmentSource::AxisRules,
            axes: Some(self.axes),
            pathology: Some(self.pathology_used),
        }
    }
}

/// `round(0.5·clinical + 0.3·pharmacological + 0.2·contextual)`.
pub fn composite_score(axes: &AxisScores) -> u8 {
    let total = CLINICAL_WEIGHT * f64::from(axes.clinical)
        + PHARMACOLOGICAL_WEIGHT * f64::from(axes.pharmacological)
        + CONTEXTUAL_WEIGHT * f64::from(axes.contextual);
    total.round().clamp(0.0, 100.0) as u8
}

/// Fired rules as drivers: points descending, ties by rule name.
fn rank(mut fired: Vec<FiredRule>) -> Vec<Driver> {
    fired.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(b.name)));
    fired
        .into_iter()
        .map(|rule| Driver {
            feature: rule.name.to_string(),
            magnitude: f64::from(rule.points),
            direction: DriverDirection::IncreasesRisk,
            impact: None,
        })
        .collect()
}

/// Score `bundle` on all three axes as of `as_of`.
pub fn assess(bundle: &PatientBundle, as_of: DateTime<Utc>) -> AxisAssessment {
    let pathology = bundle.pathology();
    let clinical = rules::clinical_axis(bundle, pathology);
    let pharmacological = rules::pharmacological_axis(bundle, as_of);
    let contextual = rules::contextual_axis(bundle);

    let axes = AxisScores {
        clinical: clinical.score,
        pharmacological: pharmacological.score,
        contextual: contextual.score,
    };
    let total = composite_score(&axes);

    let mut fired = clinical.fired;
    fired.extend(pharmacological.fired);
    fired.extend(contextual.fired);

    AxisAssessment {
        assessment_id: Uuid::new_v4(),
        patient_id: bundle.patient_id().to_string(),
        timestamp: as_of,
        total,
        tier: RiskTier::from_score(total),
        axes,
        pathology_used: pathology,
        drivers: rank(fired),
    }
}
