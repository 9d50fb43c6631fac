//! Record types persisted in the clinical store
//!
//! Patient-side records (`PatientRecord`, `MedicationRecord`,
//! `ClinicalEventRecord`, `MeasurementRecord`) are read-mostly inputs to the
//! scorers. `CompositeAssessment` and `FeedbackRecord` are written by the
//! engine and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Patient-side records
// ---------------------------------------------------------------------------

/// Patient demographics plus the last published risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Stable patient identifier
    pub patient_id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Age in years
    #[serde(default)]
    pub age: Option<i32>,
    /// Free-text gender ("F", "femenino", "male", ...)
    #[serde(default)]
    pub gender: Option<String>,
    /// Free-text primary pathology as entered by the clinician
    #[serde(default)]
    pub primary_condition: Option<String>,
    /// Social vulnerability index (1 = none, 5 = extreme)
    #[serde(default)]
    pub social_vulnerability: Option<i32>,
    /// Prior hospitalization count, when recorded directly
    #[serde(default)]
    pub prior_hospitalizations: Option<i32>,
    /// Last published composite score
    #[serde(default)]
    pub risk_score: Option<u8>,
    /// Last published tier
    #[serde(default)]
    pub risk_tier: Option<RiskTier>,
    /// When the risk fields were last written
    #[serde(default)]
    pub risk_updated_at: Option<DateTime<Utc>>,
}

impl PatientRecord {
    /// Create a patient with only an identifier; every other field is absent.
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            name: None,
            age: None,
            gender: None,
            primary_condition: None,
            social_vulnerability: None,
            prior_hospitalizations: None,
            risk_score: None,
            risk_tier: None,
            risk_updated_at: None,
        }
    }

    pub fn with_age(mut self, age: i32) -> Self {
        self.age = Some(age);
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.primary_condition = Some(condition.into());
        self
    }

    pub fn with_social_vulnerability(mut self, index: i32) -> Self {
        self.social_vulnerability = Some(index);
        self
    }

    pub fn with_prior_hospitalizations(mut self, count: i32) -> Self {
        self.prior_hospitalizations = Some(count);
        self
    }
}

/// A prescribed medication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationRecord {
    pub patient_id: String,
    /// Generic or brand name
    pub name: String,
    /// Whether the prescription is currently active
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl MedicationRecord {
    pub fn active(patient_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            name: name.into(),
            active: true,
            started_at: None,
        }
    }
}

/// Kind of a clinical timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Hospitalization,
    ErVisit,
    Consultation,
    MedicationChange,
    MissedAppointment,
    Lab,
}

/// A dated entry on the patient's clinical timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalEventRecord {
    pub patient_id: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ClinicalEventRecord {
    pub fn new(patient_id: impl Into<String>, kind: EventKind, occurred_at: DateTime<Utc>) -> Self {
        Self {
            patient_id: patient_id.into(),
            kind,
            occurred_at,
            description: None,
        }
    }
}

/// What a measurement measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    /// Body weight (kg)
    Weight,
    /// Serum creatinine (mg/dL)
    Creatinine,
    /// Glycated hemoglobin (%)
    Hba1c,
    /// Systolic blood pressure (mmHg)
    SystolicBp,
    /// Anything else, keyed by its label
    Other(String),
}

/// A dated numeric measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub patient_id: String,
    pub kind: MeasurementKind,
    pub value: f64,
    pub measured_at: DateTime<Utc>,
}

impl MeasurementRecord {
    pub fn new(
        patient_id: impl Into<String>,
        kind: MeasurementKind,
        value: f64,
        measured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            kind,
            value,
            measured_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Assessments
// ---------------------------------------------------------------------------

/// Discrete risk bucket derived from a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    /// Bucket a composite score: CRITICAL >75, HIGH >50, MEDIUM >25, else LOW.
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s > 75 => RiskTier::Critical,
            s if s > 50 => RiskTier::High,
            s if s > 25 => RiskTier::Medium,
            _ => RiskTier::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way a driver pushes the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverDirection {
    IncreasesRisk,
    DecreasesRisk,
}

/// Impact bucket attached to tree-ensemble attributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DriverImpact {
    Medium,
    High,
    Critical,
}

impl DriverImpact {
    /// Critical above 0.5, High above 0.2, Medium otherwise.
    pub fn from_contribution(contribution: f64) -> Self {
        if contribution > 0.5 {
            DriverImpact::Critical
        } else if contribution > 0.2 {
            DriverImpact::High
        } else {
            DriverImpact::Medium
        }
    }
}

/// A feature (or fired rule) identified as moving the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub feature: String,
    pub magnitude: f64,
    pub direction: DriverDirection,
    #[serde(default)]
    pub impact: Option<DriverImpact>,
}

/// Normalized primary pathology used to pick the clinical rule branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pathology {
    HeartFailure,
    Asthma,
    Diabetes,
    Hypertension,
    Default,
}

/// The three rule-based sub-scores, each in [0,100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisScores {
    pub clinical: u8,
    pub pharmacological: u8,
    pub contextual: u8,
}

/// Which scorer produced an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssessmentSource {
    TreeEnsemble { model_name: String, model_version: String },
    AxisRules,
}

/// One scoring result for one patient at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeAssessment {
    pub assessment_id: Uuid,
    pub patient_id: String,
    pub timestamp: DateTime<Utc>,
    /// 0-100
    pub total_score: u8,
    pub risk_tier: RiskTier,
    /// Ranked, strongest first
    pub drivers: Vec<Driver>,
    pub source: AssessmentSource,
    /// Present for rule-based assessments
    #[serde(default)]
    pub axes: Option<AxisScores>,
    /// Present for rule-based assessments
    #[serde(default)]
    pub pathology: Option<Pathology>,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Score and tier to publish on a patient row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskUpdate {
    pub patient_id: String,
    pub score: u8,
    pub tier: RiskTier,
    pub updated_at: DateTime<Utc>,
}

/// Observed outcome reported by a clinician after an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Hospitalized,
    Readmitted,
    Deceased,
    NoEvent,
    Other(String),
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("outcome must not be empty".to_string());
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "hospitalized" => Outcome::Hospitalized,
            "readmitted" => Outcome::Readmitted,
            "deceased" => Outcome::Deceased,
            "no_event" | "none" => Outcome::NoEvent,
            _ => Outcome::Other(trimmed.to_string()),
        })
    }
}

/// Append-only feedback entry. `assessment_id` is a weak reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub feedback_id: Uuid,
    pub assessment_id: Uuid,
    pub actual_outcome: Outcome,
    #[serde(default)]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(assessment_id: Uuid, actual_outcome: Outcome, notes: Option<String>) -> Self {
        Self {
            feedback_id: Uuid::new_v4(),
            assessment_id,
            actual_outcome,
            notes,
            recorded_at: Utc::now(),
        }
    }
}
