//! Feature extraction: patient records → flat numeric [`FeatureVector`].
//!
//! A [`PatientBundle`] groups one patient with its dependent records. It is
//! the single input shape for both scorers, built either per patient from
//! the store or for a whole population from bulk reads.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use clinirisk_state::{
    ClinicalEventRecord, ClinicalStore, EventKind, MeasurementKind, MeasurementRecord,
    MedicationRecord, Pathology, PatientRecord, StorageResult,
};
use serde::{Deserialize, Serialize};

use crate::axes::pathology;
use crate::calculators;
use crate::ensemble::ModelArtifact;
use crate::error::ValidationError;

/// Window for "recent" medication changes.
pub const RECENT_CHANGE_WINDOW_DAYS: i64 = 90;

pub const AGE: &str = "age";
pub const MEDICATION_COUNT: &str = "medication_count";
pub const PRIOR_HOSPITALIZATIONS: &str = "prior_hospitalizations";
pub const SOCIAL_VULNERABILITY: &str = "social_vulnerability";
pub const HAS_HEART_FAILURE: &str = "has_heart_failure";
pub const HAS_DIABETES: &str = "has_diabetes";
pub const HAS_HYPERTENSION: &str = "has_hypertension";
pub const HAS_ASTHMA: &str = "has_asthma";
pub const ER_VISITS: &str = "er_visits";
pub const RECENT_MEDICATION_CHANGES: &str = "recent_medication_changes";
pub const LATEST_CREATININE: &str = "latest_creatinine";
pub const WEIGHT_DELTA: &str = "weight_delta";
pub const EGFR: &str = "egfr";
pub const CHA2DS2_VASC: &str = "cha2ds2_vasc";
pub const EVENT_COUNT: &str = "event_count";

// ---------------------------------------------------------------------------
// FeatureVector
// ---------------------------------------------------------------------------

/// Feature name → value. Missing names read as 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `name`, 0 when absent or non-finite.
    pub fn get(&self, name: &str) -> f64 {
        match self.0.get(name) {
            Some(v) if v.is_finite() => *v,
            _ => 0.0,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Add every feature the model splits on, defaulting to 0.
    pub fn conform_to(mut self, model: &ModelArtifact) -> Self {
        for name in model.referenced_features() {
            self.0.entry(name.to_string()).or_insert(0.0);
        }
        self
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ---------------------------------------------------------------------------
// PatientBundle
// ---------------------------------------------------------------------------

/// One patient plus every dependent record the scorers read.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientBundle {
    pub patient: PatientRecord,
    pub medications: Vec<MedicationRecord>,
    pub events: Vec<ClinicalEventRecord>,
    pub measurements: Vec<MeasurementRecord>,
}

impl PatientBundle {
    pub fn new(patient: PatientRecord) -> Self {
        Self {
            patient,
            medications: Vec::new(),
            events: Vec::new(),
            measurements: Vec::new(),
        }
    }

    /// Load one patient and its dependent records.
    pub async fn fetch(store: &dyn ClinicalStore, patient_id: &str) -> StorageResult<Self> {
        let patient = store.get_patient(patient_id).await?;
        let medications = store.medications_for(patient_id).await?;
        let events = store.events_for(patient_id).await?;
        let measurements = store.measurements_for(patient_id).await?;
        Ok(Self {
            patient,
            medications,
            events,
            measurements,
        })
    }

    /// Group bulk-read records by patient, preserving patient order.
    /// Records whose patient is not in `patients` are dropped.
    pub fn group(
        patients: Vec<PatientRecord>,
        medications: Vec<MedicationRecord>,
        events: Vec<ClinicalEventRecord>,
        measurements: Vec<MeasurementRecord>,
    ) -> Vec<PatientBundle> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(patients.len());
        let mut bundles: Vec<PatientBundle> = Vec::with_capacity(patients.len());
        for patient in patients {
            index.insert(patient.patient_id.clone(), bundles.len());
            bundles.push(PatientBundle::new(patient));
        }

        for m in medications {
            if let Some(&i) = index.get(&m.patient_id) {
                bundles[i].medications.push(m);
            }
        }
        for e in events {
            if let Some(&i) = index.get(&e.patient_id) {
                bundles[i].events.push(e);
            }
        }
        for m in measurements {
            if let Some(&i) = index.get(&m.patient_id) {
                bundles[i].measurements.push(m);
            }
        }
        bundles
    }

    pub fn patient_id(&self) -> &str {
        &self.patient.patient_id
    }

    /// Reject present-but-invalid values. Absent fields pass.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(age) = self.patient.age {
            if !(0..=130).contains(&age) {
                return Err(ValidationError::AgeOutOfRange(age));
            }
        }
        if let Some(svi) = self.patient.social_vulnerability {
            if !(1..=5).contains(&svi) {
                return Err(ValidationError::VulnerabilityOutOfRange(svi));
            }
        }
        if let Some(n) = self.patient.prior_hospitalizations {
            if n < 0 {
                return Err(ValidationError::NegativeHospitalizations(n));
            }
        }
        if let Some(m) = self.measurements.iter().find(|m| !m.value.is_finite()) {
            return Err(ValidationError::NonFiniteMeasurement {
                kind: format!("{:?}", m.kind),
            });
        }
        if self.medications.iter().any(|m| m.name.trim().is_empty()) {
            return Err(ValidationError::EmptyMedicationName);
        }
        Ok(())
    }

    pub fn pathology(&self) -> Pathology {
        pathology::normalize(self.patient.primary_condition.as_deref())
    }

    pub fn active_medications(&self) -> impl Iterator<Item = &MedicationRecord> {
        self.medications.iter().filter(|m| m.active)
    }

    pub fn count_events(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Events of `kind` within `days` before `as_of` (inclusive of `as_of`).
    pub fn count_recent_events(&self, kind: EventKind, as_of: DateTime<Utc>, days: i64) -> usize {
        let since = as_of - Duration::days(days);
        self.events
            .iter()
            .filter(|e| e.kind == kind && e.occurred_at >= since && e.occurred_at <= as_of)
            .count()
    }

    /// Recorded prior-hospitalization count, else hospitalization events.
    pub fn prior_hospitalizations(&self) -> u32 {
        match self.patient.prior_hospitalizations {
            Some(n) => n.max(0) as u32,
            None => self.count_events(EventKind::Hospitalization) as u32,
        }
    }

    /// Values of one measurement kind, oldest first.
    pub fn series(&self, kind: &MeasurementKind) -> Vec<f64> {
        let mut points: Vec<&MeasurementRecord> = self
            .measurements
            .iter()
            .filter(|m| &m.kind == kind)
            .collect();
        points.sort_by_key(|m| m.measured_at);
        points.into_iter().map(|m| m.value).collect()
    }

    pub fn latest(&self, kind: &MeasurementKind) -> Option<f64> {
        self.series(kind).last().copied()
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Build the canonical feature vector for `bundle` as of `as_of`.
pub fn extract(bundle: &PatientBundle, as_of: DateTime<Utc>) -> FeatureVector {
    let patient = &bundle.patient;
    let pathology = bundle.pathology();

    let weights = bundle.series(&MeasurementKind::Weight);
    let weight_delta = match weights.as_slice() {
        [.., prev, last] => last - prev,
        _ => 0.0,
    };
    let creatinine = bundle.latest(&MeasurementKind::Creatinine);
    let egfr = match (creatinine, patient.age) {
        (Some(scr), Some(age)) => {
            let female = calculators::is_female(patient.gender.as_deref());
            calculators::mdrd_egfr(scr, age, female).map_or(0.0, |r| r.gfr)
        }
        _ => 0.0,
    };
    let stroke = calculators::cha2ds2_vasc(patient, &bundle.events);

    FeatureVector::new()
        .with(AGE, f64::from(patient.age.unwrap_or(0)))
        .with(MEDICATION_COUNT, bundle.active_medications().count() as f64)
        .with(PRIOR_HOSPITALIZATIONS, f64::from(bundle.prior_hospitalizations()))
        .with(
            SOCIAL_VULNERABILITY,
            f64::from(patient.social_vulnerability.unwrap_or(0)),
        )
        .with(HAS_HEART_FAILURE, flag(pathology == Pathology::HeartFailure))
        .with(HAS_DIABETES, flag(pathology == Pathology::Diabetes))
        .with(HAS_HYPERTENSION, flag(pathology == Pathology::Hypertension))
        .with(HAS_ASTHMA, flag(pathology == Pathology::Asthma))
        .with(ER_VISITS, bundle.count_events(EventKind::ErVisit) as f64)
        .with(
            RECENT_MEDICATION_CHANGES,
            bundle.count_recent_events(EventKind::MedicationChange, as_of, RECENT_CHANGE_WINDOW_DAYS)
                as f64,
        )
        .with(LATEST_CREATININE, creatinine.unwrap_or(0.0))
        .with(WEIGHT_DELTA, weight_delta)
        .with(EGFR, egfr)
        .with(CHA2DS2_VASC, f64::from(stroke.score))
        .with(EVENT_COUNT, bundle.events.len() as f64)
}
