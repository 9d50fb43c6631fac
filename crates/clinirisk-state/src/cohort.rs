//! JSON import format for whole patient populations

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StateError;
use crate::schema::{ClinicalEventRecord, MeasurementRecord, MedicationRecord, PatientRecord};
use crate::storage_traits::{ClinicalStore, StorageResult};

/// A population snapshot: patients plus their dependent records.
///
/// ```json
/// {
///   "patients":     [{ "patient_id": "p1", "age": 81, "primary_condition": "Heart failure" }],
///   "medications":  [{ "patient_id": "p1", "name": "furosemide" }],
///   "events":       [{ "patient_id": "p1", "kind": "er_visit", "occurred_at": "2024-03-01T00:00:00Z" }],
///   "measurements": [{ "patient_id": "p1", "kind": "weight", "value": 80.0, "measured_at": "..." }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortDocument {
    #[serde(default)]
    pub patients: Vec<PatientRecord>,
    #[serde(default)]
    pub medications: Vec<MedicationRecord>,
    #[serde(default)]
    pub events: Vec<ClinicalEventRecord>,
    #[serde(default)]
    pub measurements: Vec<MeasurementRecord>,
}

/// Counts of records written by [`CohortDocument::import_into`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub patients: usize,
    pub medications: usize,
    pub events: usize,
    pub measurements: usize,
}

impl CohortDocument {
    /// Parse a cohort from JSON text.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(StateError::from)
    }

    /// Write every record into `store`, patients first.
    ///
    /// Stops at the first failing write; records already written stay.
    pub async fn import_into(&self, store: &dyn ClinicalStore) -> StorageResult<ImportSummary> {
        let mut summary = ImportSummary::default();

        for patient in &self.patients {
            store.put_patient(patient).await?;
            summary.patients += 1;
        }
        for medication in &self.medications {
            store.put_medication(medication).await?;
            summary.medications += 1;
        }
        for event in &self.events {
            store.put_event(event).await?;
            summary.events += 1;
        }
        for measurement in &self.measurements {
            store.put_measurement(measurement).await?;
            summary.measurements += 1;
        }

        info!(
            patients = summary.patients,
            medications = summary.medications,
            events = summary.events,
            measurements = summary.measurements,
            "cohort imported"
        );
        Ok(summary)
    }
}
