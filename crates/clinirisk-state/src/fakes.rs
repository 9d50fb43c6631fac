//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryClinicalStore` and `MemoryFeedbackLedger` that satisfy the
//! trait contracts without any external dependencies. Both support simulated
//! outages through `set_unavailable`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::schema::*;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryClinicalStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ClinicalTables {
    patients: BTreeMap<String, PatientRecord>,
    medications: Vec<MedicationRecord>,
    events: Vec<ClinicalEventRecord>,
    measurements: Vec<MeasurementRecord>,
    assessments: Vec<CompositeAssessment>,
}

/// In-memory clinical store backed by ordered maps and vectors.
#[derive(Debug, Default)]
pub struct MemoryClinicalStore {
    tables: Mutex<ClinicalTables>,
    unavailable: AtomicBool,
    reject_risk_updates: AtomicBool,
}

impl MemoryClinicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every subsequent call fails with
    /// `StorageError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail risk publishes (single and bulk) while reads and history
    /// writes keep working.
    pub fn set_reject_risk_updates(&self, reject: bool) {
        self.reject_risk_updates.store(reject, Ordering::SeqCst);
    }

    fn check_risk_write(&self) -> StorageResult<()> {
        self.check()?;
        if self.reject_risk_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("risk update rejected".to_string()));
        }
        Ok(())
    }

    fn check(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply_update(patient: &mut PatientRecord, update: &RiskUpdate) {
    patient.risk_score = Some(update.score);
    patient.risk_tier = Some(update.tier);
    patient.risk_updated_at = Some(update.updated_at);
}

#[async_trait]
impl ClinicalStore for MemoryClinicalStore {
    async fn get_patient(&self, patient_id: &str) -> StorageResult<PatientRecord> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        tables
            .patients
            .get(patient_id)
            .cloned()
            .ok_or_else(|| StorageError::PatientNotFound {
                patient_id: patient_id.to_string(),
            })
    }

    async fn list_patients(&self) -> StorageResult<Vec<PatientRecord>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.patients.values().cloned().collect())
    }

    async fn medications_for(&self, patient_id: &str) -> StorageResult<Vec<MedicationRecord>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .medications
            .iter()
            .filter(|m| m.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn events_for(&self, patient_id: &str) -> StorageResult<Vec<ClinicalEventRecord>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .events
            .iter()
            .filter(|e| e.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn measurements_for(&self, patient_id: &str) -> StorageResult<Vec<MeasurementRecord>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .measurements
            .iter()
            .filter(|m| m.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn all_medications(&self) -> StorageResult<Vec<MedicationRecord>> {
        self.check()?;
        Ok(self.tables.lock().unwrap().medications.clone())
    }

    async fn all_events(&self) -> StorageResult<Vec<ClinicalEventRecord>> {
        self.check()?;
        Ok(self.tables.lock().unwrap().events.clone())
    }

    async fn all_measurements(&self) -> StorageResult<Vec<MeasurementRecord>> {
        self.check()?;
        Ok(self.tables.lock().unwrap().measurements.clone())
    }

    async fn update_patient_risk(&self, update: &RiskUpdate) -> StorageResult<()> {
        self.check_risk_write()?;
        let mut tables = self.tables.lock().unwrap();
        let patient =
            tables
                .patients
                .get_mut(&update.patient_id)
                .ok_or_else(|| StorageError::PatientNotFound {
                    patient_id: update.patient_id.clone(),
                })?;
        apply_update(patient, update);
        Ok(())
    }

    async fn commit_risk_updates(&self, updates: &[RiskUpdate]) -> StorageResult<()> {
        self.check_risk_write()?;
        let mut tables = self.tables.lock().unwrap();
        // Validate everything first so a missing row leaves the table untouched.
        if let Some(missing) = updates
            .iter()
            .find(|u| !tables.patients.contains_key(&u.patient_id))
        {
            return Err(StorageError::TransactionAborted(format!(
                "patient {} no longer exists",
                missing.patient_id
            )));
        }
        for update in updates {
            if let Some(patient) = tables.patients.get_mut(&update.patient_id) {
                apply_update(patient, update);
            }
        }
        Ok(())
    }

    async fn save_assessment(&self, assessment: &CompositeAssessment) -> StorageResult<()> {
        self.check()?;
        self.tables
            .lock()
            .unwrap()
            .assessments
            .push(assessment.clone());
        Ok(())
    }

    async fn get_assessment(&self, assessment_id: Uuid) -> StorageResult<CompositeAssessment> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        tables
            .assessments
            .iter()
            .find(|a| a.assessment_id == assessment_id)
            .cloned()
            .ok_or_else(|| StorageError::AssessmentNotFound {
                assessment_id: assessment_id.to_string(),
            })
    }

    async fn list_assessments(&self, patient_id: &str) -> StorageResult<Vec<CompositeAssessment>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        let mut found: Vec<CompositeAssessment> = tables
            .assessments
            .iter()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.timestamp);
        Ok(found)
    }

    async fn all_assessments(&self) -> StorageResult<Vec<CompositeAssessment>> {
        self.check()?;
        let mut all = self.tables.lock().unwrap().assessments.clone();
        all.sort_by_key(|a| a.timestamp);
        Ok(all)
    }

    async fn put_patient(&self, patient: &PatientRecord) -> StorageResult<()> {
        self.check()?;
        self.tables
            .lock()
            .unwrap()
            .patients
            .insert(patient.patient_id.clone(), patient.clone());
        Ok(())
    }

    async fn put_medication(&self, medication: &MedicationRecord) -> StorageResult<()> {
        self.check()?;
        self.tables
            .lock()
            .unwrap()
            .medications
            .push(medication.clone());
        Ok(())
    }

    async fn put_event(&self, event: &ClinicalEventRecord) -> StorageResult<()> {
        self.check()?;
        self.tables.lock().unwrap().events.push(event.clone());
        Ok(())
    }

    async fn put_measurement(&self, measurement: &MeasurementRecord) -> StorageResult<()> {
        self.check()?;
        self.tables
            .lock()
            .unwrap()
            .measurements
            .push(measurement.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryFeedbackLedger
// ---------------------------------------------------------------------------

/// In-memory feedback ledger backed by an append-only `Vec`.
#[derive(Debug, Default)]
pub struct MemoryFeedbackLedger {
    entries: Mutex<Vec<FeedbackRecord>>,
    unavailable: AtomicBool,
}

impl MemoryFeedbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory ledger marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedbackLedger for MemoryFeedbackLedger {
    async fn record(&self, entry: &FeedbackRecord) -> StorageResult<()> {
        self.check()?;
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn for_assessment(&self, assessment_id: Uuid) -> StorageResult<Vec<FeedbackRecord>> {
        self.check()?;
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.assessment_id == assessment_id)
            .cloned()
            .collect())
    }

    async fn list(&self) -> StorageResult<Vec<FeedbackRecord>> {
        self.check()?;
        Ok(self.entries.lock().unwrap().clone())
    }
}
