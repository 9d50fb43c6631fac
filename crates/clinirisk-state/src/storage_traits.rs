//! Storage trait definitions for Clinirisk
//!
//! These traits define the two storage abstractions the engine consumes:
//! - `ClinicalStore`: patient-side reads, risk writes, assessment persistence
//! - `FeedbackLedger`: append-only clinician outcome labels
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::schema::{
    ClinicalEventRecord, CompositeAssessment, FeedbackRecord, MeasurementRecord,
    MedicationRecord, PatientRecord, RiskUpdate,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ClinicalStore - Patient/Clinical Store
// ---------------------------------------------------------------------------

/// Patient/clinical store.
///
/// Guarantees:
/// - Per-patient reads return only records for that patient.
/// - Bulk reads (`all_*`) return every record in one round-trip so that
///   population scoring never issues per-patient queries.
/// - `commit_risk_updates` is all-or-nothing: either every update is
///   applied or none is (`StorageError::TransactionAborted`).
/// - Assessments are immutable once saved.
#[async_trait]
pub trait ClinicalStore: Send + Sync {
    /// Fetch one patient. Returns `StorageError::PatientNotFound` if absent.
    async fn get_patient(&self, patient_id: &str) -> StorageResult<PatientRecord>;

    /// List every patient, ordered by `patient_id`.
    async fn list_patients(&self) -> StorageResult<Vec<PatientRecord>>;

    /// Medications of one patient.
    async fn medications_for(&self, patient_id: &str) -> StorageResult<Vec<MedicationRecord>>;

    /// Clinical events of one patient.
    async fn events_for(&self, patient_id: &str) -> StorageResult<Vec<ClinicalEventRecord>>;

    /// Measurements of one patient.
    async fn measurements_for(&self, patient_id: &str) -> StorageResult<Vec<MeasurementRecord>>;

    /// Every medication in the store.
    async fn all_medications(&self) -> StorageResult<Vec<MedicationRecord>>;

    /// Every clinical event in the store.
    async fn all_events(&self) -> StorageResult<Vec<ClinicalEventRecord>>;

    /// Every measurement in the store.
    async fn all_measurements(&self) -> StorageResult<Vec<MeasurementRecord>>;

    /// Publish score and tier on one patient row.
    async fn update_patient_risk(&self, update: &RiskUpdate) -> StorageResult<()>;

    /// Publish many updates atomically.
    async fn commit_risk_updates(&self, updates: &[RiskUpdate]) -> StorageResult<()>;

    /// Persist an assessment record.
    async fn save_assessment(&self, assessment: &CompositeAssessment) -> StorageResult<()>;

    /// Fetch an assessment. Returns `StorageError::AssessmentNotFound` if absent.
    async fn get_assessment(&self, assessment_id: Uuid) -> StorageResult<CompositeAssessment>;

    /// Assessments of one patient, oldest first.
    async fn list_assessments(&self, patient_id: &str) -> StorageResult<Vec<CompositeAssessment>>;

    /// Every stored assessment, oldest first.
    async fn all_assessments(&self) -> StorageResult<Vec<CompositeAssessment>>;

    /// Insert or replace a patient row.
    async fn put_patient(&self, patient: &PatientRecord) -> StorageResult<()>;

    async fn put_medication(&self, medication: &MedicationRecord) -> StorageResult<()>;

    async fn put_event(&self, event: &ClinicalEventRecord) -> StorageResult<()>;

    async fn put_measurement(&self, measurement: &MeasurementRecord) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// FeedbackLedger - clinician outcome labels
// ---------------------------------------------------------------------------

/// Append-only ledger of outcome labels.
///
/// Semantics:
/// - `record` never mutates or deletes the referenced assessment.
/// - Multiple entries for the same assessment are kept in insertion order.
#[async_trait]
pub trait FeedbackLedger: Send + Sync {
    /// Append an entry.
    async fn record(&self, entry: &FeedbackRecord) -> StorageResult<()>;

    /// Entries referencing one assessment, oldest first.
    async fn for_assessment(&self, assessment_id: Uuid) -> StorageResult<Vec<FeedbackRecord>>;

    /// Every entry, oldest first.
    async fn list(&self) -> StorageResult<Vec<FeedbackRecord>>;
}
