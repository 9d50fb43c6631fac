//! Clinirisk-State: persistence layer for the Clinirisk risk engine
//!
//! This crate owns every byte that crosses the boundary to the clinical
//! store: patient demographics, medications, clinical events, measurements,
//! persisted risk assessments and the clinician feedback ledger.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: bulk reads for population scoring, atomic multi-patient risk
//! updates, and append-only feedback.
//!
//! ## Key Components
//!
//! - `ClinicalStore` / `FeedbackLedger`: backend-agnostic async traits
//! - `MemoryClinicalStore` / `MemoryFeedbackLedger`: in-memory fakes
//! - `SurrealClinicalStore`: SurrealDB adapter (mem, surrealkv, cloud)
//! - `CohortDocument`: JSON import format for whole populations

mod cohort;
mod connection;
mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use cohort::{CohortDocument, ImportSummary};
pub use error::{StateError, StorageError};
pub use schema::{
    AssessmentSource, AxisScores, ClinicalEventRecord, CompositeAssessment, Driver,
    DriverDirection, DriverImpact, EventKind, FeedbackRecord, MeasurementKind, MeasurementRecord,
    MedicationRecord, Outcome, Pathology, PatientRecord, RiskTier, RiskUpdate,
};
pub use storage_traits::{ClinicalStore, FeedbackLedger, StorageResult};
pub use surreal_store::SurrealClinicalStore;

/// Result type for connection-level operations
pub type Result<T> = std::result::Result<T, StateError>;
