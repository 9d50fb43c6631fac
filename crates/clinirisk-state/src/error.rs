//! Error types for clinirisk-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the backing database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by `ClinicalStore` and `FeedbackLedger` operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// The store cannot be reached right now
    #[error("clinical store unavailable: {0}")]
    Unavailable(String),

    /// No patient with this identifier
    #[error("patient not found: {patient_id}")]
    PatientNotFound { patient_id: String },

    /// No assessment with this identifier
    #[error("assessment not found: {assessment_id}")]
    AssessmentNotFound { assessment_id: String },

    /// A multi-record write was rolled back
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
