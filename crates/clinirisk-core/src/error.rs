//! Error taxonomy for the risk engine.

use clinirisk_state::StorageError;

/// Present-but-invalid values in a patient bundle.
///
/// Absent fields are never an error; only values that exist and make no
/// clinical sense are rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("age {0} outside 0..=130")]
    AgeOutOfRange(i32),

    #[error("social vulnerability index {0} outside 1..=5")]
    VulnerabilityOutOfRange(i32),

    #[error("prior hospitalization count {0} is negative")]
    NegativeHospitalizations(i32),

    #[error("measurement {kind} has non-finite value")]
    NonFiniteMeasurement { kind: String },

    #[error("medication name is empty")]
    EmptyMedicationName,
}

/// Failures while reading or parsing a model artifact document.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact source unreachable: {0}")]
    Source(#[from] std::io::Error),

    #[error("artifact is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("artifact has no trees")]
    NoTrees,

    #[error("tree {tree}: node {node} references missing child {child}")]
    MissingChild { tree: usize, node: i64, child: i64 },

    #[error("tree {tree}: node {node} is neither a leaf nor a split")]
    InvalidNode { tree: usize, node: i64 },

    #[error("tree {tree}: non-finite value at node {node}")]
    NonFinite { tree: usize, node: i64 },

    #[error("tree {tree} exceeds maximum depth {max}")]
    TooDeep { tree: usize, max: usize },
}

/// Errors surfaced to callers of the scoring service.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no model artifact has ever been loaded")]
    ModelUnavailable,

    #[error("malformed record for patient {patient_id}: {reason}")]
    MalformedRecord {
        patient_id: String,
        reason: ValidationError,
    },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RiskError {
    /// `true` when the clinical store could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RiskError::Storage(StorageError::Unavailable(_)))
    }
}

/// Result type for risk engine operations.
pub type Result<T> = std::result::Result<T, RiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_record_names_patient_and_reason() {
        let err = RiskError::MalformedRecord {
            patient_id: "p-7".to_string(),
            reason: ValidationError::AgeOutOfRange(212),
        };
        let msg = err.to_string();
        assert!(msg.contains("p-7"));
        assert!(msg.contains("212"));
    }

    #[test]
    fn storage_unavailable_is_detected() {
        let err: RiskError = StorageError::Unavailable("down".to_string()).into();
        assert!(err.is_unavailable());
        assert!(!RiskError::ModelUnavailable.is_unavailable());
    }

    #[test]
    fn artifact_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ArtifactError = json_err.into();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
