//! Clinician outcome feedback against past assessments.
//!
//! Append-only. Entries reference an assessment by id and never touch the
//! assessment itself. Nothing reads the ledger back into scoring yet.

use std::sync::Arc;

use clinirisk_state::{ClinicalStore, FeedbackLedger, FeedbackRecord, Outcome};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

pub struct FeedbackService {
    store: Arc<dyn ClinicalStore>,
    ledger: Arc<dyn FeedbackLedger>,
}

impl FeedbackService {
    pub fn new(store: Arc<dyn ClinicalStore>, ledger: Arc<dyn FeedbackLedger>) -> Self {
        Self { store, ledger }
    }

    /// Record `outcome` for an existing assessment.
    ///
    /// Fails with `AssessmentNotFound` when no such assessment was saved.
    pub async fn submit(
        &self,
        assessment_id: Uuid,
        outcome: Outcome,
        notes: Option<String>,
    ) -> Result<FeedbackRecord> {
        let assessment = self.store.get_assessment(assessment_id).await?;
        let notes = notes.filter(|n| !n.trim().is_empty());
        let entry = FeedbackRecord::new(assessment.assessment_id, outcome, notes);
        self.ledger.record(&entry).await?;
        info!(
            feedback_id = %entry.feedback_id,
            assessment_id = %assessment_id,
            patient_id = %assessment.patient_id,
            outcome = ?entry.actual_outcome,
            "feedback recorded"
        );
        Ok(entry)
    }

    /// Entries for one assessment, oldest first.
    pub async fn for_assessment(&self, assessment_id: Uuid) -> Result<Vec<FeedbackRecord>> {
        Ok(self.ledger.for_assessment(assessment_id).await?)
    }

    pub async fn all(&self) -> Result<Vec<FeedbackRecord>> {
        Ok(self.ledger.list().await?)
    }
}
