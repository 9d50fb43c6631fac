//! Scoring facade used by the CLI and the daemon.
//!
//! Every call reads a fresh [`PatientBundle`] from the clinical store and a
//! model snapshot from the lifecycle manager. Single-patient scoring
//! persists the assessment and publishes the new score on the patient row.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clinirisk_state::{
    AssessmentSource, ClinicalStore, CompositeAssessment, Driver, FeedbackLedger, FeedbackRecord,
    Outcome, RiskTier,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::instrument;
use uuid::Uuid;

use crate::analytics::{self, PopulationStats};
use crate::axes::{self, AxisAssessment};
use crate::batch::{risk_update, BatchOptions, BatchPipeline, BatchSummary};
use crate::ensemble::{self, ModelArtifact};
use crate::error::{Result, RiskError};
use crate::features::PatientBundle;
use crate::feedback::FeedbackService;
use crate::lifecycle::ModelLifecycleManager;
use crate::metrics::METRICS;
use crate::obs;

/// Tree-ensemble result for one patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResponse {
    pub assessment_id: Uuid,
    pub patient_id: String,
    pub score: u8,
    pub tier: RiskTier,
    pub drivers: Vec<Driver>,
    pub model_name: String,
    pub model_version: String,
}

impl ScoreResponse {
    fn from_assessment(assessment: &CompositeAssessment, model: &ModelArtifact) -> Self {
        Self {
            assessment_id: assessment.assessment_id,
            patient_id: assessment.patient_id.clone(),
            score: assessment.total_score,
            tier: assessment.risk_tier,
            drivers: assessment.drivers.clone(),
            model_name: model.metadata.model_name.clone(),
            model_version: model.metadata.version.clone(),
        }
    }
}

/// Both scorers side by side. They are not reconciled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DualAssessment {
    pub patient_id: String,
    pub ensemble: ScoreResponse,
    pub axes: AxisAssessment,
    /// `ensemble.score - axes.total`
    pub score_delta: i16,
    pub tiers_agree: bool,
}

pub struct RiskService {
    store: Arc<dyn ClinicalStore>,
    ledger: Arc<dyn FeedbackLedger>,
    models: Arc<ModelLifecycleManager>,
    feedback: FeedbackService,
}

impl RiskService {
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        ledger: Arc<dyn FeedbackLedger>,
        models: Arc<ModelLifecycleManager>,
    ) -> Self {
        let feedback = FeedbackService::new(Arc::clone(&store), Arc::clone(&ledger));
        Self {
            store,
            ledger,
            models,
            feedback,
        }
    }

    pub fn models(&self) -> &Arc<ModelLifecycleManager> {
        &self.models
    }

    pub fn feedback(&self) -> &FeedbackService {
        &self.feedback
    }

    /// Score with the active tree ensemble.
    ///
    /// Uses the last artifact that loaded successfully. Fails with
    /// `ModelUnavailable` only when no artifact has ever loaded.
    #[instrument(skip(self))]
    pub async fn score(&self, patient_id: &str) -> Result<ScoreResponse> {
        let model = self.models.require_active()?;
        let bundle = self.load(patient_id).await?;
        let assessment = ensemble::assess(&model, &bundle, Utc::now());
        self.persist(&assessment, true).await?;
        Ok(ScoreResponse::from_assessment(&assessment, &model))
    }

    /// Score with the multi-axis rules. Needs no model.
    #[instrument(skip(self))]
    pub async fn assess_axes(&self, patient_id: &str) -> Result<AxisAssessment> {
        let bundle = self.load(patient_id).await?;
        let assessment = axes::assess(&bundle, Utc::now());
        self.persist(&assessment.to_composite(), true).await?;
        Ok(assessment)
    }

    /// Run both scorers on one snapshot of the patient.
    ///
    /// Both assessments go to history; the patient row is left alone.
    /// A tier mismatch is logged as a warning.
    #[instrument(skip(self))]
    pub async fn assess_dual(&self, patient_id: &str) -> Result<DualAssessment> {
        let model = self.models.require_active()?;
        let bundle = self.load(patient_id).await?;
        let now = Utc::now();

        let tree = ensemble::assess(&model, &bundle, now);
        let rules = axes::assess(&bundle, now);
        self.persist(&tree, false).await?;
        self.persist(&rules.to_composite(), false).await?;

        let tiers_agree = tree.risk_tier == rules.tier;
        if !tiers_agree {
            obs::emit_scorer_disagreement(patient_id, tree.total_score, rules.total);
        }

        Ok(DualAssessment {
            patient_id: patient_id.to_string(),
            score_delta: i16::from(tree.total_score) - i16::from(rules.total),
            tiers_agree,
            ensemble: ScoreResponse::from_assessment(&tree, &model),
            axes: rules,
        })
    }

    pub async fn submit_feedback(
        &self,
        assessment_id: Uuid,
        outcome: Outcome,
        notes: Option<String>,
    ) -> Result<FeedbackRecord> {
        self.feedback.submit(assessment_id, outcome, notes).await
    }

    /// Saved assessments for one patient, oldest first.
    pub async fn risk_history(&self, patient_id: &str) -> Result<Vec<CompositeAssessment>> {
        self.store.get_patient(patient_id).await?;
        Ok(self.store.list_assessments(patient_id).await?)
    }

    pub async fn population_stats(&self) -> Result<PopulationStats> {
        self.population_stats_at(Utc::now()).await
    }

    pub async fn population_stats_at(&self, as_of: DateTime<Utc>) -> Result<PopulationStats> {
        let patients = self.store.list_patients().await?;
        let assessments = self.store.all_assessments().await?;
        let feedback = self.ledger.list().await?;
        Ok(analytics::summarize(&patients, &assessments, &feedback, as_of))
    }

    pub async fn run_batch(
        &self,
        options: BatchOptions,
        cancel: watch::Receiver<bool>,
    ) -> Result<BatchSummary> {
        BatchPipeline::new(Arc::clone(&self.store), Arc::clone(&self.models), options)
            .run(Utc::now(), cancel)
            .await
    }

    async fn load(&self, patient_id: &str) -> Result<PatientBundle> {
        let bundle = PatientBundle::fetch(self.store.as_ref(), patient_id).await?;
        bundle
            .validate()
            .map_err(|reason| RiskError::MalformedRecord {
                patient_id: patient_id.to_string(),
                reason,
            })?;
        Ok(bundle)
    }

    async fn persist(&self, assessment: &CompositeAssessment, publish: bool) -> Result<()> {
        // publish first: a failed update leaves no history row behind
        if publish {
            self.store
                .update_patient_risk(&risk_update(assessment))
                .await?;
        }
        self.store.save_assessment(assessment).await?;
        METRICS.inc_assessments();
        let source = match &assessment.source {
            AssessmentSource::TreeEnsemble { .. } => "tree_ensemble",
            AssessmentSource::AxisRules => "axis_rules",
        };
        obs::emit_assessment_saved(
            &assessment.patient_id,
            &assessment.assessment_id.to_string(),
            assessment.total_score,
            source,
        );
        Ok(())
    }
}
