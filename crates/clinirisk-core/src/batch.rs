//! Population re-scoring.
//!
//! [`BatchPipeline`] bulk-reads the clinical store once, groups records by
//! patient and scores every patient with the configured scorer. A failure
//! for one patient is logged with its id and counted; the run continues.
//!
//! Two commit modes:
//!
//! - [`CommitMode::PerItem`]: each patient's risk update is written as soon
//!   as it is scored, with bounded concurrency. Cancellation keeps what was
//!   already written.
//! - [`CommitMode::Transactional`]: every successful update goes to the
//!   store in one transaction. If the commit fails nothing is written and
//!   every scored patient is reported failed. Cancellation commits nothing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use clinirisk_state::{ClinicalStore, CompositeAssessment, RiskUpdate};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::config::{EngineConfig, DEFAULT_BATCH_CONCURRENCY};
use crate::ensemble::{self, ModelArtifact};
use crate::error::{Result, RiskError};
use crate::features::PatientBundle;
use crate::lifecycle::ModelLifecycleManager;
use crate::metrics::METRICS;
use crate::{axes, obs};

/// How scored updates reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    #[default]
    PerItem,
    Transactional,
}

impl CommitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitMode::PerItem => "per_item",
            CommitMode::Transactional => "transactional",
        }
    }
}

impl fmt::Display for CommitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_item" | "peritem" | "item" => Ok(CommitMode::PerItem),
            "transactional" | "transaction" | "tx" => Ok(CommitMode::Transactional),
            other => Err(format!(
                "unknown commit mode '{other}' (expected per_item or transactional)"
            )),
        }
    }
}

/// Which scorer the batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    #[default]
    Axes,
    Ensemble,
}

impl ScorerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerKind::Axes => "axes",
            ScorerKind::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScorerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "axes" | "rules" => Ok(ScorerKind::Axes),
            "ensemble" | "xgboost" | "model" => Ok(ScorerKind::Ensemble),
            other => Err(format!(
                "unknown scorer '{other}' (expected axes or ensemble)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub commit_mode: CommitMode,
    pub scorer: ScorerKind,
    /// In-flight patients in `PerItem` mode. Floored at 1.
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            commit_mode: CommitMode::PerItem,
            scorer: ScorerKind::Axes,
            concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl From<&EngineConfig> for BatchOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            commit_mode: config.batch_commit,
            scorer: config.batch_scorer,
            concurrency: config.batch_concurrency,
        }
    }
}

/// One patient the run could not score or write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub patient_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    /// Patients whose update was committed
    pub processed: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
    pub duration_ms: u64,
    pub cancelled: bool,
    pub commit_mode: CommitMode,
}

impl BatchSummary {
    pub fn failed_ids(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.patient_id.as_str())
    }
}

enum ItemOutcome {
    Committed,
    Failed(BatchFailure),
    Skipped,
}

pub struct BatchPipeline {
    store: Arc<dyn ClinicalStore>,
    models: Arc<ModelLifecycleManager>,
    options: BatchOptions,
}

impl BatchPipeline {
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        models: Arc<ModelLifecycleManager>,
        options: BatchOptions,
    ) -> Self {
        Self {
            store,
            models,
            options,
        }
    }

    pub fn options(&self) -> BatchOptions {
        self.options
    }

    /// Re-score the whole population as of `as_of`.
    ///
    /// Returns `Err` only when the bulk read fails. Per-patient problems are
    /// reported in the summary.
    pub async fn run(
        &self,
        as_of: DateTime<Utc>,
        cancel: watch::Receiver<bool>,
    ) -> Result<BatchSummary> {
        let run_id = Uuid::new_v4();
        let span = obs::batch_span(&run_id.to_string());
        self.run_inner(run_id, as_of, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        as_of: DateTime<Utc>,
        cancel: watch::Receiver<bool>,
    ) -> Result<BatchSummary> {
        let started = Instant::now();
        let run_label = run_id.to_string();

        let bundles = self.load_population().await?;
        obs::emit_batch_started(&run_label, bundles.len(), self.options.commit_mode.as_str());

        // one snapshot for the whole run, even if a reload lands midway
        let model = self.models.active();

        let (processed, failures, cancelled) = match self.options.commit_mode {
            CommitMode::PerItem => self.run_per_item(bundles, model, as_of, &cancel).await,
            CommitMode::Transactional => {
                self.run_transactional(bundles, model, as_of, &cancel).await
            }
        };

        for failure in &failures {
            METRICS.inc_batch_failures();
            obs::emit_batch_item_failed(&run_label, &failure.patient_id, &failure.error);
        }

        let summary = BatchSummary {
            run_id,
            processed,
            failed: failures.len(),
            failures,
            duration_ms: started.elapsed().as_millis() as u64,
            cancelled,
            commit_mode: self.options.commit_mode,
        };
        obs::emit_batch_finished(
            &run_label,
            summary.processed,
            summary.failed,
            summary.duration_ms,
            summary.cancelled,
        );
        METRICS.flush();
        Ok(summary)
    }

    async fn load_population(&self) -> Result<Vec<PatientBundle>> {
        let patients = self.store.list_patients().await?;
        let medications = self.store.all_medications().await?;
        let events = self.store.all_events().await?;
        let measurements = self.store.all_measurements().await?;
        Ok(PatientBundle::group(patients, medications, events, measurements))
    }

    async fn run_per_item(
        &self,
        bundles: Vec<PatientBundle>,
        model: Option<Arc<ModelArtifact>>,
        as_of: DateTime<Utc>,
        cancel: &watch::Receiver<bool>,
    ) -> (usize, Vec<BatchFailure>, bool) {
        let outcomes: Vec<ItemOutcome> = stream::iter(bundles)
            .map(|bundle| {
                let model = model.clone();
                async move {
                    if *cancel.borrow() {
                        return ItemOutcome::Skipped;
                    }
                    let patient_id = bundle.patient_id().to_string();
                    match self.score_and_write(&bundle, model.as_deref(), as_of).await {
                        Ok(()) => ItemOutcome::Committed,
                        Err(err) => ItemOutcome::Failed(BatchFailure {
                            patient_id,
                            error: err.to_string(),
                        }),
                    }
                }
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut processed = 0;
        let mut failures = Vec::new();
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Committed => processed += 1,
                ItemOutcome::Failed(f) => failures.push(f),
                ItemOutcome::Skipped => cancelled = true,
            }
        }
        failures.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
        (processed, failures, cancelled || *cancel.borrow())
    }

    async fn score_and_write(
        &self,
        bundle: &PatientBundle,
        model: Option<&ModelArtifact>,
        as_of: DateTime<Utc>,
    ) -> Result<()> {
        let assessment = self.score(bundle, model, as_of)?;
        self.store.update_patient_risk(&risk_update(&assessment)).await?;
        self.save(&assessment).await;
        Ok(())
    }

    async fn run_transactional(
        &self,
        bundles: Vec<PatientBundle>,
        model: Option<Arc<ModelArtifact>>,
        as_of: DateTime<Utc>,
        cancel: &watch::Receiver<bool>,
    ) -> (usize, Vec<BatchFailure>, bool) {
        let mut failures = Vec::new();
        let mut scored: Vec<CompositeAssessment> = Vec::with_capacity(bundles.len());

        for bundle in &bundles {
            if *cancel.borrow() {
                debug!(scored = scored.len(), "batch cancelled before commit");
                return (0, failures, true);
            }
            match self.score(bundle, model.as_deref(), as_of) {
                Ok(assessment) => scored.push(assessment),
                Err(err) => failures.push(BatchFailure {
                    patient_id: bundle.patient_id().to_string(),
                    error: err.to_string(),
                }),
            }
        }

        if *cancel.borrow() {
            return (0, failures, true);
        }
        if scored.is_empty() {
            return (0, failures, false);
        }

        let updates: Vec<RiskUpdate> = scored.iter().map(risk_update).collect();
        if let Err(err) = self.store.commit_risk_updates(&updates).await {
            warn!(error = %err, updates = updates.len(), "batch commit rolled back");
            let reason = err.to_string();
            failures.extend(scored.iter().map(|a| BatchFailure {
                patient_id: a.patient_id.clone(),
                error: reason.clone(),
            }));
            return (0, failures, false);
        }

        for assessment in &scored {
            self.save(assessment).await;
        }
        (scored.len(), failures, false)
    }

    fn score(
        &self,
        bundle: &PatientBundle,
        model: Option<&ModelArtifact>,
        as_of: DateTime<Utc>,
    ) -> Result<CompositeAssessment> {
        bundle
            .validate()
            .map_err(|reason| RiskError::MalformedRecord {
                patient_id: bundle.patient_id().to_string(),
                reason,
            })?;
        match self.options.scorer {
            ScorerKind::Axes => Ok(axes::assess(bundle, as_of).to_composite()),
            ScorerKind::Ensemble => {
                let model = model.ok_or(RiskError::ModelUnavailable)?;
                Ok(ensemble::assess(model, bundle, as_of))
            }
        }
    }

    /// History write after the risk update landed. A failure here does not
    /// undo the update, so it is logged rather than counted.
    async fn save(&self, assessment: &CompositeAssessment) {
        match self.store.save_assessment(assessment).await {
            Ok(()) => METRICS.inc_assessments(),
            Err(err) => warn!(
                patient_id = %assessment.patient_id,
                error = %err,
                "assessment history write failed"
            ),
        }
    }
}

pub(crate) fn risk_update(assessment: &CompositeAssessment) -> RiskUpdate {
    RiskUpdate {
        patient_id: assessment.patient_id.clone(),
        score: assessment.total_score,
        tier: assessment.risk_tier,
        updated_at: assessment.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_mode_parses_aliases() {
        assert_eq!("per-item".parse::<CommitMode>().unwrap(), CommitMode::PerItem);
        assert_eq!(
            "Transactional".parse::<CommitMode>().unwrap(),
            CommitMode::Transactional
        );
        assert!("sometimes".parse::<CommitMode>().is_err());
        assert_eq!(CommitMode::Transactional.to_string(), "transactional");
    }

    #[test]
    fn scorer_kind_parses() {
        assert_eq!("ensemble".parse::<ScorerKind>().unwrap(), ScorerKind::Ensemble);
        assert_eq!(" AXES ".parse::<ScorerKind>().unwrap(), ScorerKind::Axes);
        assert!("random".parse::<ScorerKind>().is_err());
    }

    #[test]
    fn options_follow_config() {
        let config = EngineConfig {
            batch_commit: CommitMode::Transactional,
            batch_scorer: ScorerKind::Ensemble,
            batch_concurrency: 2,
            ..EngineConfig::default()
        };
        let opts = BatchOptions::from(&config);
        assert_eq!(opts.commit_mode, CommitMode::Transactional);
        assert_eq!(opts.scorer, ScorerKind::Ensemble);
        assert_eq!(opts.concurrency, 2);
    }
}
