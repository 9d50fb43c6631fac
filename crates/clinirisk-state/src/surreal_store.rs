//! SurrealDB-backed ClinicalStore and FeedbackLedger implementation
//!
//! Rows keep their lookup keys as plain strings next to a `doc` object
//! holding the full record, converting to/from `schema` types at the
//! boundary.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::connection;
use crate::error::StorageError;
use crate::migrations;
use crate::schema::{
    ClinicalEventRecord, CompositeAssessment, FeedbackRecord, MeasurementRecord,
    MedicationRecord, PatientRecord, RiskUpdate,
};
use crate::storage_traits::{ClinicalStore, FeedbackLedger, StorageResult};

const TABLE_PATIENTS: &str = "patients";
const TABLE_MEDICATIONS: &str = "medications";
const TABLE_EVENTS: &str = "clinical_events";
const TABLE_MEASUREMENTS: &str = "measurements";
const TABLE_ASSESSMENTS: &str = "risk_assessments";
const TABLE_FEEDBACK: &str = "feedback";

/// Row for `patients`, `medications`, `clinical_events`, `measurements`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PatientKeyedRow {
    patient_id: String,
    doc: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssessmentRow {
    assessment_id: String,
    patient_id: String,
    doc: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeedbackRow {
    feedback_id: String,
    assessment_id: String,
    doc: serde_json::Value,
}

/// Bound parameter for risk updates.
#[derive(Debug, Clone, Serialize)]
struct RiskUpdateParam {
    patient_id: String,
    score: i64,
    tier: String,
    updated_at: String,
}

impl From<&RiskUpdate> for RiskUpdateParam {
    fn from(u: &RiskUpdate) -> Self {
        Self {
            patient_id: u.patient_id.clone(),
            score: i64::from(u.score),
            tier: u.tier.as_str().to_string(),
            updated_at: u.updated_at.to_rfc3339(),
        }
    }
}

fn to_doc<T: Serialize>(record: &T) -> StorageResult<serde_json::Value> {
    serde_json::to_value(record).map_err(|e| StorageError::Backend(e.to_string()))
}

fn from_doc<T: DeserializeOwned>(doc: serde_json::Value) -> StorageResult<T> {
    serde_json::from_value(doc).map_err(|e| StorageError::Backend(e.to_string()))
}

/// SurrealDB-backed implementation of [`ClinicalStore`] and [`FeedbackLedger`].
#[derive(Clone)]
pub struct SurrealClinicalStore {
    db: Surreal<Any>,
}

impl SurrealClinicalStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `clinirisk/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = connection::connect_url("mem://").await?;
        migrations::init_schema(&db).await?;
        info!("SurrealClinicalStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect to an explicit endpoint (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn from_url(url: &str) -> crate::Result<Self> {
        let db = connection::connect_url(url).await?;
        migrations::init_schema(&db).await?;
        info!("SurrealClinicalStore connected to {}", url);
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Cloud config, then `SURREALDB_URL`, then local `.clinirisk/db`.
    pub async fn from_env() -> crate::Result<Self> {
        let db = connection::connect_from_env().await?;
        migrations::init_schema(&db).await?;
        info!("SurrealClinicalStore connected");
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn select_patient_keyed<T: DeserializeOwned>(
        &self,
        table: &'static str,
        patient_id: Option<&str>,
    ) -> StorageResult<Vec<T>> {
        let rows: Vec<PatientKeyedRow> = match patient_id {
            Some(pid) => {
                let mut res = self
                    .db
                    .query("SELECT * FROM type::table($table) WHERE patient_id = $pid")
                    .bind(("table", table))
                    .bind(("pid", pid.to_string()))
                    .await?;
                res.take(0)?
            }
            None => {
                let mut res = self
                    .db
                    .query("SELECT * FROM type::table($table)")
                    .bind(("table", table))
                    .await?;
                res.take(0)?
            }
        };
        rows.into_iter().map(|r| from_doc(r.doc)).collect()
    }

    async fn insert_patient_keyed<T: Serialize>(
        &self,
        table: &'static str,
        patient_id: &str,
        record: &T,
    ) -> StorageResult<()> {
        let row = PatientKeyedRow {
            patient_id: patient_id.to_string(),
            doc: to_doc(record)?,
        };
        let _created: Option<PatientKeyedRow> = self.db.create(table).content(row).await?;
        Ok(())
    }

    async fn select_assessments(&self, patient_id: Option<&str>) -> StorageResult<Vec<CompositeAssessment>> {
        let rows: Vec<AssessmentRow> = match patient_id {
            Some(pid) => {
                let mut res = self
                    .db
                    .query("SELECT * FROM risk_assessments WHERE patient_id = $pid")
                    .bind(("pid", pid.to_string()))
                    .await?;
                res.take(0)?
            }
            None => {
                let mut res = self.db.query("SELECT * FROM risk_assessments").await?;
                res.take(0)?
            }
        };
        let mut assessments = rows
            .into_iter()
            .map(|r| from_doc(r.doc))
            .collect::<StorageResult<Vec<CompositeAssessment>>>()?;
        assessments.sort_by_key(|a| a.timestamp);
        Ok(assessments)
    }
}

#[async_trait]
impl ClinicalStore for SurrealClinicalStore {
    #[instrument(skip(self))]
    async fn get_patient(&self, patient_id: &str) -> StorageResult<PatientRecord> {
        let mut found: Vec<PatientRecord> = self
            .select_patient_keyed(TABLE_PATIENTS, Some(patient_id))
            .await?;
        found.pop().ok_or_else(|| StorageError::PatientNotFound {
            patient_id: patient_id.to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn list_patients(&self) -> StorageResult<Vec<PatientRecord>> {
        let mut patients: Vec<PatientRecord> =
            self.select_patient_keyed(TABLE_PATIENTS, None).await?;
        patients.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
        Ok(patients)
    }

    async fn medications_for(&self, patient_id: &str) -> StorageResult<Vec<MedicationRecord>> {
        self.select_patient_keyed(TABLE_MEDICATIONS, Some(patient_id))
            .await
    }

    async fn events_for(&self, patient_id: &str) -> StorageResult<Vec<ClinicalEventRecord>> {
        self.select_patient_keyed(TABLE_EVENTS, Some(patient_id)).await
    }

    async fn measurements_for(&self, patient_id: &str) -> StorageResult<Vec<MeasurementRecord>> {
        self.select_patient_keyed(TABLE_MEASUREMENTS, Some(patient_id))
            .await
    }

    #[instrument(skip(self))]
    async fn all_medications(&self) -> StorageResult<Vec<MedicationRecord>> {
        self.select_patient_keyed(TABLE_MEDICATIONS, None).await
    }

    #[instrument(skip(self))]
    async fn all_events(&self) -> StorageResult<Vec<ClinicalEventRecord>> {
        self.select_patient_keyed(TABLE_EVENTS, None).await
    }

    #[instrument(skip(self))]
    async fn all_measurements(&self) -> StorageResult<Vec<MeasurementRecord>> {
        self.select_patient_keyed(TABLE_MEASUREMENTS, None).await
    }

    #[instrument(skip(self, update), fields(patient_id = %update.patient_id))]
    async fn update_patient_risk(&self, update: &RiskUpdate) -> StorageResult<()> {
        let param = RiskUpdateParam::from(update);
        let mut res = self
            .db
            .query(
                "UPDATE patients SET doc.risk_score = $u.score, doc.risk_tier = $u.tier, \
                 doc.risk_updated_at = $u.updated_at WHERE patient_id = $u.patient_id RETURN AFTER",
            )
            .bind(("u", param))
            .await?;

        let updated: Vec<PatientKeyedRow> = res.take(0)?;
        if updated.is_empty() {
            return Err(StorageError::PatientNotFound {
                patient_id: update.patient_id.clone(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, updates), fields(count = updates.len()))]
    async fn commit_risk_updates(&self, updates: &[RiskUpdate]) -> StorageResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let params: Vec<RiskUpdateParam> = updates.iter().map(RiskUpdateParam::from).collect();

        let sql = r#"
            BEGIN TRANSACTION;
            FOR $u IN $updates {
                IF array::len((SELECT VALUE patient_id FROM patients WHERE patient_id = $u.patient_id)) = 0 {
                    THROW "patient " + $u.patient_id + " no longer exists";
                };
                UPDATE patients SET
                    doc.risk_score = $u.score,
                    doc.risk_tier = $u.tier,
                    doc.risk_updated_at = $u.updated_at
                WHERE patient_id = $u.patient_id;
            };
            COMMIT TRANSACTION;
        "#;

        let res = self
            .db
            .query(sql)
            .bind(("updates", params))
            .await
            .map_err(|e| StorageError::TransactionAborted(e.to_string()))?;
        res.check()
            .map_err(|e| StorageError::TransactionAborted(e.to_string()))?;

        debug!("committed {} risk updates", updates.len());
        Ok(())
    }

    #[instrument(skip(self, assessment), fields(assessment_id = %assessment.assessment_id))]
    async fn save_assessment(&self, assessment: &CompositeAssessment) -> StorageResult<()> {
        let row = AssessmentRow {
            assessment_id: assessment.assessment_id.to_string(),
            patient_id: assessment.patient_id.clone(),
            doc: to_doc(assessment)?,
        };
        let _created: Option<AssessmentRow> =
            self.db.create(TABLE_ASSESSMENTS).content(row).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_assessment(&self, assessment_id: Uuid) -> StorageResult<CompositeAssessment> {
        let mut res = self
            .db
            .query("SELECT * FROM risk_assessments WHERE assessment_id = $aid")
            .bind(("aid", assessment_id.to_string()))
            .await?;
        let rows: Vec<AssessmentRow> = res.take(0)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::AssessmentNotFound {
                assessment_id: assessment_id.to_string(),
            })?;
        from_doc(row.doc)
    }

    async fn list_assessments(&self, patient_id: &str) -> StorageResult<Vec<CompositeAssessment>> {
        self.select_assessments(Some(patient_id)).await
    }

    async fn all_assessments(&self) -> StorageResult<Vec<CompositeAssessment>> {
        self.select_assessments(None).await
    }

    #[instrument(skip(self, patient), fields(patient_id = %patient.patient_id))]
    async fn put_patient(&self, patient: &PatientRecord) -> StorageResult<()> {
        let row = PatientKeyedRow {
            patient_id: patient.patient_id.clone(),
            doc: to_doc(patient)?,
        };
        let mut res = self
            .db
            .query("UPDATE patients SET doc = $row.doc WHERE patient_id = $row.patient_id RETURN AFTER")
            .bind(("row", row.clone()))
            .await?;
        let replaced: Vec<PatientKeyedRow> = res.take(0)?;
        if replaced.is_empty() {
            let _created: Option<PatientKeyedRow> =
                self.db.create(TABLE_PATIENTS).content(row).await?;
        }
        Ok(())
    }

    async fn put_medication(&self, medication: &MedicationRecord) -> StorageResult<()> {
        self.insert_patient_keyed(TABLE_MEDICATIONS, &medication.patient_id, medication)
            .await
    }

    async fn put_event(&self, event: &ClinicalEventRecord) -> StorageResult<()> {
        self.insert_patient_keyed(TABLE_EVENTS, &event.patient_id, event)
            .await
    }

    async fn put_measurement(&self, measurement: &MeasurementRecord) -> StorageResult<()> {
        self.insert_patient_keyed(TABLE_MEASUREMENTS, &measurement.patient_id, measurement)
            .await
    }
}

#[async_trait]
impl FeedbackLedger for SurrealClinicalStore {
    #[instrument(skip(self, entry), fields(assessment_id = %entry.assessment_id))]
    async fn record(&self, entry: &FeedbackRecord) -> StorageResult<()> {
        let row = FeedbackRow {
            feedback_id: entry.feedback_id.to_string(),
            assessment_id: entry.assessment_id.to_string(),
            doc: to_doc(entry)?,
        };
        let _created: Option<FeedbackRow> = self.db.create(TABLE_FEEDBACK).content(row).await?;
        Ok(())
    }

    async fn for_assessment(&self, assessment_id: Uuid) -> StorageResult<Vec<FeedbackRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM feedback WHERE assessment_id = $aid")
            .bind(("aid", assessment_id.to_string()))
            .await?;
        let rows: Vec<FeedbackRow> = res.take(0)?;
        let mut entries = rows
            .into_iter()
            .map(|r| from_doc(r.doc))
            .collect::<StorageResult<Vec<FeedbackRecord>>>()?;
        entries.sort_by_key(|e| e.recorded_at);
        Ok(entries)
    }

    async fn list(&self) -> StorageResult<Vec<FeedbackRecord>> {
        let mut res = self.db.query("SELECT * FROM feedback").await?;
        let rows: Vec<FeedbackRow> = res.take(0)?;
        let mut entries = rows
            .into_iter()
            .map(|r| from_doc(r.doc))
            .collect::<StorageResult<Vec<FeedbackRecord>>>()?;
        entries.sort_by_key(|e| e.recorded_at);
        Ok(entries)
    }
}
