//! SurrealDB schema migrations and initialization
//!
//! Tables are schemaless: each row carries its lookup keys as top-level
//! string fields plus the full record under `doc`.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Clinirisk tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Clinirisk SurrealDB schema");

    init_patients_table(db).await?;
    init_dependent_tables(db).await?;
    init_assessments_table(db).await?;
    init_feedback_table(db).await?;

    info!("Clinirisk schema initialization complete");
    Ok(())
}

/// Initialize `patients` table
///
/// Schema:
/// ```text
/// TABLE patients {
///   patient_id:  STRING (unique)
///   doc:         OBJECT (PatientRecord)
/// }
/// ```
async fn init_patients_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing patients table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS patients SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_patient_id ON TABLE patients COLUMNS patient_id UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ patients table initialized");
    Ok(())
}

/// Initialize `medications`, `clinical_events` and `measurements`
///
/// Each row: `{ patient_id: STRING (indexed), doc: OBJECT }`. Rows are
/// append-only; bulk population reads scan the whole table once.
async fn init_dependent_tables(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing dependent record tables");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS medications SCHEMALESS
            PERMISSIONS FOR create FULL FOR select FULL FOR update NONE FOR delete FULL;
        DEFINE INDEX IF NOT EXISTS idx_medication_patient ON TABLE medications COLUMNS patient_id;

        DEFINE TABLE IF NOT EXISTS clinical_events SCHEMALESS
            PERMISSIONS FOR create FULL FOR select FULL FOR update NONE FOR delete FULL;
        DEFINE INDEX IF NOT EXISTS idx_event_patient ON TABLE clinical_events COLUMNS patient_id;

        DEFINE TABLE IF NOT EXISTS measurements SCHEMALESS
            PERMISSIONS FOR create FULL FOR select FULL FOR update NONE FOR delete FULL;
        DEFINE INDEX IF NOT EXISTS idx_measurement_patient ON TABLE measurements COLUMNS patient_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ medications, clinical_events, measurements tables initialized");
    Ok(())
}

/// Initialize `risk_assessments`
///
/// Schema:
/// ```text
/// TABLE risk_assessments {
///   assessment_id:  STRING (unique)
///   patient_id:     STRING (indexed)
///   doc:            OBJECT (CompositeAssessment)
/// }
/// ```
///
/// Assessments are immutable: no update permission.
async fn init_assessments_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing risk_assessments table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS risk_assessments SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_assessment_id ON TABLE risk_assessments COLUMNS assessment_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_assessment_patient ON TABLE risk_assessments COLUMNS patient_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ risk_assessments table initialized");
    Ok(())
}

/// Initialize `feedback`
///
/// Append-only; `assessment_id` is a weak reference (no foreign key).
async fn init_feedback_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing feedback table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS feedback SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_feedback_id ON TABLE feedback COLUMNS feedback_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_feedback_assessment ON TABLE feedback COLUMNS assessment_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ feedback table initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection;

    #[tokio::test]
    async fn schema_applies_and_reapplies_in_memory() {
        let db = connection::connect_url("mem://").await.unwrap();
        init_schema(&db).await.unwrap();
        init_schema(&db).await.unwrap();

        for table in [
            "patients",
            "medications",
            "clinical_events",
            "measurements",
            "risk_assessments",
            "feedback",
        ] {
            db.query(format!("SELECT * FROM {table}"))
                .await
                .unwrap()
                .check()
                .unwrap();
        }
    }
}
