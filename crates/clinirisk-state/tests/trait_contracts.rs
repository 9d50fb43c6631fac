//! Trait contract tests for ClinicalStore and FeedbackLedger.
//!
//! These tests verify the behavioral contracts of the storage traits
//! using in-memory fakes. Any conforming implementation must pass these.

use chrono::{Duration, TimeZone, Utc};
use clinirisk_state::fakes::{MemoryClinicalStore, MemoryFeedbackLedger};
use clinirisk_state::storage_traits::*;
use clinirisk_state::*;
use uuid::Uuid;

fn risk_update(patient_id: &str, score: u8) -> RiskUpdate {
    RiskUpdate {
        patient_id: patient_id.to_string(),
        score,
        tier: RiskTier::from_score(score),
        updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
    }
}

fn assessment(patient_id: &str, minutes: i64, score: u8) -> CompositeAssessment {
    CompositeAssessment {
        assessment_id: Uuid::new_v4(),
        patient_id: patient_id.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes),
        total_score: score,
        risk_tier: RiskTier::from_score(score),
        drivers: vec![Driver {
            feature: "age".to_string(),
            magnitude: 0.3,
            direction: DriverDirection::IncreasesRisk,
            impact: Some(DriverImpact::High),
        }],
        source: AssessmentSource::AxisRules,
        axes: Some(AxisScores {
            clinical: 90,
            pharmacological: 10,
            contextual: 30,
        }),
        pathology: Some(Pathology::HeartFailure),
    }
}

async fn seed(store: &dyn ClinicalStore) {
    for id in ["p2", "p1", "p3"] {
        store
            .put_patient(&PatientRecord::new(id).with_age(70))
            .await
            .unwrap();
    }
    store
        .put_medication(&MedicationRecord::active("p1", "furosemide"))
        .await
        .unwrap();
    store
        .put_medication(&MedicationRecord::active("p2", "metformin"))
        .await
        .unwrap();
    store
        .put_event(&ClinicalEventRecord::new(
            "p1",
            EventKind::ErVisit,
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        ))
        .await
        .unwrap();
    store
        .put_measurement(&MeasurementRecord::new(
            "p1",
            MeasurementKind::Weight,
            80.5,
            Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap(),
        ))
        .await
        .unwrap();
}

// ===========================================================================
// ClinicalStore contract tests
// ===========================================================================

#[tokio::test]
async fn list_patients_ordered_by_id() {
    let store = MemoryClinicalStore::new();
    seed(&store).await;

    let ids: Vec<String> = store
        .list_patients()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.patient_id)
        .collect();
    assert_eq!(ids, vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn per_patient_reads_are_scoped() {
    let store = MemoryClinicalStore::new();
    seed(&store).await;

    let meds = store.medications_for("p1").await.unwrap();
    assert_eq!(meds.len(), 1);
    assert_eq!(meds[0].name, "furosemide");
    assert_eq!(store.events_for("p2").await.unwrap().len(), 0);
    assert_eq!(store.measurements_for("p1").await.unwrap()[0].value, 80.5);
    assert_eq!(store.all_medications().await.unwrap().len(), 2);
}

#[tokio::test]
async fn get_patient_not_found() {
    let store = MemoryClinicalStore::new();
    let err = store.get_patient("ghost").await.unwrap_err();

    assert!(matches!(err, StorageError::PatientNotFound { .. }));
}

#[tokio::test]
async fn update_patient_risk_publishes_score_and_tier() {
    let store = MemoryClinicalStore::new();
    seed(&store).await;

    store.update_patient_risk(&risk_update("p1", 88)).await.unwrap();
    let p = store.get_patient("p1").await.unwrap();
    assert_eq!(p.risk_score, Some(88));
    assert_eq!(p.risk_tier, Some(RiskTier::Critical));
    assert!(p.risk_updated_at.is_some());
}

#[tokio::test]
async fn update_patient_risk_missing_patient() {
    let store = MemoryClinicalStore::new();
    let err = store
        .update_patient_risk(&risk_update("ghost", 10))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::PatientNotFound { .. }));
}

#[tokio::test]
async fn commit_risk_updates_all_or_nothing() {
    let store = MemoryClinicalStore::new();
    seed(&store).await;

    let err = store
        .commit_risk_updates(&[risk_update("p1", 60), risk_update("ghost", 70)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::TransactionAborted(_)));
    assert_eq!(store.get_patient("p1").await.unwrap().risk_score, None);

    store
        .commit_risk_updates(&[risk_update("p1", 60), risk_update("p2", 20)])
        .await
        .unwrap();
    assert_eq!(store.get_patient("p1").await.unwrap().risk_score, Some(60));
    assert_eq!(
        store.get_patient("p2").await.unwrap().risk_tier,
        Some(RiskTier::Low)
    );
}

#[tokio::test]
async fn assessments_listed_oldest_first() {
    let store = MemoryClinicalStore::new();
    let late = assessment("p1", 30, 50);
    let early = assessment("p1", 0, 40);
    store.save_assessment(&late).await.unwrap();
    store.save_assessment(&early).await.unwrap();
    store.save_assessment(&assessment("p2", 10, 5)).await.unwrap();

    let history = store.list_assessments("p1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].assessment_id, early.assessment_id);
    assert_eq!(history[1].assessment_id, late.assessment_id);
    assert_eq!(store.all_assessments().await.unwrap().len(), 3);
}

#[tokio::test]
async fn get_assessment_not_found() {
    let store = MemoryClinicalStore::new();
    let err = store.get_assessment(Uuid::new_v4()).await.unwrap_err();

    assert!(matches!(err, StorageError::AssessmentNotFound { .. }));
}

#[tokio::test]
async fn unavailable_store_fails_every_call() {
    let store = MemoryClinicalStore::new();
    seed(&store).await;
    store.set_unavailable(true);

    assert!(matches!(
        store.list_patients().await,
        Err(StorageError::Unavailable(_))
    ));
    assert!(matches!(
        store.update_patient_risk(&risk_update("p1", 1)).await,
        Err(StorageError::Unavailable(_))
    ));

    store.set_unavailable(false);
    assert!(store.list_patients().await.is_ok());
}

// ===========================================================================
// FeedbackLedger contract tests
// ===========================================================================

#[tokio::test]
async fn feedback_kept_per_assessment_in_order() {
    let ledger = MemoryFeedbackLedger::new();
    let target = Uuid::new_v4();

    let first = FeedbackRecord::new(target, Outcome::Hospitalized, None);
    let second = FeedbackRecord::new(target, Outcome::Readmitted, Some("30d".to_string()));
    ledger.record(&first).await.unwrap();
    ledger
        .record(&FeedbackRecord::new(Uuid::new_v4(), Outcome::NoEvent, None))
        .await
        .unwrap();
    ledger.record(&second).await.unwrap();

    let entries = ledger.for_assessment(target).await.unwrap();
    assert_eq!(entries, vec![first, second]);
    assert_eq!(ledger.list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn feedback_ledger_unavailable() {
    let ledger = MemoryFeedbackLedger::new();
    ledger.set_unavailable(true);
    let err = ledger
        .record(&FeedbackRecord::new(Uuid::new_v4(), Outcome::Deceased, None))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Unavailable(_)));
}

// ===========================================================================
// SurrealClinicalStore contract tests (mirrors the fake tests above)
// ===========================================================================

mod surreal_store_tests {
    use super::*;

    async fn store() -> SurrealClinicalStore {
        SurrealClinicalStore::in_memory()
            .await
            .expect("in_memory() failed")
    }

    #[tokio::test]
    async fn list_patients_ordered_by_id() {
        let store = store().await;
        seed(&store).await;

        let ids: Vec<String> = store
            .list_patients()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.patient_id)
            .collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn put_patient_replaces_existing_row() {
        let store = store().await;
        store
            .put_patient(&PatientRecord::new("p1").with_age(50))
            .await
            .unwrap();
        store
            .put_patient(&PatientRecord::new("p1").with_age(51))
            .await
            .unwrap();

        let patients = store.list_patients().await.unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].age, Some(51));
    }

    #[tokio::test]
    async fn dependent_records_round_trip() {
        let store = store().await;
        seed(&store).await;

        let meds = store.medications_for("p1").await.unwrap();
        assert_eq!(meds, vec![MedicationRecord::active("p1", "furosemide")]);
        let events = store.events_for("p1").await.unwrap();
        assert_eq!(events[0].kind, EventKind::ErVisit);
        assert_eq!(store.all_measurements().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_patient_not_found() {
        let store = store().await;
        let err = store.get_patient("ghost").await.unwrap_err();

        assert!(matches!(err, StorageError::PatientNotFound { .. }));
    }

    #[tokio::test]
    async fn update_patient_risk_publishes_score_and_tier() {
        let store = store().await;
        seed(&store).await;

        store.update_patient_risk(&risk_update("p3", 55)).await.unwrap();
        let p = store.get_patient("p3").await.unwrap();
        assert_eq!(p.risk_score, Some(55));
        assert_eq!(p.risk_tier, Some(RiskTier::High));

        let err = store
            .update_patient_risk(&risk_update("ghost", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PatientNotFound { .. }));
    }

    #[tokio::test]
    async fn commit_risk_updates_all_or_nothing() {
        let store = store().await;
        seed(&store).await;

        let err = store
            .commit_risk_updates(&[risk_update("p1", 60), risk_update("ghost", 70)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TransactionAborted(_)));
        assert_eq!(store.get_patient("p1").await.unwrap().risk_score, None);

        store
            .commit_risk_updates(&[risk_update("p1", 60), risk_update("p2", 20)])
            .await
            .unwrap();
        assert_eq!(store.get_patient("p1").await.unwrap().risk_score, Some(60));
    }

    #[tokio::test]
    async fn assessments_round_trip_oldest_first() {
        let store = store().await;
        let late = assessment("p1", 30, 50);
        let early = assessment("p1", 0, 40);
        store.save_assessment(&late).await.unwrap();
        store.save_assessment(&early).await.unwrap();

        let history = store.list_assessments("p1").await.unwrap();
        assert_eq!(history, vec![early.clone(), late]);
        assert_eq!(store.get_assessment(early.assessment_id).await.unwrap(), early);
    }

    #[tokio::test]
    async fn feedback_round_trip() {
        let store = store().await;
        let target = Uuid::new_v4();
        let entry = FeedbackRecord::new(target, Outcome::Other("transferred".into()), None);
        store.record(&entry).await.unwrap();

        assert_eq!(store.for_assessment(target).await.unwrap(), vec![entry]);
        assert!(store.for_assessment(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
