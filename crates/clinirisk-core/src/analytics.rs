//! Population-level summaries for dashboards and the `stats` command.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use clinirisk_state::{CompositeAssessment, FeedbackRecord, Outcome, PatientRecord, RiskTier};
use serde::Serialize;

pub const STATS_WINDOW_DAYS: i64 = 30;
pub const TOP_CONDITIONS: usize = 5;

const UNSPECIFIED: &str = "unspecified";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionCount {
    pub condition: String,
    pub patients: usize,
}

/// Mean axis scores over rule-based assessments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanAxes {
    pub clinical: f64,
    pub pharmacological: f64,
    pub contextual: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationStats {
    pub generated_at: DateTime<Utc>,
    pub window_days: i64,
    pub patients: usize,
    pub assessments_in_window: usize,
    pub tier_distribution: BTreeMap<RiskTier, usize>,
    pub feedback_outcomes: BTreeMap<String, usize>,
    pub top_conditions: Vec<ConditionCount>,
    pub mean_axes: Option<MeanAxes>,
}

fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Hospitalized => "hospitalized".to_string(),
        Outcome::Readmitted => "readmitted".to_string(),
        Outcome::Deceased => "deceased".to_string(),
        Outcome::NoEvent => "no_event".to_string(),
        Outcome::Other(label) => label.to_lowercase(),
    }
}

/// Summarize a population as of `as_of`.
///
/// Tier counts and axis means only look at assessments inside the
/// trailing window. Every tier appears in the distribution, zero or not.
pub fn summarize(
    patients: &[PatientRecord],
    assessments: &[CompositeAssessment],
    feedback: &[FeedbackRecord],
    as_of: DateTime<Utc>,
) -> PopulationStats {
    let since = as_of - Duration::days(STATS_WINDOW_DAYS);
    let recent: Vec<&CompositeAssessment> = assessments
        .iter()
        .filter(|a| a.timestamp > since && a.timestamp <= as_of)
        .collect();

    let mut tier_distribution: BTreeMap<RiskTier, usize> = [
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Critical,
    ]
    .into_iter()
    .map(|t| (t, 0))
    .collect();
    for a in &recent {
        *tier_distribution.entry(a.risk_tier).or_insert(0) += 1;
    }

    let mut feedback_outcomes: BTreeMap<String, usize> = BTreeMap::new();
    for entry in feedback {
        *feedback_outcomes
            .entry(outcome_label(&entry.actual_outcome))
            .or_insert(0) += 1;
    }

    let mut conditions: HashMap<&str, usize> = HashMap::new();
    for p in patients {
        let condition = p
            .primary_condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNSPECIFIED);
        *conditions.entry(condition).or_insert(0) += 1;
    }
    let mut top_conditions: Vec<ConditionCount> = conditions
        .into_iter()
        .map(|(condition, patients)| ConditionCount {
            condition: condition.to_string(),
            patients,
        })
        .collect();
    top_conditions.sort_by(|a, b| {
        b.patients
            .cmp(&a.patients)
            .then_with(|| a.condition.cmp(&b.condition))
    });
    top_conditions.truncate(TOP_CONDITIONS);

    let axes: Vec<_> = recent.iter().filter_map(|a| a.axes).collect();
    let mean_axes = (!axes.is_empty()).then(|| {
        let n = axes.len() as f64;
        let mean = |f: fn(&clinirisk_state::AxisScores) -> u8| {
            axes.iter().map(|s| f64::from(f(s))).sum::<f64>() / n
        };
        MeanAxes {
            clinical: mean(|s| s.clinical),
            pharmacological: mean(|s| s.pharmacological),
            contextual: mean(|s| s.contextual),
            samples: axes.len(),
        }
    });

    PopulationStats {
        generated_at: as_of,
        window_days: STATS_WINDOW_DAYS,
        patients: patients.len(),
        assessments_in_window: recent.len(),
        tier_distribution,
        feedback_outcomes,
        top_conditions,
        mean_axes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clinirisk_state::{AssessmentSource, AxisScores};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap()
    }

    fn assessment(days_ago: i64, score: u8, axes: Option<AxisScores>) -> CompositeAssessment {
        CompositeAssessment {
            assessment_id: Uuid::new_v4(),
            patient_id: "p1".to_string(),
            timestamp: now() - Duration::days(days_ago),
            total_score: score,
            risk_tier: RiskTier::from_score(score),
            drivers: Vec::new(),
            source: AssessmentSource::AxisRules,
            axes,
            pathology: None,
        }
    }

    #[test]
    fn window_excludes_old_assessments() {
        let axes = AxisScores {
            clinical: 60,
            pharmacological: 20,
            contextual: 10,
        };
        let assessments = vec![
            assessment(1, 80, Some(axes)),
            assessment(10, 30, None),
            assessment(45, 90, Some(axes)),
        ];
        let stats = summarize(&[], &assessments, &[], now());
        assert_eq!(stats.assessments_in_window, 2);
        assert_eq!(stats.tier_distribution[&RiskTier::Critical], 1);
        assert_eq!(stats.tier_distribution[&RiskTier::Medium], 1);
        assert_eq!(stats.tier_distribution[&RiskTier::Low], 0);

        let mean = stats.mean_axes.unwrap();
        assert_eq!(mean.samples, 1);
        assert_eq!(mean.clinical, 60.0);
    }

    #[test]
    fn top_conditions_rank_and_truncate() {
        let mut patients = Vec::new();
        for (i, cond) in ["EPOC", "EPOC", "Diabetes", "Asma", "HTA", "Gota", "Lupus", " "]
            .iter()
            .enumerate()
        {
            patients.push(PatientRecord::new(format!("p{i}")).with_condition(*cond));
        }
        let stats = summarize(&patients, &[], &[], now());
        assert_eq!(stats.top_conditions.len(), TOP_CONDITIONS);
        assert_eq!(stats.top_conditions[0].condition, "EPOC");
        assert_eq!(stats.top_conditions[0].patients, 2);
        // ties sort by name
        assert_eq!(stats.top_conditions[1].condition, "Asma");
        assert!(stats.mean_axes.is_none());
    }

    #[test]
    fn feedback_outcomes_are_counted() {
        let id = Uuid::new_v4();
        let feedback = vec![
            FeedbackRecord::new(id, Outcome::Hospitalized, None),
            FeedbackRecord::new(id, Outcome::Hospitalized, None),
            FeedbackRecord::new(id, Outcome::Other("Transferred".to_string()), None),
        ];
        let stats = summarize(&[], &[], &feedback, now());
        assert_eq!(stats.feedback_outcomes["hospitalized"], 2);
        assert_eq!(stats.feedback_outcomes["transferred"], 1);
    }
}
