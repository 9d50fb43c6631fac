//! Bedside clinical calculators.
//!
//! - MDRD eGFR: `175 × Scr^-1.154 × age^-0.203 × 0.742 (female)`, staged
//!   by KDIGO G1-G5.
//! - CHA2DS2-VASc stroke risk from history notes, age and sex.

use clinirisk_state::{ClinicalEventRecord, PatientRecord};
use serde::{Deserialize, Serialize};

use crate::axes::pathology::fold;

/// KDIGO glomerular filtration stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CkdStage {
    G1,
    G2,
    G3,
    G4,
    G5,
}

impl CkdStage {
    pub fn from_gfr(gfr: f64) -> Self {
        if gfr < 15.0 {
            CkdStage::G5
        } else if gfr < 30.0 {
            CkdStage::G4
        } else if gfr < 60.0 {
            CkdStage::G3
        } else if gfr < 90.0 {
            CkdStage::G2
        } else {
            CkdStage::G1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EgfrResult {
    /// mL/min/1.73m², unrounded
    pub gfr: f64,
    pub stage: CkdStage,
}

/// Free-text gender → female flag ("F", "femenino", "female", "mujer").
pub fn is_female(gender: Option<&str>) -> bool {
    matches!(
        gender.map(|g| fold(g.trim())).as_deref(),
        Some("f" | "femenino" | "female" | "mujer" | "woman")
    )
}

/// MDRD estimate. `None` when creatinine or age is not positive.
pub fn mdrd_egfr(creatinine: f64, age: i32, female: bool) -> Option<EgfrResult> {
    if !(creatinine.is_finite() && creatinine > 0.0) || age <= 0 {
        return None;
    }
    let mut gfr = 175.0 * creatinine.powf(-1.154) * f64::from(age).powf(-0.203);
    if female {
        gfr *= 0.742;
    }
    Some(EgfrResult {
        gfr,
        stage: CkdStage::from_gfr(gfr),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrokeRisk {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cha2ds2Vasc {
    pub score: u8,
    pub risk: StrokeRisk,
}

fn notes_mention(notes: &[Vec<String>], folded: &[String], words: &[&str]) -> bool {
    // phrases with a space match by substring, single words by token
    words.iter().any(|w| {
        if w.contains(' ') {
            folded.iter().any(|n| n.contains(w))
        } else {
            notes.iter().any(|tokens| tokens.iter().any(|t| t == w))
        }
    })
}

/// CHA2DS2-VASc from event descriptions plus demographics.
pub fn cha2ds2_vasc(patient: &PatientRecord, history: &[ClinicalEventRecord]) -> Cha2ds2Vasc {
    let folded: Vec<String> = history
        .iter()
        .filter_map(|e| e.description.as_deref())
        .map(fold)
        .collect();
    let tokens: Vec<Vec<String>> = folded
        .iter()
        .map(|n| {
            n.split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .collect();
    let mentions = |words: &[&str]| notes_mention(&tokens, &folded, words);

    let mut score = 0u8;
    // C
    if mentions(&["insuficiencia cardiaca", "heart failure", "fallo cardiaco", "ic", "chf"]) {
        score += 1;
    }
    // H
    if mentions(&["hta", "hipertension", "hypertension", "htn"]) {
        score += 1;
    }
    // A2 / A
    match patient.age {
        Some(age) if age >= 75 => score += 2,
        Some(age) if age >= 65 => score += 1,
        _ => {}
    }
    // D
    if mentions(&["diabetes", "dbm", "dbt", "dm2"]) {
        score += 1;
    }
    // S2
    if mentions(&["acv", "stroke", "tia", "ait", "isquemia"]) {
        score += 2;
    }
    // V
    if mentions(&["infarto", "iam", "vasculopatia", "myocardial infarction", "pad"]) {
        score += 1;
    }
    // Sc
    let female = is_female(patient.gender.as_deref());
    if female {
        score += 1;
    }

    let risk = if score >= 2 {
        StrokeRisk::High
    } else if score == 1 && !female {
        StrokeRisk::Moderate
    } else {
        StrokeRisk::Low
    };
    Cha2ds2Vasc { score, risk }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clinirisk_state::EventKind;

    fn note(text: &str) -> ClinicalEventRecord {
        let mut e = ClinicalEventRecord::new("p1", EventKind::Consultation, Utc::now());
        e.description = Some(text.to_string());
        e
    }

    #[test]
    fn mdrd_reference_values() {
        let male = mdrd_egfr(1.0, 60, false).unwrap();
        assert!((male.gfr - 175.0 * 60f64.powf(-0.203)).abs() < 1e-9);
        assert_eq!(male.stage, CkdStage::G2);

        let female = mdrd_egfr(1.0, 60, true).unwrap();
        assert!((female.gfr - male.gfr * 0.742).abs() < 1e-9);
    }

    #[test]
    fn mdrd_stages_severe_renal_failure() {
        let r = mdrd_egfr(6.0, 80, true).unwrap();
        assert_eq!(r.stage, CkdStage::G5);
    }

    #[test]
    fn mdrd_rejects_missing_inputs() {
        assert!(mdrd_egfr(0.0, 60, false).is_none());
        assert!(mdrd_egfr(f64::NAN, 60, false).is_none());
        assert!(mdrd_egfr(1.2, 0, false).is_none());
    }

    #[test]
    fn female_spellings() {
        assert!(is_female(Some("F")));
        assert!(is_female(Some("Femenino")));
        assert!(!is_female(Some("M")));
        assert!(!is_female(None));
    }

    #[test]
    fn cha2ds2_vasc_full_history() {
        let patient = PatientRecord::new("p1").with_age(78).with_gender("femenino");
        let history = vec![
            note("Antecedente de HTA"),
            note("ACV isquémico 2019"),
            note("Diabetes tipo 2"),
        ];
        let result = cha2ds2_vasc(&patient, &history);
        // H1 + A2 + D1 + S2 + Sc1
        assert_eq!(result.score, 7);
        assert_eq!(result.risk, StrokeRisk::High);
    }

    #[test]
    fn cha2ds2_vasc_single_point_male_is_moderate() {
        let patient = PatientRecord::new("p2").with_age(67).with_gender("M");
        let result = cha2ds2_vasc(&patient, &[note("chronic cough")]);
        assert_eq!(result.score, 1);
        assert_eq!(result.risk, StrokeRisk::Moderate);
    }
}
