//! Rule tables for the three risk axes.
//!
//! The clinical axis dispatches on [`Pathology`]; the pharmacological and
//! contextual axes are pathology-agnostic. Every axis is clamped to
//! [0,100]. Each rule that fires is reported so the aggregator can rank
//! drivers.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use clinirisk_state::{EventKind, MeasurementKind, Pathology};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::pathology::fold;
use crate::features::{PatientBundle, RECENT_CHANGE_WINDOW_DAYS};

pub const AXIS_MAX: u32 = 100;
pub const DEFAULT_CLINICAL_BASELINE: u32 = 20;
pub const PHARMACOLOGICAL_BASE: u32 = 10;
pub const CREATININE_LIMIT: f64 = 1.5;
pub const PRIOR_HOSPITALIZATION_CAP: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Clinical,
    Pharmacological,
    Contextual,
}

/// A rule that added points to an axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiredRule {
    pub axis: Axis,
    pub name: &'static str,
    pub points: u32,
}

/// Clamped axis value plus the rules behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisResult {
    pub score: u8,
    pub fired: Vec<FiredRule>,
}

/// Accumulates raw points for one axis.
struct Tally {
    axis: Axis,
    raw: u32,
    fired: Vec<FiredRule>,
}

impl Tally {
    fn new(axis: Axis, base: u32) -> Self {
        Self {
            axis,
            raw: base,
            fired: Vec::new(),
        }
    }

    fn add_if(&mut self, condition: bool, name: &'static str, points: u32) {
        if condition && points > 0 {
            self.raw = self.raw.saturating_add(points);
            self.fired.push(FiredRule {
                axis: self.axis,
                name,
                points,
            });
        }
    }

    fn finish(self) -> AxisResult {
        AxisResult {
            score: self.raw.min(AXIS_MAX) as u8,
            fired: self.fired,
        }
    }
}

// ---------------------------------------------------------------------------
// Drug classes
// ---------------------------------------------------------------------------

/// Guideline-indicated drug classes, matched on diacritic-free lowercase names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrugClass {
    Sglt2Inhibitor,
    InhaledCorticosteroid,
    Antidiabetic,
    Antihypertensive,
}

impl DrugClass {
    fn pattern(self) -> &'static str {
        match self {
            DrugClass::Sglt2Inhibitor => {
                r"gliflozin|sglt-?2|jardiance|forxiga|farxiga|invokana|steglatro"
            }
            DrugClass::InhaledCorticosteroid => {
                r"budesonid|fluticason|beclometason|mometason|ciclesonid|symbicort|seretide|advair|pulmicort|flixotide|inhaled corticosteroid|corticoide inhalado"
            }
            DrugClass::Antidiabetic => {
                r"metformin|insulin|gliclazid|glibenclamid|glimepirid|glipizid|gliptin|gliflozin|glutid|pioglitazon|acarbos"
            }
            DrugClass::Antihypertensive => {
                r"pril\b|sartan\b|olol\b|dipin|thiazid|tiazid|indapamid|chlorthalidon|clortalidon|furosemid|spironolacton|espironolacton|hydralazin|hidralazin|clonidin"
            }
        }
    }

    fn regex(self) -> Option<&'static Regex> {
        static SGLT2: OnceLock<Option<Regex>> = OnceLock::new();
        static ICS: OnceLock<Option<Regex>> = OnceLock::new();
        static ANTIDIABETIC: OnceLock<Option<Regex>> = OnceLock::new();
        static ANTIHYPERTENSIVE: OnceLock<Option<Regex>> = OnceLock::new();
        let cell = match self {
            DrugClass::Sglt2Inhibitor => &SGLT2,
            DrugClass::InhaledCorticosteroid => &ICS,
            DrugClass::Antidiabetic => &ANTIDIABETIC,
            DrugClass::Antihypertensive => &ANTIHYPERTENSIVE,
        };
        cell.get_or_init(|| Regex::new(self.pattern()).ok()).as_ref()
    }

    pub fn matches(self, medication_name: &str) -> bool {
        self.regex()
            .is_some_and(|re| re.is_match(&fold(medication_name)))
    }
}

fn has_active(bundle: &PatientBundle, class: DrugClass) -> bool {
    bundle.active_medications().any(|m| class.matches(&m.name))
}

// ---------------------------------------------------------------------------
// Clinical axis
// ---------------------------------------------------------------------------

fn creatinine_elevated(bundle: &PatientBundle) -> bool {
    bundle
        .latest(&MeasurementKind::Creatinine)
        .is_some_and(|v| v > CREATININE_LIMIT)
}

fn heart_failure(bundle: &PatientBundle, t: &mut Tally) {
    let weights = bundle.series(&MeasurementKind::Weight);
    let gained = weights.windows(2).any(|w| w[1] - w[0] > 2.0);
    t.add_if(gained, "weight_gain", 40);
    t.add_if(creatinine_elevated(bundle), "creatinine_elevated", 30);
    t.add_if(
        !has_active(bundle, DrugClass::Sglt2Inhibitor),
        "missing_sglt2_inhibitor",
        20,
    );
    t.add_if(bundle.count_events(EventKind::ErVisit) > 0, "er_visit", 15);
}

fn asthma(bundle: &PatientBundle, t: &mut Tally) {
    let episodes =
        bundle.count_events(EventKind::ErVisit) + bundle.count_events(EventKind::Hospitalization);
    t.add_if(episodes >= 1, "acute_episode", 35);
    t.add_if(episodes >= 3, "recurrent_episodes", 25);
    t.add_if(
        !has_active(bundle, DrugClass::InhaledCorticosteroid),
        "missing_inhaled_corticosteroid",
        25,
    );
}

fn diabetes(bundle: &PatientBundle, t: &mut Tally) {
    let hba1c = bundle.latest(&MeasurementKind::Hba1c);
    let very_high = hba1c.is_some_and(|v| v > 9.0);
    t.add_if(very_high, "hba1c_very_high", 40);
    t.add_if(!very_high && hba1c.is_some_and(|v| v > 7.0), "hba1c_high", 20);
    t.add_if(creatinine_elevated(bundle), "creatinine_elevated", 25);
    t.add_if(
        !has_active(bundle, DrugClass::Antidiabetic),
        "missing_antidiabetic",
        20,
    );
}

fn hypertension(bundle: &PatientBundle, t: &mut Tally) {
    let sbp = bundle.latest(&MeasurementKind::SystolicBp);
    let stage2 = sbp.is_some_and(|v| v >= 160.0);
    t.add_if(stage2, "systolic_bp_stage2", 40);
    t.add_if(!stage2 && sbp.is_some_and(|v| v >= 140.0), "systolic_bp_stage1", 20);
    t.add_if(creatinine_elevated(bundle), "creatinine_elevated", 20);
    t.add_if(
        !has_active(bundle, DrugClass::Antihypertensive),
        "missing_antihypertensive",
        20,
    );
}

/// Pathology-specific clinical/biological axis.
///
/// Unknown pathologies start from a flat baseline so an unrecognised
/// condition never scores as "no risk".
pub fn clinical_axis(bundle: &PatientBundle, pathology: Pathology) -> AxisResult {
    let base = match pathology {
        Pathology::Default => DEFAULT_CLINICAL_BASELINE,
        _ => 0,
    };
    let mut t = Tally::new(Axis::Clinical, base);
    match pathology {
        Pathology::HeartFailure => heart_failure(bundle, &mut t),
        Pathology::Asthma => asthma(bundle, &mut t),
        Pathology::Diabetes => diabetes(bundle, &mut t),
        Pathology::Hypertension => hypertension(bundle, &mut t),
        Pathology::Default => t.add_if(bundle.events.len() > 5, "frequent_events", 20),
    }
    t.finish()
}

// ---------------------------------------------------------------------------
// Pharmacological axis
// ---------------------------------------------------------------------------

pub fn pharmacological_axis(bundle: &PatientBundle, as_of: DateTime<Utc>) -> AxisResult {
    let active = bundle.active_medications().count();
    let changes = bundle.count_recent_events(
        EventKind::MedicationChange,
        as_of,
        RECENT_CHANGE_WINDOW_DAYS,
    ) as u32;

    let mut t = Tally::new(Axis::Pharmacological, PHARMACOLOGICAL_BASE);
    t.add_if(active > 5, "polypharmacy", 30);
    t.add_if(active > 8, "severe_polypharmacy", 30);
    t.add_if(
        changes > 0,
        "recent_medication_changes",
        changes.saturating_mul(10),
    );
    t.finish()
}

// ---------------------------------------------------------------------------
// Contextual axis
// ---------------------------------------------------------------------------

pub fn contextual_axis(bundle: &PatientBundle) -> AxisResult {
    let patient = &bundle.patient;
    let prior = bundle
        .prior_hospitalizations()
        .saturating_mul(10)
        .min(PRIOR_HOSPITALIZATION_CAP);

    let mut t = Tally::new(Axis::Contextual, 0);
    t.add_if(patient.age.is_some_and(|a| a > 75), "advanced_age", 30);
    t.add_if(
        patient.social_vulnerability.is_some_and(|s| s >= 4),
        "social_vulnerability",
        30,
    );
    t.add_if(prior > 0, "prior_hospitalizations", prior);
    t.finish()
}
