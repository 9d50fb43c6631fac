//! Free-text primary condition → [`Pathology`] normalization.
//!
//! Conditions arrive as clinician-entered text in English or Spanish
//! ("Insuficiencia Cardíaca", "HTA", "Type 2 diabetes"). Matching is done
//! on a lowercased, diacritic-free copy: multi-word phrases by substring,
//! acronyms by whole token.

use clinirisk_state::Pathology;

struct Branch {
    pathology: Pathology,
    phrases: &'static [&'static str],
    acronyms: &'static [&'static str],
}

/// Checked in order; the first branch that matches wins.
const BRANCHES: &[Branch] = &[
    Branch {
        pathology: Pathology::HeartFailure,
        phrases: &[
            "heart failure",
            "cardiac failure",
            "insuficiencia cardiaca",
            "fallo cardiaco",
            "falla cardiaca",
            "cardiomyopathy",
            "miocardiopatia",
        ],
        acronyms: &["ic", "icc", "chf", "hf", "hfref", "hfpef"],
    },
    Branch {
        pathology: Pathology::Asthma,
        phrases: &["asthma"],
        // "asma" is a token match so "plasma" stays out
        acronyms: &["asma", "asmatico", "asmatica"],
    },
    Branch {
        pathology: Pathology::Diabetes,
        phrases: &["diabetes", "diabetic", "diabetico"],
        acronyms: &["dm", "dm1", "dm2", "t2dm", "dbt", "dbm"],
    },
    Branch {
        pathology: Pathology::Hypertension,
        phrases: &["hypertension", "hipertension", "high blood pressure"],
        acronyms: &["hta", "htn"],
    },
];

/// Lowercase and fold Spanish diacritics (á→a, ñ→n, ü→u).
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Map a primary condition to its rule branch. Absent or unrecognised
/// text yields [`Pathology::Default`].
pub fn normalize(condition: Option<&str>) -> Pathology {
    let Some(raw) = condition else {
        return Pathology::Default;
    };
    let folded = fold(raw);
    let tokens: Vec<&str> = folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    BRANCHES
        .iter()
        .find(|branch| {
            branch.phrases.iter().any(|p| folded.contains(p))
                || branch.acronyms.iter().any(|a| tokens.contains(a))
        })
        .map(|branch| branch.pathology)
        .unwrap_or(Pathology::Default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_with_accents() {
        assert_eq!(
            normalize(Some("Insuficiencia Cardíaca")),
            Pathology::HeartFailure
        );
        assert_eq!(normalize(Some("Hipertensión arterial")), Pathology::Hypertension);
        assert_eq!(normalize(Some("ASMA bronquial")), Pathology::Asthma);
    }

    #[test]
    fn acronyms_match_whole_tokens_only() {
        assert_eq!(normalize(Some("HTA")), Pathology::Hypertension);
        assert_eq!(normalize(Some("DM2 insulinorequiriente")), Pathology::Diabetes);
        // "ic" inside a word must not trigger heart failure
        assert_eq!(normalize(Some("chronic pain")), Pathology::Default);
    }

    #[test]
    fn heart_failure_wins_over_later_branches() {
        assert_eq!(
            normalize(Some("Heart failure with diabetes")),
            Pathology::HeartFailure
        );
    }

    #[test]
    fn unknown_or_absent_is_default() {
        assert_eq!(normalize(Some("Fractura de cadera")), Pathology::Default);
        assert_eq!(normalize(Some("")), Pathology::Default);
        assert_eq!(normalize(None), Pathology::Default);
    }

    #[test]
    fn fold_strips_diacritics() {
        assert_eq!(fold("Cardíaca Niño Pingüino"), "cardiaca nino pinguino");
    }
}
