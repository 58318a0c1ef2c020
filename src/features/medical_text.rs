//! Keyword-based diagnostic flags from free-text medical background notes.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Condition categories recognized in medical background text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Diabetes,
    Hypertension,
    Anaemia,
    Thyroid,
    Heart,
    Thalassemia,
    Csection,
}

impl Condition {
    pub const ALL: [Condition; 7] = [
        Condition::Diabetes,
        Condition::Hypertension,
        Condition::Anaemia,
        Condition::Thyroid,
        Condition::Heart,
        Condition::Thalassemia,
        Condition::Csection,
    ];

    /// Keyword variants. Entries starting with `\b` are raw word-boundary
    /// patterns; everything else is matched as a literal substring.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Condition::Diabetes => &["diabetes", r"\bdm\b"],
            Condition::Hypertension => &["hypertension", r"\bhtn\b", "high blood pressure"],
            Condition::Anaemia => &["anaemia", "anemia"],
            Condition::Thyroid => &["thyroid"],
            Condition::Heart => &["heart", "cardiac", "cardiomyopathy", "ischemia", "ihd"],
            Condition::Thalassemia => &["thalassemia", "thalassaemia"],
            Condition::Csection => &["c-section", "c section", "csection", "cesarean", "caesarean"],
        }
    }
}

fn compile_keywords(keywords: &[&str]) -> Regex {
    let alternation = keywords
        .iter()
        .map(|k| {
            if k.starts_with(r"\b") {
                (*k).to_string()
            } else {
                regex::escape(k)
            }
        })
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
        .unwrap()
}

static CONDITION_PATTERNS: Lazy<Vec<(Condition, Regex)>> = Lazy::new(|| {
    Condition::ALL
        .iter()
        .map(|&c| (c, compile_keywords(c.keywords())))
        .collect()
});

/// One flag per [`Condition`]; `true` when any keyword matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MedicalFlags {
    pub diabetes: bool,
    pub hypertension: bool,
    pub anaemia: bool,
    pub thyroid: bool,
    pub heart: bool,
    pub thalassemia: bool,
    pub csection: bool,
}

impl MedicalFlags {
    pub fn get(&self, condition: Condition) -> bool {
        match condition {
            Condition::Diabetes => self.diabetes,
            Condition::Hypertension => self.hypertension,
            Condition::Anaemia => self.anaemia,
            Condition::Thyroid => self.thyroid,
            Condition::Heart => self.heart,
            Condition::Thalassemia => self.thalassemia,
            Condition::Csection => self.csection,
        }
    }

    fn set(&mut self, condition: Condition) {
        match condition {
            Condition::Diabetes => self.diabetes = true,
            Condition::Hypertension => self.hypertension = true,
            Condition::Anaemia => self.anaemia = true,
            Condition::Thyroid => self.thyroid = true,
            Condition::Heart => self.heart = true,
            Condition::Thalassemia => self.thalassemia = true,
            Condition::Csection => self.csection = true,
        }
    }

    pub fn any(&self) -> bool {
        Condition::ALL.iter().any(|&c| self.get(c))
    }

    /// Flag value as the 0/1 integer the models were trained on.
    pub fn bit(&self, condition: Condition) -> u8 {
        u8::from(self.get(condition))
    }
}

/// Scan `text` for every condition category. Categories match independently.
pub fn infer_flags(text: &str) -> MedicalFlags {
    let mut flags = MedicalFlags::default();
    let text = text.trim();
    if text.is_empty() {
        return flags;
    }
    for (condition, pattern) in CONDITION_PATTERNS.iter() {
        if pattern.is_match(text) {
            flags.set(*condition);
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_blood_pressure_sets_hypertension_in_any_case() {
        for text in [
            "high blood pressure",
            "History of HIGH BLOOD PRESSURE since 2019",
            "High Blood Pressure, asthma",
        ] {
            assert!(infer_flags(text).hypertension, "missed: {text}");
        }
    }

    #[test]
    fn text_without_keywords_yields_no_flags() {
        assert_eq!(infer_flags("seasonal allergies, asthma"), MedicalFlags::default());
        assert_eq!(infer_flags(""), MedicalFlags::default());
        assert_eq!(infer_flags("   "), MedicalFlags::default());
        assert!(!infer_flags("none reported").any());
    }

    #[test]
    fn abbreviations_require_word_boundaries() {
        assert!(infer_flags("HTN").hypertension);
        assert!(infer_flags("known dm type 2").diabetes);
        assert!(!infer_flags("admitted").diabetes);
        assert!(!infer_flags("bhtnx").hypertension);
    }

    #[test]
    fn categories_match_independently() {
        let flags = infer_flags("Diabetes, anemia, prior caesarean, thyroid nodules");
        assert!(flags.diabetes);
        assert!(flags.anaemia);
        assert!(flags.csection);
        assert!(flags.thyroid);
        assert!(!flags.hypertension);
        assert!(!flags.heart);
        assert!(!flags.thalassemia);
    }

    #[test]
    fn heart_variants_are_substring_matches() {
        assert!(infer_flags("cardiomyopathy").heart);
        assert!(infer_flags("IHD").heart);
        assert!(infer_flags("congenital heart defect").heart);
        assert_eq!(infer_flags("thalassaemia minor").bit(Condition::Thalassemia), 1);
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "c-section x2, hypertension";
        assert_eq!(infer_flags(text), infer_flags(text));
    }
}
