//! Key normalization for incoming records.
//!
//! Clients send the same logical field either in snake_case (database column
//! names) or camelCase (front-end form names). [`normalize_record`] copies each
//! recognized alias onto its canonical key, and [`PatientRecord`] resolves the
//! result into explicit optional fields once, at the boundary.

use serde_json::{Map, Value};

/// Canonical snake_case field -> accepted aliases.
///
/// `id`, `name`, `age` and `haemoglobin` are identical in both conventions.
pub const ALIAS_TABLE: &[(&str, &[&str])] = &[
    ("past_pregnancy_count", &["pastPregnancyCount"]),
    ("blood_group_mother", &["bloodGroupMother"]),
    ("blood_group_father", &["bloodGroupFather"]),
    ("medical_bg_mother", &["medicalBgMother"]),
    ("medical_bg_father", &["medicalBgFather"]),
    ("years_since_last_pregnancy", &["yearsSinceLastPregnancy"]),
    ("delivery_type", &["deliveryType"]),
    ("external_id", &["externalId"]),
];

/// Look up the canonical name for an alias key.
pub fn canonical_key(key: &str) -> Option<&'static str> {
    ALIAS_TABLE
        .iter()
        .find(|(_, aliases)| aliases.contains(&key))
        .map(|(canonical, _)| *canonical)
}

/// Return a copy of `record` where every known alias is also present under
/// its canonical key. Original keys are kept; non-object values pass through.
pub fn normalize_record(record: Value) -> Value {
    match record {
        Value::Object(map) => Value::Object(normalize_map(&map)),
        other => other,
    }
}

/// Object form of [`normalize_record`].
///
/// When both spellings are present the alias value is written over the
/// canonical one.
pub fn normalize_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = map.clone();
    for (key, value) in map {
        if let Some(canonical) = canonical_key(key) {
            out.insert(canonical.to_string(), value.clone());
        }
    }
    out
}

/// One subject's record with every recognized field resolved.
///
/// Values are kept as raw JSON; type coercion happens in the feature table
/// builder so that a bad value falls back to its default instead of failing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientRecord {
    pub age: Option<Value>,
    pub past_pregnancy_count: Option<Value>,
    pub blood_group_mother: Option<Value>,
    pub blood_group_father: Option<Value>,
    pub medical_bg_mother: Option<Value>,
    pub medical_bg_father: Option<Value>,
    pub years_since_last_pregnancy: Option<Value>,
    pub delivery_type: Option<Value>,
    pub haemoglobin: Option<Value>,
}

impl PatientRecord {
    /// Build from a map that already went through [`normalize_map`].
    pub fn from_normalized(map: &Map<String, Value>) -> Self {
        let field = |key: &str| map.get(key).cloned();
        Self {
            age: field("age"),
            past_pregnancy_count: field("past_pregnancy_count"),
            blood_group_mother: field("blood_group_mother"),
            blood_group_father: field("blood_group_father"),
            medical_bg_mother: field("medical_bg_mother"),
            medical_bg_father: field("medical_bg_father"),
            years_since_last_pregnancy: field("years_since_last_pregnancy"),
            delivery_type: field("delivery_type"),
            haemoglobin: field("haemoglobin"),
        }
    }

    /// Normalize and resolve a raw record in one step.
    pub fn from_raw(map: &Map<String, Value>) -> Self {
        Self::from_normalized(&normalize_map(map))
    }
}
