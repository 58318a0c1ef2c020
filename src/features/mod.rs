//! Record normalization and feature engineering.
//!
//! Raw JSON records flow through [`aliases`] (key normalization),
//! [`medical_text`] (keyword flags) and [`table`] (fixed-column assembly)
//! before reaching the models.

pub mod aliases;
pub mod medical_text;
pub mod table;

pub use aliases::{ALIAS_TABLE, PatientRecord, canonical_key, normalize_record};
pub use medical_text::{Condition, MedicalFlags, infer_flags};
pub use table::{
    Cell, FeatureRow, FeatureTable, OUTPUT_COLUMNS, build_feature_table, input_records,
};

use serde_json::{Value, json};

/// Reference record used by the CLI `sample` and `preprocess` commands.
pub fn sample_record() -> Value {
    json!({
        "id": 1,
        "name": "Alice",
        "age": 28,
        "past_pregnancy_count": 1,
        "blood_group_mother": "A+",
        "blood_group_father": "O+",
        "medical_bg_mother": "diabetes, hypertension",
        "medical_bg_father": "thalassemia",
        "years_since_last_pregnancy": 2,
        "delivery_type": "Normal",
        "haemoglobin": 10.5,
        "external_id": "ext-123"
    })
}
