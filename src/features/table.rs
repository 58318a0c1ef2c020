//! Fixed-schema feature table consumed by the models.

use ndarray::Array2;
use serde::Serialize;
use serde_json::{Map, Value};

use super::aliases::{PatientRecord, normalize_record};
use super::medical_text::{Condition, infer_flags};
use crate::error::{Result, RiskError};

/// Model input columns, in the order the models were trained on.
pub const OUTPUT_COLUMNS: [&str; 17] = [
    "age",
    "past_pregnancy_count",
    "blood_group_mother",
    "blood_group_father",
    "time_since_last_pregnancy_years",
    "delivery_type",
    "haemoglobin",
    "mother_diabetes",
    "mother_hypertension",
    "mother_anaemia_dx",
    "mother_thyroid",
    "mother_heart_disease",
    "mother_prev_csection",
    "father_diabetes",
    "father_hypertension",
    "father_heart_disease",
    "father_thalassemia_trait",
];

/// A single table value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    /// Absent or uncoercible numeric value.
    Missing,
}

impl Cell {
    /// Numeric view; text and missing values read as NaN.
    pub fn as_f64(&self) -> f64 {
        match self {
            Cell::Int(v) => *v as f64,
            Cell::Float(v) => *v,
            Cell::Text(_) | Cell::Missing => f64::NAN,
        }
    }

    /// Categorical view used by one-hot encoders.
    pub fn as_category(&self) -> Option<String> {
        match self {
            Cell::Int(v) => Some(v.to_string()),
            Cell::Float(v) => Some(v.to_string()),
            Cell::Text(s) => Some(s.clone()),
            Cell::Missing => None,
        }
    }
}

fn coerce_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn coerce_float(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|f| !f.is_nan())
}

/// Category text as the models were trained on it: booleans are spelled
/// `True` / `False`.
fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        Some(other) => other.to_string(),
    }
}

/// One canonical row: 7 demographic/clinical fields, 6 mother flags and
/// 4 father flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub age: Option<i64>,
    pub past_pregnancy_count: i64,
    pub blood_group_mother: String,
    pub blood_group_father: String,
    pub time_since_last_pregnancy_years: Option<f64>,
    pub delivery_type: String,
    pub haemoglobin: Option<f64>,
    pub mother_diabetes: u8,
    pub mother_hypertension: u8,
    pub mother_anaemia_dx: u8,
    pub mother_thyroid: u8,
    pub mother_heart_disease: u8,
    pub mother_prev_csection: u8,
    pub father_diabetes: u8,
    pub father_hypertension: u8,
    pub father_heart_disease: u8,
    pub father_thalassemia_trait: u8,
}

impl FeatureRow {
    pub fn from_record(record: &PatientRecord) -> Self {
        let mother = infer_flags(&coerce_text(record.medical_bg_mother.as_ref()));
        // Anaemia, thyroid and c-section are extracted for the father too but the
        // models have no columns for them.
        let father = infer_flags(&coerce_text(record.medical_bg_father.as_ref()));

        Self {
            age: coerce_int(record.age.as_ref()),
            past_pregnancy_count: coerce_int(record.past_pregnancy_count.as_ref()).unwrap_or(0),
            blood_group_mother: coerce_text(record.blood_group_mother.as_ref()),
            blood_group_father: coerce_text(record.blood_group_father.as_ref()),
            time_since_last_pregnancy_years: coerce_float(
                record.years_since_last_pregnancy.as_ref(),
            ),
            delivery_type: coerce_text(record.delivery_type.as_ref()),
            haemoglobin: coerce_float(record.haemoglobin.as_ref()),
            mother_diabetes: mother.bit(Condition::Diabetes),
            mother_hypertension: mother.bit(Condition::Hypertension),
            mother_anaemia_dx: mother.bit(Condition::Anaemia),
            mother_thyroid: mother.bit(Condition::Thyroid),
            mother_heart_disease: mother.bit(Condition::Heart),
            mother_prev_csection: mother.bit(Condition::Csection),
            father_diabetes: father.bit(Condition::Diabetes),
            father_hypertension: father.bit(Condition::Hypertension),
            father_heart_disease: father.bit(Condition::Heart),
            father_thalassemia_trait: father.bit(Condition::Thalassemia),
        }
    }

    /// Named cells in emission order.
    pub fn cells(&self) -> Vec<(&'static str, Cell)> {
        let opt_int = |v: Option<i64>| v.map(Cell::Int).unwrap_or(Cell::Missing);
        let opt_float = |v: Option<f64>| v.map(Cell::Float).unwrap_or(Cell::Missing);
        let flag = |v: u8| Cell::Int(i64::from(v));
        vec![
            ("age", opt_int(self.age)),
            ("past_pregnancy_count", Cell::Int(self.past_pregnancy_count)),
            ("blood_group_mother", Cell::Text(self.blood_group_mother.clone())),
            ("blood_group_father", Cell::Text(self.blood_group_father.clone())),
            (
                "time_since_last_pregnancy_years",
                opt_float(self.time_since_last_pregnancy_years),
            ),
            ("delivery_type", Cell::Text(self.delivery_type.clone())),
            ("haemoglobin", opt_float(self.haemoglobin)),
            ("mother_diabetes", flag(self.mother_diabetes)),
            ("mother_hypertension", flag(self.mother_hypertension)),
            ("mother_anaemia_dx", flag(self.mother_anaemia_dx)),
            ("mother_thyroid", flag(self.mother_thyroid)),
            ("mother_heart_disease", flag(self.mother_heart_disease)),
            ("mother_prev_csection", flag(self.mother_prev_csection)),
            ("father_diabetes", flag(self.father_diabetes)),
            ("father_hypertension", flag(self.father_hypertension)),
            ("father_heart_disease", flag(self.father_heart_disease)),
            ("father_thalassemia_trait", flag(self.father_thalassemia_trait)),
        ]
    }
}

/// Column-named table of cells, one row per input record.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl FeatureTable {
    /// Assemble a table and check it against [`OUTPUT_COLUMNS`].
    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        let missing: Vec<&str> = OUTPUT_COLUMNS
            .iter()
            .copied()
            .filter(|c| !columns.iter().any(|have| have == c))
            .collect();
        if !missing.is_empty() {
            return Err(RiskError::Structural {
                message: format!("missing columns: {:?}", missing),
            });
        }
        if columns.len() != OUTPUT_COLUMNS.len()
            || columns.iter().zip(OUTPUT_COLUMNS.iter()).any(|(a, b)| a != b)
        {
            return Err(RiskError::Structural {
                message: format!("columns out of canonical order: {:?}", columns),
            });
        }
        if let Some(i) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(RiskError::Structural {
                message: format!(
                    "row {} has {} cells, expected {}",
                    i,
                    rows[i].len(),
                    columns.len()
                ),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn from_feature_rows(feature_rows: &[FeatureRow]) -> Result<Self> {
        let columns = OUTPUT_COLUMNS.iter().map(|c| c.to_string()).collect();
        let mut rows = Vec::with_capacity(feature_rows.len());
        for row in feature_rows {
            let named = row.cells();
            let names: Vec<&str> = named.iter().map(|(n, _)| *n).collect();
            if names != OUTPUT_COLUMNS {
                return Err(RiskError::Structural {
                    message: format!("row emitted columns {:?}", names),
                });
            }
            rows.push(named.into_iter().map(|(_, cell)| cell).collect());
        }
        Self::from_parts(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Every column as f64, text cells included (as NaN). Used when the
    /// classifier carries no preprocessing step of its own.
    pub fn to_raw_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows.len(), self.columns.len()), |(r, c)| {
            self.rows[r][c].as_f64()
        })
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, cell)| {
                        let value = serde_json::to_value(cell).unwrap_or(Value::Null);
                        (name.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Unwrap request `data` into an ordered list of records.
///
/// Accepts a single object, an array, or a JSON string holding either.
pub fn input_records(data: Value) -> Result<Vec<Value>> {
    let data = match data {
        Value::String(raw) => serde_json::from_str(&raw)?,
        other => other,
    };
    let records = match data {
        Value::Object(_) => vec![data],
        Value::Array(items) => items,
        other => {
            return Err(RiskError::InvalidInput {
                message: format!("expected a record or a list of records, got {}", kind(&other)),
            });
        }
    };
    if records.is_empty() {
        return Err(RiskError::InvalidInput {
            message: "no records supplied".to_string(),
        });
    }
    Ok(records)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Normalize each record and assemble the canonical feature table, keeping
/// input order. A record that is not a JSON object fails the whole batch.
pub fn build_feature_table(records: &[Value]) -> Result<FeatureTable> {
    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| match normalize_record(record.clone()) {
            Value::Object(map) => Ok(FeatureRow::from_record(&PatientRecord::from_normalized(
                &map,
            ))),
            other => Err(RiskError::InvalidInput {
                message: format!("record {} is {}, expected an object", i, kind(&other)),
            }),
        })
        .collect::<Result<Vec<_>>>()?;
    FeatureTable::from_feature_rows(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flag(table: &FeatureTable, row: usize, column: &str) -> i64 {
        match table.cell(row, column) {
            Some(Cell::Int(v)) => *v,
            other => panic!("{column} is not a flag: {other:?}"),
        }
    }

    #[test]
    fn reference_record_sets_expected_flags() {
        let record = json!({
            "age": 28,
            "medical_bg_mother": "diabetes, hypertension",
            "medical_bg_father": "thalassemia",
            "delivery_type": "Normal",
            "haemoglobin": 10.5
        });
        let table = build_feature_table(&[record]).unwrap();
        assert_eq!(flag(&table, 0, "mother_diabetes"), 1);
        assert_eq!(flag(&table, 0, "mother_hypertension"), 1);
        assert_eq!(flag(&table, 0, "father_thalassemia_trait"), 1);
        for column in [
            "mother_anaemia_dx",
            "mother_thyroid",
            "mother_heart_disease",
            "mother_prev_csection",
            "father_diabetes",
            "father_hypertension",
            "father_heart_disease",
        ] {
            assert_eq!(flag(&table, 0, column), 0, "{column}");
        }
        assert_eq!(table.cell(0, "age"), Some(&Cell::Int(28)));
        assert_eq!(table.cell(0, "haemoglobin"), Some(&Cell::Float(10.5)));
        assert_eq!(table.cell(0, "delivery_type"), Some(&Cell::Text("Normal".into())));
    }

    #[test]
    fn empty_record_has_all_columns_in_order() {
        let table = build_feature_table(&[json!({})]).unwrap();
        let columns: Vec<&str> = table.columns().iter().map(String::as_str).collect();
        assert_eq!(columns, OUTPUT_COLUMNS);
        assert_eq!(table.rows()[0].len(), 17);
        assert_eq!(table.cell(0, "age"), Some(&Cell::Missing));
        assert_eq!(table.cell(0, "past_pregnancy_count"), Some(&Cell::Int(0)));
        assert_eq!(table.cell(0, "blood_group_mother"), Some(&Cell::Text(String::new())));
        assert_eq!(table.cell(0, "time_since_last_pregnancy_years"), Some(&Cell::Missing));
    }

    #[test]
    fn coercion_falls_back_to_defaults() {
        let record = json!({
            "age": "twenty",
            "past_pregnancy_count": "several",
            "haemoglobin": "11.2",
            "yearsSinceLastPregnancy": " 4 ",
            "blood_group_mother": null,
            "blood_group_father": 7
        });
        let table = build_feature_table(&[record]).unwrap();
        assert_eq!(table.cell(0, "age"), Some(&Cell::Missing));
        assert_eq!(table.cell(0, "past_pregnancy_count"), Some(&Cell::Int(0)));
        assert_eq!(table.cell(0, "haemoglobin"), Some(&Cell::Float(11.2)));
        assert_eq!(table.cell(0, "time_since_last_pregnancy_years"), Some(&Cell::Float(4.0)));
        assert_eq!(table.cell(0, "blood_group_mother"), Some(&Cell::Text(String::new())));
        assert_eq!(table.cell(0, "blood_group_father"), Some(&Cell::Text("7".into())));
    }

    #[test]
    fn fractional_ages_truncate() {
        let table = build_feature_table(&[json!({"age": 29.9})]).unwrap();
        assert_eq!(table.cell(0, "age"), Some(&Cell::Int(29)));
    }

    #[test]
    fn father_side_drops_unmodelled_conditions() {
        let record = json!({"medicalBgFather": "anaemia, thyroid, c-section, cardiac"});
        let table = build_feature_table(&[record]).unwrap();
        assert_eq!(flag(&table, 0, "father_heart_disease"), 1);
        assert_eq!(flag(&table, 0, "mother_anaemia_dx"), 0);
        assert!(table.columns().iter().all(|c| !c.starts_with("father_anaemia")));
    }

    #[test]
    fn non_object_record_fails_the_batch() {
        let err = build_feature_table(&[json!({"age": 30}), json!(42)]).unwrap_err();
        assert!(matches!(err, RiskError::InvalidInput { .. }));
        assert!(err.to_string().contains("record 1"));
    }

    #[test]
    fn missing_columns_are_a_structural_error() {
        let mut columns: Vec<String> = OUTPUT_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.pop();
        let err = FeatureTable::from_parts(columns, vec![]).unwrap_err();
        assert!(matches!(err, RiskError::Structural { .. }));
        assert!(err.to_string().contains("father_thalassemia_trait"));
    }

    #[test]
    fn text_fields_stringify_scalars() {
        let table = build_feature_table(&[json!({
            "blood_group_mother": true,
            "blood_group_father": false,
            "delivery_type": 2
        })])
        .unwrap();
        assert_eq!(table.cell(0, "blood_group_mother"), Some(&Cell::Text("True".to_string())));
        assert_eq!(table.cell(0, "blood_group_father"), Some(&Cell::Text("False".to_string())));
        assert_eq!(table.cell(0, "delivery_type"), Some(&Cell::Text("2".to_string())));
    }

    #[test]
    fn raw_matrix_reads_text_as_nan() {
        let table = build_feature_table(&[json!({"age": 30, "blood_group_mother": "A+"})]).unwrap();
        let raw = table.to_raw_matrix();
        assert_eq!(raw.dim(), (1, 17));
        assert_eq!(raw[[0, 0]], 30.0);
        assert!(raw[[0, 2]].is_nan());
    }

    #[test]
    fn records_dump_uses_null_for_missing() {
        let table = build_feature_table(&[json!({"age": 30})]).unwrap();
        let records = table.to_records();
        assert_eq!(records[0]["age"], json!(30));
        assert_eq!(records[0]["haemoglobin"], Value::Null);
        assert_eq!(records[0].keys().next().map(String::as_str), Some("age"));
    }

    #[test]
    fn input_records_accepts_single_list_and_string() {
        assert_eq!(input_records(json!({"age": 1})).unwrap().len(), 1);
        assert_eq!(input_records(json!([{"age": 1}, {"age": 2}])).unwrap().len(), 2);
        assert_eq!(input_records(json!("[{\"age\": 1}]")).unwrap().len(), 1);
        assert!(input_records(json!([])).is_err());
        assert!(input_records(json!(3)).is_err());
        assert!(input_records(json!("not json")).is_err());
    }
}
