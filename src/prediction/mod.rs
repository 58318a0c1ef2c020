//! Prediction shaping: run both models over a feature table and merge their
//! outputs into one column-named response.
//!
//! Classifier outputs come in several shapes (per-label probability matrices,
//! a single matrix, hard labels with a different label count). Probabilities
//! are reconciled strictly; hard labels are fitted to the probability columns
//! by [`align_columns`], a best-effort policy that reports when it fires.

use ndarray::{Array2, Axis};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, RiskError};
use crate::features::{FeatureTable, build_feature_table, input_records};
use crate::models::{Classifier, HardLabels, ProbaOutput, Regressor};

/// Column names reported alongside the per-row maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnNames {
    pub flags: Vec<String>,
    pub probabilities: Vec<String>,
}

/// What the best-effort alignment did to the hard-label matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Unchanged,
    Truncated {
        from: usize,
        to: usize,
    },
    Padded {
        from: usize,
        to: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseBatch {
    pub predictions: Vec<Map<String, Value>>,
    pub probabilities: Vec<Map<String, Value>>,
    pub risk: Vec<f64>,
    pub columns: ColumnNames,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_ids: Option<Vec<Value>>,
    #[serde(skip)]
    pub alignment: Alignment,
}

impl ResponseBatch {
    pub fn len(&self) -> usize {
        self.risk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.risk.is_empty()
    }

    /// Attach caller identifiers positionally to every prediction and
    /// probability record, and list them under `input_ids`.
    pub fn attach_input_ids(&mut self, ids: Vec<Value>) {
        for (i, rec) in self.predictions.iter_mut().enumerate() {
            rec.insert(
                "_input_id".to_string(),
                ids.get(i).cloned().unwrap_or(Value::Null),
            );
        }
        for (i, rec) in self.probabilities.iter_mut().enumerate() {
            rec.insert(
                "_input_id".to_string(),
                ids.get(i).cloned().unwrap_or(Value::Null),
            );
        }
        self.input_ids = Some(ids);
    }
}

/// Caller identifier per record: `id` if present, else `external_id`, else null.
pub fn input_ids(records: &[Value]) -> Vec<Value> {
    records
        .iter()
        .map(|r| match r.as_object() {
            Some(obj) if obj.contains_key("id") => obj["id"].clone(),
            Some(obj) if obj.contains_key("external_id") => obj["external_id"].clone(),
            _ => Value::Null,
        })
        .collect()
}

pub fn positional_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("flag_{}", i)).collect()
}

/// Collapse any supported probability shape into `rows x labels`.
///
/// Per-label matrices contribute their positive-class column; a matrix
/// without exactly two columns contributes zeros.
pub fn reconcile_probabilities(output: ProbaOutput, n_rows: usize) -> Result<Array2<f64>> {
    let check_rows = |got: usize, what: &str| {
        if got != n_rows {
            Err(RiskError::Reconciliation {
                message: format!("{} has {} rows, expected {}", what, got, n_rows),
            })
        } else {
            Ok(())
        }
    };

    match output {
        ProbaOutput::PerLabel(per_label) => {
            if per_label.is_empty() {
                return Err(RiskError::Reconciliation {
                    message: "classifier returned no per-label probabilities".to_string(),
                });
            }
            let mut out = Array2::<f64>::zeros((n_rows, per_label.len()));
            for (label, proba) in per_label.iter().enumerate() {
                check_rows(proba.nrows(), &format!("probabilities for label {}", label))?;
                if proba.ncols() == 2 {
                    out.column_mut(label).assign(&proba.column(1));
                } else {
                    debug!(
                        "label {} has {} probability columns; using zeros",
                        label,
                        proba.ncols()
                    );
                }
            }
            Ok(out)
        }
        ProbaOutput::Matrix(matrix) => {
            check_rows(matrix.nrows(), "probability matrix")?;
            Ok(matrix)
        }
        ProbaOutput::Vector(vector) => {
            check_rows(vector.len(), "probability vector")?;
            Ok(vector.insert_axis(Axis(1)))
        }
        ProbaOutput::Other { description } => Err(RiskError::Reconciliation {
            message: format!("Unexpected predict_proba output type: {}", description),
        }),
    }
}

/// Label names for `n_columns` probability columns: `flag_{i}` per
/// introspected estimator, else a single `flag_0`. Any count mismatch falls
/// back to positional names for the actual column count.
pub fn derive_label_names(classifier: &dyn Classifier, n_columns: usize) -> Vec<String> {
    let names = positional_names(classifier.estimator_count().unwrap_or(1));
    if names.len() != n_columns {
        positional_names(n_columns)
    } else {
        names
    }
}

/// Best-effort alignment: drop extra columns or zero-pad missing ones so that
/// `labels` has exactly `width` columns.
pub fn align_columns(labels: Array2<f64>, width: usize) -> (Array2<f64>, Alignment) {
    let have = labels.ncols();
    if have == width {
        return (labels, Alignment::Unchanged);
    }
    let mut out = Array2::<f64>::zeros((labels.nrows(), width));
    let keep = have.min(width);
    out.slice_mut(ndarray::s![.., ..keep])
        .assign(&labels.slice(ndarray::s![.., ..keep]));
    let alignment = if have > width {
        Alignment::Truncated {
            from: have,
            to: width,
        }
    } else {
        Alignment::Padded {
            from: have,
            to: width,
        }
    };
    warn!(
        "hard labels have {} columns but probabilities have {}; {:?}",
        have, width, alignment
    );
    (out, alignment)
}

fn hard_label_matrix(labels: HardLabels) -> Array2<f64> {
    match labels {
        HardLabels::Vector(v) => v.insert_axis(Axis(1)),
        HardLabels::Matrix(m) => m,
    }
}

/// Risk score per row. The regressor sees the classifier's preprocessed
/// features when it has a preprocessing step, otherwise the raw table.
pub fn predict_risk(
    classifier: &dyn Classifier,
    regressor: &dyn Regressor,
    table: &FeatureTable,
) -> Result<Vec<f64>> {
    let features = match classifier.transform(table) {
        Some(transformed) => transformed?,
        None => table.to_raw_matrix(),
    };
    if features.nrows() != table.len() {
        return Err(RiskError::Model {
            message: format!(
                "preprocessing produced {} rows for {} records",
                features.nrows(),
                table.len()
            ),
        });
    }
    features
        .rows()
        .into_iter()
        .map(|row| regressor.predict_row(row))
        .collect()
}

fn round6(p: f64) -> f64 {
    (p * 1e6).round() / 1e6
}

/// Run both models over `table` and assemble the response, preserving row order.
pub fn shape_predictions(
    table: &FeatureTable,
    classifier: &dyn Classifier,
    regressor: &dyn Regressor,
) -> Result<ResponseBatch> {
    let n_rows = table.len();
    let proba = reconcile_probabilities(classifier.predict_proba(table)?, n_rows)?;
    let names = derive_label_names(classifier, proba.ncols());

    let labels = hard_label_matrix(classifier.predict(table)?);
    if labels.nrows() != n_rows {
        return Err(RiskError::Model {
            message: format!(
                "classifier returned {} label rows for {} records",
                labels.nrows(),
                n_rows
            ),
        });
    }
    let (labels, alignment) = align_columns(labels, proba.ncols());

    let risk = predict_risk(classifier, regressor, table)?;

    let predictions = labels
        .rows()
        .into_iter()
        .map(|row| {
            names
                .iter()
                .zip(row.iter())
                .map(|(name, &v)| (name.clone(), Value::from(v as i64)))
                .collect()
        })
        .collect();
    let probabilities = proba
        .rows()
        .into_iter()
        .map(|row| {
            names
                .iter()
                .zip(row.iter())
                .map(|(name, &p)| (name.clone(), Value::from(round6(p))))
                .collect()
        })
        .collect();

    Ok(ResponseBatch {
        predictions,
        probabilities,
        risk,
        columns: ColumnNames {
            flags: names.clone(),
            probabilities: names,
        },
        input_ids: None,
        alignment,
    })
}

/// Full pipeline from request `data` to response.
pub fn predict_from_json(
    data: Value,
    classifier: &dyn Classifier,
    regressor: &dyn Regressor,
) -> Result<ResponseBatch> {
    predict_records(data, classifier, regressor, false)
}

/// [`predict_from_json`], optionally attaching each input record's
/// identifier (see [`input_ids`]) to the response.
pub fn predict_records(
    data: Value,
    classifier: &dyn Classifier,
    regressor: &dyn Regressor,
    include_id: bool,
) -> Result<ResponseBatch> {
    let records = input_records(data)?;
    let table = build_feature_table(&records)?;
    let mut batch = shape_predictions(&table, classifier, regressor)?;
    if include_id {
        batch.attach_input_ids(input_ids(&records));
    }
    Ok(batch)
}
