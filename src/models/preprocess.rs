//! Column preprocessing stored inside a classifier artifact.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};
use crate::features::{FeatureTable, OUTPUT_COLUMNS};

fn default_scale() -> f64 {
    1.0
}

/// One step of the preprocessor, producing one or more output columns.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnTransform {
    /// `(value - mean) / scale`, with missing values replaced by `impute` first.
    Numeric {
        column: String,
        #[serde(default)]
        impute: f64,
        #[serde(default)]
        mean: f64,
        #[serde(default = "default_scale")]
        scale: f64,
    },
    /// One indicator per category; unknown and missing values encode as all zeros.
    OneHot {
        column: String,
        categories: Vec<String>,
    },
}

impl ColumnTransform {
    pub fn column(&self) -> &str {
        match self {
            ColumnTransform::Numeric { column, .. } | ColumnTransform::OneHot { column, .. } => {
                column
            }
        }
    }

    pub fn width(&self) -> usize {
        match self {
            ColumnTransform::Numeric { .. } => 1,
            ColumnTransform::OneHot { categories, .. } => categories.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Preprocessor {
    pub transforms: Vec<ColumnTransform>,
}

impl Preprocessor {
    pub fn output_width(&self) -> usize {
        self.transforms.iter().map(ColumnTransform::width).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.transforms.is_empty() {
            return Err(RiskError::Config {
                message: "preprocessor has no transforms".to_string(),
            });
        }
        for t in &self.transforms {
            if !OUTPUT_COLUMNS.contains(&t.column()) {
                return Err(RiskError::Config {
                    message: format!("preprocessor references unknown column '{}'", t.column()),
                });
            }
            if let ColumnTransform::Numeric { scale, .. } = t
                && (*scale == 0.0 || !scale.is_finite())
            {
                return Err(RiskError::Config {
                    message: format!("column '{}' has invalid scale {}", t.column(), scale),
                });
            }
        }
        Ok(())
    }

    pub fn transform(&self, table: &FeatureTable) -> Result<Array2<f64>> {
        let mut out = Array2::<f64>::zeros((table.len(), self.output_width()));
        let mut offset = 0;
        for t in &self.transforms {
            let idx = table
                .column_index(t.column())
                .ok_or_else(|| RiskError::Structural {
                    message: format!("column '{}' not in feature table", t.column()),
                })?;
            for (r, row) in table.rows().iter().enumerate() {
                let cell = &row[idx];
                match t {
                    ColumnTransform::Numeric {
                        impute,
                        mean,
                        scale,
                        ..
                    } => {
                        let v = cell.as_f64();
                        let v = if v.is_nan() { *impute } else { v };
                        out[[r, offset]] = (v - mean) / scale;
                    }
                    ColumnTransform::OneHot { categories, .. } => {
                        if let Some(value) = cell.as_category()
                            && let Some(pos) = categories.iter().position(|c| *c == value)
                        {
                            out[[r, offset + pos]] = 1.0;
                        }
                    }
                }
            }
            offset += t.width();
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::build_feature_table;
    use serde_json::json;

    fn preprocessor() -> Preprocessor {
        serde_json::from_value(json!({
            "transforms": [
                {"kind": "numeric", "column": "age", "impute": 30.0, "mean": 30.0, "scale": 5.0},
                {"kind": "one_hot", "column": "delivery_type", "categories": ["Normal", "C-Section"]},
                {"kind": "numeric", "column": "mother_diabetes"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn numeric_columns_are_imputed_and_scaled() {
        let table = build_feature_table(&[json!({"age": 35}), json!({})]).unwrap();
        let out = preprocessor().transform(&table).unwrap();
        assert_eq!(out.dim(), (2, 4));
        assert_eq!(out[[0, 0]], 1.0);
        assert_eq!(out[[1, 0]], 0.0);
    }

    #[test]
    fn one_hot_ignores_unknown_categories() {
        let table = build_feature_table(&[
            json!({"delivery_type": "C-Section", "medical_bg_mother": "diabetes"}),
            json!({"delivery_type": "Assisted"}),
        ])
        .unwrap();
        let out = preprocessor().transform(&table).unwrap();
        assert_eq!(out.row(0).to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(out.row(1).to_vec(), vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn validation_rejects_unknown_columns_and_zero_scale() {
        let bad_column = Preprocessor {
            transforms: vec![ColumnTransform::OneHot {
                column: "eye_colour".into(),
                categories: vec![],
            }],
        };
        assert!(bad_column.validate().is_err());

        let zero_scale = Preprocessor {
            transforms: vec![ColumnTransform::Numeric {
                column: "age".into(),
                impute: 0.0,
                mean: 0.0,
                scale: 0.0,
            }],
        };
        assert!(zero_scale.validate().is_err());
        assert!(preprocessor().validate().is_ok());
    }
}
