//! Tree-ensemble classifier and regressor read from JSON artifacts.
//!
//! Trees use the flat array layout common to exported decision trees: node
//! `i` splits on `feature[i]` at `threshold[i]`, rows with `x <= threshold`
//! go to `children_left[i]`, the rest to `children_right[i]`, and leaves have
//! `-1` children. `value[i]` holds class counts (classifiers) or a single
//! target value (regressors).

use std::path::Path;

use anyhow::Context;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use super::preprocess::Preprocessor;
use super::{Classifier, HardLabels, ProbaOutput, Regressor};
use crate::error::{Result, RiskError};
use crate::features::{FeatureTable, OUTPUT_COLUMNS};

const LEAF: i64 = -1;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<Vec<f64>>,
    /// Per-node direction for NaN inputs; left when absent.
    #[serde(default)]
    pub missing_go_left: Option<Vec<bool>>,
}

impl DecisionTree {
    fn node_count(&self) -> usize {
        self.children_left.len()
    }

    /// Check array lengths, child indices and split features.
    ///
    /// Children must come after their parent, which also rules out cycles.
    pub fn validate(
        &self,
        n_features: usize,
        value_width: usize,
    ) -> std::result::Result<(), String> {
        let n = self.node_count();
        let invalid = |message: String| Err(message);
        if n == 0 {
            return invalid("tree has no nodes".to_string());
        }
        if self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
            || self.value.len() != n
            || self.missing_go_left.as_ref().is_some_and(|m| m.len() != n)
        {
            return invalid(format!("tree arrays disagree on node count {}", n));
        }
        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF || right == LEAF {
                if left != right {
                    return invalid(format!("node {} has exactly one child", node));
                }
                if self.value[node].len() != value_width {
                    return invalid(format!(
                        "leaf {} holds {} values, expected {}",
                        node,
                        self.value[node].len(),
                        value_width
                    ));
                }
                continue;
            }
            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return invalid(format!("node {} has invalid child {}", node, child));
                }
            }
            let f = self.feature[node];
            if f < 0 || f as usize >= n_features {
                return invalid(format!(
                    "node {} splits on feature {} but inputs have {} columns",
                    node, f, n_features
                ));
            }
        }
        Ok(())
    }

    /// Walk to the leaf reached by `x` and return its values.
    pub fn leaf_values(&self, x: ArrayView1<f64>) -> &[f64] {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            let v = x[self.feature[node] as usize];
            let go_left = if v.is_nan() {
                self.missing_go_left
                    .as_ref()
                    .map(|m| m[node])
                    .unwrap_or(true)
            } else {
                v <= self.threshold[node]
            };
            node = if go_left {
                self.children_left[node]
            } else {
                self.children_right[node]
            } as usize;
        }
        &self.value[node]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Forest {
    pub trees: Vec<DecisionTree>,
}

impl Forest {
    pub fn validate(
        &self,
        n_features: usize,
        value_width: usize,
    ) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features, value_width)
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Average of per-tree class distributions (leaf counts normalized to 1).
    fn class_distribution(&self, x: ArrayView1<f64>, n_classes: usize) -> Vec<f64> {
        let mut acc = vec![0.0; n_classes];
        for tree in &self.trees {
            let leaf = tree.leaf_values(x);
            let total: f64 = leaf.iter().sum();
            if total > 0.0 {
                for (a, v) in acc.iter_mut().zip(leaf) {
                    *a += v / total;
                }
            }
        }
        let n = self.trees.len() as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        acc
    }

    fn mean_value(&self, x: ArrayView1<f64>) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.leaf_values(x)[0]).sum();
        sum / self.trees.len() as f64
    }
}

/// One binary (or single-class) estimator of the multi-output classifier.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LabelEstimator {
    /// Class labels in column order of the leaf counts, e.g. `[0.0, 1.0]`.
    pub classes: Vec<f64>,
    pub forest: Forest,
}

/// Multi-output random-forest classifier with an optional preprocessing step.
///
/// Estimators are in label order; responses name them `flag_0..flag_{n-1}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ForestClassifier {
    #[serde(default)]
    pub preprocessor: Option<Preprocessor>,
    pub estimators: Vec<LabelEstimator>,
}

impl ForestClassifier {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let model: Self = serde_json::from_str(&content).context("invalid classifier artifact")?;
        model.validate()?;
        Ok(model)
    }

    /// Width of the matrix the trees split on.
    pub fn input_width(&self) -> usize {
        self.preprocessor
            .as_ref()
            .map(Preprocessor::output_width)
            .unwrap_or(OUTPUT_COLUMNS.len())
    }

    pub fn validate(&self) -> Result<()> {
        if self.estimators.is_empty() {
            return Err(RiskError::Config {
                message: "classifier has no estimators".to_string(),
            });
        }
        if let Some(pre) = &self.preprocessor {
            pre.validate()?;
        }
        let width = self.input_width();
        for (i, est) in self.estimators.iter().enumerate() {
            if est.classes.is_empty() {
                return Err(RiskError::Config {
                    message: format!("estimator {} has no classes", i),
                });
            }
            est.forest
                .validate(width, est.classes.len())
                .map_err(|e| RiskError::Config {
                    message: format!("estimator {}: {}", i, e),
                })?;
        }
        Ok(())
    }

    fn features(&self, table: &FeatureTable) -> Result<Array2<f64>> {
        match &self.preprocessor {
            Some(pre) => pre.transform(table),
            None => Ok(table.to_raw_matrix()),
        }
    }

    fn label_probabilities(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        self.estimators
            .iter()
            .map(|est| {
                let n_classes = est.classes.len();
                let mut proba = Array2::<f64>::zeros((x.nrows(), n_classes));
                for (r, row) in x.rows().into_iter().enumerate() {
                    let dist = est.forest.class_distribution(row, n_classes);
                    for (c, p) in dist.into_iter().enumerate() {
                        proba[[r, c]] = p;
                    }
                }
                proba
            })
            .collect()
    }
}

impl Classifier for ForestClassifier {
    fn predict_proba(&self, table: &FeatureTable) -> Result<ProbaOutput> {
        let x = self.features(table)?;
        Ok(ProbaOutput::PerLabel(self.label_probabilities(&x)))
    }

    fn predict(&self, table: &FeatureTable) -> Result<HardLabels> {
        let x = self.features(table)?;
        let per_label = self.label_probabilities(&x);
        let mut labels = Array2::<f64>::zeros((x.nrows(), self.estimators.len()));
        for (l, (est, proba)) in self.estimators.iter().zip(&per_label).enumerate() {
            for (r, row) in proba.rows().into_iter().enumerate() {
                // First maximum wins ties.
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &p)| {
                        if p > acc.1 { (i, p) } else { acc }
                    })
                    .0;
                labels[[r, l]] = est.classes[best];
            }
        }
        Ok(HardLabels::Matrix(labels))
    }

    fn estimator_count(&self) -> Option<usize> {
        Some(self.estimators.len())
    }

    fn transform(&self, table: &FeatureTable) -> Option<Result<Array2<f64>>> {
        self.preprocessor.as_ref().map(|pre| pre.transform(table))
    }
}

/// Random-forest regressor producing the continuous risk score.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ForestRegressor {
    pub n_features: usize,
    pub forest: Forest,
}

impl ForestRegressor {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let model: Self = serde_json::from_str(&content).context("invalid regressor artifact")?;
        model
            .forest
            .validate(model.n_features, 1)
            .map_err(anyhow::Error::msg)?;
        Ok(model)
    }

    /// Batch form of [`Regressor::predict_row`].
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }
}

impl Regressor for ForestRegressor {
    fn predict_row(&self, features: ArrayView1<f64>) -> Result<f64> {
        if features.len() != self.n_features {
            return Err(RiskError::Model {
                message: format!(
                    "regressor expects {} features, got {}",
                    self.n_features,
                    features.len()
                ),
            });
        }
        Ok(self.forest.mean_value(features))
    }
}
