//! Model abstractions consumed by the prediction shaper.
//!
//! The shaper only talks to [`Classifier`] and [`Regressor`]; the concrete
//! tree ensembles in [`forest`] are one implementation, loaded from disk by
//! [`provider::ModelProvider`].

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::Result;
use crate::features::FeatureTable;

pub mod forest;
pub mod preprocess;
pub mod provider;

pub use forest::{DecisionTree, Forest, ForestClassifier, ForestRegressor, LabelEstimator};
pub use preprocess::{ColumnTransform, Preprocessor};
pub use provider::{LoadedModels, ModelPaths, ModelProvider, load_models};

/// Probability output of a multi-label classifier, in whichever shape the
/// model produces it.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbaOutput {
    /// One `rows x classes` matrix per label.
    PerLabel(Vec<Array2<f64>>),
    /// `rows x labels` positive-class probabilities.
    Matrix(Array2<f64>),
    /// Single label, one probability per row.
    Vector(Array1<f64>),
    /// Anything else; the shaper cannot interpret it.
    Other { description: String },
}

/// Hard label output of a classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum HardLabels {
    Vector(Array1<f64>),
    Matrix(Array2<f64>),
}

pub trait Classifier: Send + Sync {
    fn predict_proba(&self, table: &FeatureTable) -> Result<ProbaOutput>;

    fn predict(&self, table: &FeatureTable) -> Result<HardLabels>;

    /// Number of per-label estimators, when the model exposes it.
    fn estimator_count(&self) -> Option<usize> {
        None
    }

    /// Output of the model's own preprocessing step, when it has one.
    fn transform(&self, _table: &FeatureTable) -> Option<Result<Array2<f64>>> {
        None
    }
}

pub trait Regressor: Send + Sync {
    /// Risk score for one row of (preprocessed or raw) features.
    fn predict_row(&self, features: ArrayView1<f64>) -> Result<f64>;
}
