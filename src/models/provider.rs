//! Process-wide model handle.
//!
//! Models are loaded once at startup and shared read-only. If the initial load
//! fails the error is kept for `/health` and every `get_models` call retries.
//! Loads run without holding the slot lock, so two concurrent retries may both
//! load; either result is usable and the last one stays cached.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::forest::{ForestClassifier, ForestRegressor};
use super::{Classifier, Regressor};
use crate::error::{Result, RiskError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub classifier: PathBuf,
    pub regressor: PathBuf,
}

#[derive(Clone)]
pub struct LoadedModels {
    pub classifier: Arc<dyn Classifier>,
    pub regressor: Arc<dyn Regressor>,
}

/// Read both artifacts from disk.
pub fn load_models(paths: &ModelPaths) -> Result<LoadedModels> {
    let classifier =
        ForestClassifier::from_path(&paths.classifier).map_err(|e| RiskError::ModelLoad {
            message: format!(
                "Failed loading classifier from {}: {:#}",
                paths.classifier.display(),
                e
            ),
        })?;
    let regressor =
        ForestRegressor::from_path(&paths.regressor).map_err(|e| RiskError::ModelLoad {
            message: format!(
                "Failed loading regressor from {}: {:#}",
                paths.regressor.display(),
                e
            ),
        })?;
    Ok(LoadedModels {
        classifier: Arc::new(classifier),
        regressor: Arc::new(regressor),
    })
}

pub struct ModelProvider {
    paths: Option<ModelPaths>,
    slot: RwLock<Option<LoadedModels>>,
    load_error: RwLock<Option<String>>,
}

impl ModelProvider {
    /// Provider that loads from `paths` on first use.
    pub fn new(paths: ModelPaths) -> Self {
        Self {
            paths: Some(paths),
            slot: RwLock::new(None),
            load_error: RwLock::new(None),
        }
    }

    /// Provider around models that are already in memory.
    pub fn with_models(models: LoadedModels) -> Self {
        Self {
            paths: None,
            slot: RwLock::new(Some(models)),
            load_error: RwLock::new(None),
        }
    }

    /// Attempt the startup load. Failure is logged and remembered, not returned.
    pub async fn try_initial_load(&self) -> bool {
        match self.reload().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Initial model load failed: {}", e);
                false
            }
        }
    }

    /// Cached models, loading them now if no load has succeeded yet.
    pub async fn get_models(&self) -> Result<LoadedModels> {
        if let Some(models) = self.slot.read().await.clone() {
            return Ok(models);
        }
        self.reload().await
    }

    /// Load both artifacts again and replace the cached pair on success.
    pub async fn reload(&self) -> Result<LoadedModels> {
        let Some(paths) = self.paths.clone() else {
            return self.slot.read().await.clone().ok_or_else(|| RiskError::ModelLoad {
                message: "no model paths configured".to_string(),
            });
        };

        let result = tokio::task::spawn_blocking(move || load_models(&paths))
            .await
            .map_err(|e| RiskError::Internal {
                message: format!("model load task failed: {}", e),
            })?;

        match result {
            Ok(models) => {
                *self.slot.write().await = Some(models.clone());
                *self.load_error.write().await = None;
                info!("Models loaded");
                Ok(models)
            }
            Err(e) => {
                *self.load_error.write().await = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Message of the most recent failed load, cleared by a successful one.
    pub async fn load_error(&self) -> Option<String> {
        self.load_error.read().await.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_paths() -> ModelPaths {
        ModelPaths {
            classifier: PathBuf::from("/nonexistent/classifier.json"),
            regressor: PathBuf::from("/nonexistent/regressor.json"),
        }
    }

    #[tokio::test]
    async fn failed_initial_load_is_recorded() {
        let provider = ModelProvider::new(missing_paths());
        assert!(!provider.try_initial_load().await);
        let err = provider.load_error().await.unwrap();
        assert!(err.starts_with("Failed loading classifier from /nonexistent/classifier.json"));
        assert!(!provider.is_loaded().await);
    }

    #[tokio::test]
    async fn get_models_retries_and_reports_load_errors() {
        let provider = ModelProvider::new(missing_paths());
        let err = provider.get_models().await.err().unwrap();
        assert!(err.is_model_unavailable());
    }
}
