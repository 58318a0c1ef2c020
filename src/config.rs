use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::models::ModelPaths;

/// Main configuration structure loaded from risk_predictor.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Locations of the serialized model artifacts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub classifier_path: PathBuf,
    pub regressor_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier_path: PathBuf::from("multioutput_classifier_rf.json"),
            regressor_path: PathBuf::from("risk_regressor_rf.json"),
        }
    }
}

/// HTTP listener and CORS settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub cors_origins: Vec<String>,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            // Front-end dev servers
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://192.168.222.177:5173".to_string(),
                "http://172.31.73.125:5173".to_string(),
            ],
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub log_level: String,
    /// Config file that was looked for.
    pub config_path: PathBuf,
    /// Whether `config_path` existed and was read.
    pub config_found: bool,
    /// Env overrides that were applied, by variable name.
    pub applied_overrides: Vec<String>,
    /// Overrides that were present but unusable.
    pub rejected_overrides: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "risk_predictor=info".to_string(),
            config_path: PathBuf::from("risk_predictor.toml"),
            config_found: false,
            applied_overrides: Vec::new(),
            rejected_overrides: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "risk_predictor=info".to_string()),
            ..Self::default()
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses RISK_PREDICTOR_CONFIG environment variable or defaults to "risk_predictor.toml"
    pub fn load() -> anyhow::Result<Self> {
        // RISK_ENV_FILE if set, else ./.env when present
        if let Ok(env_path) = std::env::var("RISK_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
        }

        let config_path = std::env::var("RISK_PREDICTOR_CONFIG")
            .unwrap_or_else(|_| "risk_predictor.toml".to_string());

        let runtime = RuntimeConfig::load_from_env();
        let mut config = Self::from_path(Path::new(&config_path))?;
        config.runtime.log_level = runtime.log_level;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Read `path`, falling back to defaults when it does not exist.
    /// Runs before logging is set up, so the outcome is recorded in
    /// `runtime` and reported by [`Config::log_startup`].
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let mut config = Self::from_toml_str(&content)?;
                config.runtime.config_found = true;
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(anyhow::anyhow!("failed to read {}: {}", path.display(), e)),
        };
        config.runtime.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Log where configuration came from and anything suspicious in it.
    /// Call once the tracing subscriber is installed.
    pub fn log_startup(&self) {
        if self.runtime.config_found {
            tracing::info!("Loaded configuration from {}", self.runtime.config_path.display());
        } else {
            tracing::warn!(
                "Config file {} not found, using defaults",
                self.runtime.config_path.display()
            );
        }
        for name in &self.runtime.applied_overrides {
            tracing::debug!("{} override applied", name);
        }
        for rejected in &self.runtime.rejected_overrides {
            tracing::warn!("Ignoring unparseable override {}", rejected);
        }
        if self.server.cors_origins.is_empty() {
            tracing::warn!("No CORS origins configured; browsers will be refused");
        }
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply env-style overrides (env-first) from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let mut applied = Vec::new();
        if let Some(path) = lookup("RISK_CLASSIFIER_PATH") {
            self.models.classifier_path = PathBuf::from(path);
            applied.push("RISK_CLASSIFIER_PATH");
        }
        if let Some(path) = lookup("RISK_REGRESSOR_PATH") {
            self.models.regressor_path = PathBuf::from(path);
            applied.push("RISK_REGRESSOR_PATH");
        }
        if let Some(bind) = lookup("RISK_HTTP_BIND") {
            match bind.parse::<SocketAddr>() {
                Ok(addr) => {
                    self.server.bind = addr;
                    applied.push("RISK_HTTP_BIND");
                }
                Err(_) => self
                    .runtime
                    .rejected_overrides
                    .push(format!("RISK_HTTP_BIND='{}'", bind)),
            }
        }
        if let Some(origins) = lookup("RISK_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            applied.push("RISK_CORS_ORIGINS");
        }
        if let Some(limit) = lookup("RISK_BODY_LIMIT_BYTES") {
            match limit.parse() {
                Ok(limit) => {
                    self.server.body_limit_bytes = limit;
                    applied.push("RISK_BODY_LIMIT_BYTES");
                }
                Err(_) => self
                    .runtime
                    .rejected_overrides
                    .push(format!("RISK_BODY_LIMIT_BYTES='{}'", limit)),
            }
        }
        self.runtime
            .applied_overrides
            .extend(applied.into_iter().map(String::from));
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.models.classifier_path.as_os_str().is_empty() {
            anyhow::bail!("models.classifier_path must not be empty");
        }
        if self.models.regressor_path.as_os_str().is_empty() {
            anyhow::bail!("models.regressor_path must not be empty");
        }
        if self.server.body_limit_bytes == 0 {
            anyhow::bail!("server.body_limit_bytes must be > 0");
        }
        Ok(())
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths {
            classifier: self.models.classifier_path.clone(),
            regressor: self.models.regressor_path.clone(),
        }
    }
}
