use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_VAR: &str = "ONCOPREDICT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/service.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub patients: PatientsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub image: ImageModelConfig,
    pub treatment: TabularModelConfig,
    pub survival: TabularModelConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            image: ImageModelConfig::default(),
            treatment: TabularModelConfig {
                path: PathBuf::from("models/xgboost_all_treatments.json"),
            },
            survival: TabularModelConfig {
                path: PathBuf::from("models/random_forest_survival_model.json"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularModelConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageModelConfig {
    pub path: PathBuf,
    /// `[width, height]` the upload is resized to.
    pub size: Vec<u32>,
    /// Output index → class name.
    pub class_names: Vec<String>,
    /// Feed the module NCHW instead of NHWC.
    pub channels_first: bool,
    pub apply_softmax: bool,
}

impl Default for ImageModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/cnn_model.pt"),
            size: vec![224, 224],
            class_names: vec!["benign".to_string(), "malignant".to_string()],
            channels_first: false,
            apply_softmax: false,
        }
    }
}

impl ImageModelConfig {
    pub fn target_size(&self) -> (u32, u32) {
        match self.size.as_slice() {
            [w, h] => (*w, *h),
            _ => (224, 224),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientsConfig {
    /// JSON snapshot of the patient table; in-memory only when unset.
    pub store_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Resolves `$ONCOPREDICT_CONFIG` (or the default path), then applies env
    /// overrides. A missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::load_from(Path::new(&path))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        log::info!("Reading config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a port number: {port}")))?;
        }
        if let Some(path) = lookup("IMAGE_MODEL_PATH") {
            self.models.image.path = path.into();
        }
        if let Some(path) = lookup("TREATMENT_MODEL_PATH") {
            self.models.treatment.path = path.into();
        }
        if let Some(path) = lookup("SURVIVAL_MODEL_PATH") {
            self.models.survival.path = path.into();
        }
        if let Some(path) = lookup("PATIENT_STORE_PATH") {
            self.patients.store_path = Some(path.into());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = &self.models.image.size;
        if size.len() != 2 || size.iter().any(|&d| d == 0) {
            return Err(ConfigError::Invalid(format!(
                "models.image.size must be two positive integers, got {size:?}"
            )));
        }
        if self.models.image.class_names.is_empty() {
            return Err(ConfigError::Invalid(
                "models.image.class_names must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
