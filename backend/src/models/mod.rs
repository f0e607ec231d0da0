pub mod tree_ensemble;
#[cfg(feature = "torch")]
pub mod torch;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};
use ndarray::Array4;
use serde::Serialize;

use crate::config::{ImageModelConfig, ModelsConfig};
use crate::features::FeatureRow;
use tree_ensemble::TreeEnsemble;

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("model file not found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read model file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed model artifact: {0}")]
    Malformed(String),
    #[error("unsupported objective '{0}'")]
    UnsupportedObjective(String),
    #[error("{0} backend is not compiled into this build")]
    BackendUnavailable(&'static str),
    #[cfg(feature = "torch")]
    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),
}

/// Failure raised by the model call itself. The message goes back to the
/// client verbatim.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("feature shape mismatch, expected {expected} columns, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
    #[error("feature_names mismatch: column '{0}' expected by the model is absent")]
    UnknownColumn(String),
    #[error("unsupported value {value:?} for column '{column}'")]
    UnsupportedValue { column: String, value: String },
    #[error("input tensor is not contiguous")]
    NonContiguous,
    #[error("{0}")]
    Model(String),
}

/// Predictor over one labelled row of clinical features.
pub trait TabularModel: Send + Sync {
    /// One class label per model output.
    fn predict(&self, row: &FeatureRow) -> Result<Vec<i64>, InferenceError>;

    /// Class probabilities of the first output, indexed by class label.
    fn predict_proba(&self, row: &FeatureRow) -> Result<Vec<f64>, InferenceError>;
}

/// Classifier over a `[1, height, width, 3]` batch in the `[0, 1]` range.
pub trait ImageClassifier: Send + Sync {
    /// Per-class scores for the single image in the batch.
    fn predict(&self, batch: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Image,
    Treatment,
    Survival,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Image => "image prediction",
            ModelKind::Treatment => "treatment prediction",
            ModelKind::Survival => "survival prediction",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ModelStatus {
    pub image: bool,
    pub treatment: bool,
    pub survival: bool,
}

/// Model handles shared read-only by every request. A `None` slot means the
/// artifact failed to load at startup; it is never retried.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    image: Option<Arc<dyn ImageClassifier>>,
    treatment: Option<Arc<dyn TabularModel>>,
    survival: Option<Arc<dyn TabularModel>>,
    artifacts: ArtifactPaths,
}

#[derive(Clone, Default)]
struct ArtifactPaths {
    image: PathBuf,
    treatment: PathBuf,
    survival: PathBuf,
}

impl ModelRegistry {
    /// Attempts every load once. Failures are logged and leave the slot empty.
    pub fn load(config: &ModelsConfig) -> Self {
        let image = report(
            ModelKind::Image,
            &config.image.path,
            load_image_classifier(&config.image),
        );
        let treatment = report(
            ModelKind::Treatment,
            &config.treatment.path,
            TreeEnsemble::load(&config.treatment.path).map(|m| Arc::new(m) as Arc<dyn TabularModel>),
        );
        let survival = report(
            ModelKind::Survival,
            &config.survival.path,
            TreeEnsemble::load(&config.survival.path).map(|m| Arc::new(m) as Arc<dyn TabularModel>),
        );

        Self {
            image,
            treatment,
            survival,
            artifacts: ArtifactPaths {
                image: config.image.path.clone(),
                treatment: config.treatment.path.clone(),
                survival: config.survival.path.clone(),
            },
        }
    }

    pub fn with_image(mut self, model: Arc<dyn ImageClassifier>) -> Self {
        self.image = Some(model);
        self
    }

    pub fn with_treatment(mut self, model: Arc<dyn TabularModel>) -> Self {
        self.treatment = Some(model);
        self
    }

    pub fn with_survival(mut self, model: Arc<dyn TabularModel>) -> Self {
        self.survival = Some(model);
        self
    }

    pub fn image(&self) -> Option<&dyn ImageClassifier> {
        self.image.as_deref()
    }

    pub fn treatment(&self) -> Option<&dyn TabularModel> {
        self.treatment.as_deref()
    }

    pub fn survival(&self) -> Option<&dyn TabularModel> {
        self.survival.as_deref()
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            image: self.image.is_some(),
            treatment: self.treatment.is_some(),
            survival: self.survival.is_some(),
        }
    }

    /// Where the operator should put the artifact for `kind`.
    pub fn artifact_path(&self, kind: ModelKind) -> &Path {
        match kind {
            ModelKind::Image => &self.artifacts.image,
            ModelKind::Treatment => &self.artifacts.treatment,
            ModelKind::Survival => &self.artifacts.survival,
        }
    }
}

fn report<T>(kind: ModelKind, path: &Path, result: Result<T, ModelLoadError>) -> Option<T> {
    match result {
        Ok(model) => {
            info!("Loaded {} model from {}", kind, path.display());
            Some(model)
        }
        Err(e) => {
            error!("Error loading {} model from {}: {}", kind, path.display(), e);
            None
        }
    }
}

pub(crate) fn read_artifact(path: &Path) -> Result<Vec<u8>, ModelLoadError> {
    if !path.exists() {
        return Err(ModelLoadError::NotFound(path.to_path_buf()));
    }
    std::fs::read(path).map_err(|source| ModelLoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(feature = "torch")]
fn load_image_classifier(
    config: &ImageModelConfig,
) -> Result<Arc<dyn ImageClassifier>, ModelLoadError> {
    if !config.path.exists() {
        return Err(ModelLoadError::NotFound(config.path.clone()));
    }
    let model = torch::TorchImageClassifier::load(config)?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "torch"))]
fn load_image_classifier(
    config: &ImageModelConfig,
) -> Result<Arc<dyn ImageClassifier>, ModelLoadError> {
    if !config.path.exists() {
        return Err(ModelLoadError::NotFound(config.path.clone()));
    }
    Err(ModelLoadError::BackendUnavailable("TorchScript"))
}
