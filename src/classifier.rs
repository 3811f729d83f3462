//! Pre-trained classifier artifact and the seam the prediction service calls
//! through.

use crate::features::{FeatureRow, Preprocessor, COLUMNS, FEATURE_SCHEMA_VERSION};
use linfa::prelude::*;
use linfa_logistic::FittedLogisticRegression;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to read classifier artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode classifier artifact: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("artifact schema version {found} does not match expected version {expected}")]
    SchemaVersion { expected: u32, found: u32 },

    #[error("artifact columns do not match the feature contract: {0}")]
    Columns(String),

    #[error("encoded width {encoded} does not match the model's {model} coefficients")]
    Width { encoded: usize, model: usize },

    #[error("classifier produced no output")]
    EmptyOutput,

    #[error("classifier produced a non-finite probability")]
    NonFinite,

    #[error("classifier failed: {0}")]
    Inference(String),
}

/// Raw classifier answer for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScore {
    /// Whether the positive ("passed") class won.
    pub positive: bool,
    /// Confidence of the winning class, in [0.5, 1] for a binary model.
    pub confidence: f64,
}

pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, row: &FeatureRow) -> Result<ClassScore, ClassifierError>;
}

/// On-disk form of the trained model, as written by the training script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub columns: Vec<String>,
    pub preprocessor: Preprocessor,
    pub model: FittedLogisticRegression<f64, bool>,
}

impl ModelArtifact {
    /// Wraps a fitted model, stamped with the current feature contract.
    pub fn new(preprocessor: Preprocessor, model: FittedLogisticRegression<f64, bool>) -> Self {
        Self {
            schema_version: FEATURE_SCHEMA_VERSION,
            columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
            preprocessor,
            model,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ClassifierError> {
        let artifact: ModelArtifact = serde_json::from_str(raw)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let raw = fs::read_to_string(path).map_err(|source| ClassifierError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|source| ClassifierError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.schema_version != FEATURE_SCHEMA_VERSION {
            return Err(ClassifierError::SchemaVersion {
                expected: FEATURE_SCHEMA_VERSION,
                found: self.schema_version,
            });
        }
        if self.columns != COLUMNS {
            return Err(ClassifierError::Columns(format!(
                "artifact declares {:?}, expected {:?}",
                self.columns, COLUMNS
            )));
        }
        self.preprocessor
            .check_columns()
            .map_err(ClassifierError::Columns)?;

        let encoded = self.preprocessor.width();
        let model = self.model.params().len();
        if encoded != model {
            return Err(ClassifierError::Width { encoded, model });
        }
        Ok(())
    }
}

/// Logistic regression classifier backed by a validated artifact.
#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    artifact: ModelArtifact,
}

impl LogisticClassifier {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ClassifierError> {
        artifact.validate()?;
        Ok(Self { artifact })
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        Ok(Self {
            artifact: ModelArtifact::load(path)?,
        })
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }
}

impl Classifier for LogisticClassifier {
    fn name(&self) -> &str {
        "logistic-regression"
    }

    fn classify(&self, row: &FeatureRow) -> Result<ClassScore, ClassifierError> {
        let features = self.artifact.preprocessor.encode(std::slice::from_ref(row));
        if features.ncols() != self.artifact.model.params().len() {
            return Err(ClassifierError::Width {
                encoded: features.ncols(),
                model: self.artifact.model.params().len(),
            });
        }

        let prediction = self.artifact.model.predict(&features);
        let probabilities = self.artifact.model.predict_probabilities(&features);

        let positive = *prediction.get(0).ok_or(ClassifierError::EmptyOutput)?;
        let probability = *probabilities.get(0).ok_or(ClassifierError::EmptyOutput)?;
        if !probability.is_finite() {
            return Err(ClassifierError::NonFinite);
        }

        // Binary model: the winning class holds the larger share.
        let probability = probability.clamp(0.0, 1.0);
        Ok(ClassScore {
            positive,
            confidence: probability.max(1.0 - probability),
        })
    }
}
