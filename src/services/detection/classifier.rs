// Chunk Classifier
// Fused feature vector -> probability that a chunk is machine-generated.
// Class index convention: 0 = Human, 1 = AI.

use super::fusion::FusedVector;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

const AI_CLASS_INDEX: usize = 1;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Failed to load classifier: {0}")]
    Load(String),
    #[error("Feature dimension mismatch: classifier expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Invalid classifier output: {0}")]
    InvalidOutput(String),
}

/// Raw classifier output. Either shape is normalized to a scalar AI-probability by
/// [`ClassifierOutput::ai_probability`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutput {
    Probability(f64),
    Distribution(Vec<f64>),
}

impl ClassifierOutput {
    pub fn ai_probability(&self) -> Result<f64, ClassifierError> {
        let p = match self {
            Self::Probability(p) => *p,
            Self::Distribution(probs) => {
                if probs.len() <= AI_CLASS_INDEX {
                    return Err(ClassifierError::InvalidOutput(format!(
                        "expected at least 2 classes, got {}",
                        probs.len()
                    )));
                }
                probs[AI_CLASS_INDEX]
            }
        };
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ClassifierError::InvalidOutput(format!(
                "AI probability {} outside [0, 1]",
                p
            )));
        }
        Ok(p)
    }
}

pub trait ChunkClassifier: Send + Sync {
    fn predict(&self, features: &FusedVector) -> Result<ClassifierOutput, ClassifierError>;

    /// Fused vector length the classifier was calibrated against.
    fn input_dim(&self) -> usize;

    fn model_id(&self) -> &str;

    /// Dimension check, prediction, and output normalization in one call.
    fn predict_probability(&self, features: &FusedVector) -> Result<f64, ClassifierError> {
        if features.len() != self.input_dim() {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.input_dim(),
                actual: features.len(),
            });
        }
        self.predict(features)?.ai_probability()
    }
}

// ============================================================================
// Logistic regression loaded from exported JSON weights
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct LogisticWeights {
    #[serde(default = "default_model_id", alias = "modelId")]
    model_id: String,
    coefficients: Vec<f64>,
    intercept: f64,
    #[serde(default)]
    scaler: Option<StandardScaler>,
}

fn default_model_id() -> String {
    "hybrid-logreg".to_string()
}

/// Binary logistic regression over the fused vector, with optional standardization.
#[derive(Debug, Clone)]
pub struct LogisticRegressionClassifier {
    model_id: String,
    coefficients: Vec<f64>,
    intercept: f64,
    scaler: Option<StandardScaler>,
}

impl LogisticRegressionClassifier {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Result<Self, ClassifierError> {
        Self::from_weights(LogisticWeights {
            model_id: default_model_id(),
            coefficients,
            intercept,
            scaler: None,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let weights: LogisticWeights = serde_json::from_str(json)
            .map_err(|e| ClassifierError::Load(format!("invalid weights JSON: {}", e)))?;
        Self::from_weights(weights)
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ClassifierError::Load(format!("{}: {}", path.display(), e)))?;
        let classifier = Self::from_json(&content)?;
        info!(
            "[CLASSIFIER] Loaded {} from {} (input_dim={})",
            classifier.model_id,
            path.display(),
            classifier.input_dim()
        );
        Ok(classifier)
    }

    fn from_weights(weights: LogisticWeights) -> Result<Self, ClassifierError> {
        if weights.coefficients.is_empty() {
            return Err(ClassifierError::Load("no coefficients".to_string()));
        }
        if weights.coefficients.iter().any(|w| !w.is_finite()) || !weights.intercept.is_finite() {
            return Err(ClassifierError::Load("non-finite weights".to_string()));
        }
        if let Some(ref scaler) = weights.scaler {
            let dim = weights.coefficients.len();
            if scaler.mean.len() != dim || scaler.scale.len() != dim {
                return Err(ClassifierError::Load(format!(
                    "scaler length (mean={}, scale={}) does not match {} coefficients",
                    scaler.mean.len(),
                    scaler.scale.len(),
                    dim
                )));
            }
        }
        Ok(Self {
            model_id: weights.model_id,
            coefficients: weights.coefficients,
            intercept: weights.intercept,
            scaler: weights.scaler,
        })
    }

    fn decision_function(&self, x: &[f64]) -> f64 {
        let dot: f64 = match &self.scaler {
            Some(scaler) => x
                .iter()
                .zip(&self.coefficients)
                .zip(scaler.mean.iter().zip(&scaler.scale))
                .map(|((xi, w), (mean, scale))| {
                    // zero variance features are only centered
                    let s = if *scale == 0.0 { 1.0 } else { *scale };
                    w * (xi - mean) / s
                })
                .sum(),
            None => x.iter().zip(&self.coefficients).map(|(xi, w)| xi * w).sum(),
        };
        dot + self.intercept
    }
}

impl ChunkClassifier for LogisticRegressionClassifier {
    fn predict(&self, features: &FusedVector) -> Result<ClassifierOutput, ClassifierError> {
        let p = sigmoid(self.decision_function(features.as_slice()));
        Ok(ClassifierOutput::Distribution(vec![1.0 - p, p]))
    }

    fn input_dim(&self) -> usize {
        self.coefficients.len()
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
