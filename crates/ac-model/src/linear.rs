//! Dense linear classifier with exact gradients

use std::path::Path;

use ac_core::{CloakError, CloakResult, FeatureTensor};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::model::Model;

/// On-disk description of a [`LinearModel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModelSpec {
    pub name: String,

    /// Expected feature tensor shape
    pub input_shape: Vec<usize>,

    /// One row per class, each with `input_shape.product()` weights
    pub weights: Vec<Vec<f32>>,

    /// One bias per class
    pub bias: Vec<f32>,

    /// Normalize scores into probabilities
    #[serde(default)]
    pub softmax: bool,
}

/// `scores = W · flatten(x) + b`, optionally followed by softmax
#[derive(Debug, Clone)]
pub struct LinearModel {
    name: String,
    input_shape: Vec<usize>,
    weights: Array2<f32>,
    bias: Array1<f32>,
    softmax: bool,
}

impl LinearModel {
    pub fn new(
        name: impl Into<String>,
        input_shape: Vec<usize>,
        weights: Array2<f32>,
        bias: Vec<f32>,
        softmax: bool,
    ) -> CloakResult<Self> {
        let name = name.into();
        let inputs: usize = input_shape.iter().product();
        let (classes, cols) = weights.dim();

        if classes == 0 {
            return Err(CloakError::ModelLoad {
                reason: format!("{}: model has no classes", name),
            });
        }
        if cols != inputs {
            return Err(CloakError::ModelLoad {
                reason: format!(
                    "{}: weight rows have {} entries, input shape {:?} needs {}",
                    name, cols, input_shape, inputs
                ),
            });
        }
        if bias.len() != classes {
            return Err(CloakError::ModelLoad {
                reason: format!("{}: {} biases for {} classes", name, bias.len(), classes),
            });
        }

        Ok(Self {
            name,
            input_shape,
            weights,
            bias: Array1::from(bias),
            softmax,
        })
    }

    /// Every class weighs all inputs equally: row `c` is `class_weights[c]`
    pub fn uniform(
        name: impl Into<String>,
        input_shape: Vec<usize>,
        class_weights: &[f32],
        bias: Vec<f32>,
    ) -> CloakResult<Self> {
        let inputs: usize = input_shape.iter().product();
        let weights = Array2::from_shape_fn((class_weights.len(), inputs), |(c, _)| class_weights[c]);
        Self::new(name, input_shape, weights, bias, false)
    }

    pub fn from_spec(spec: LinearModelSpec) -> CloakResult<Self> {
        let classes = spec.weights.len();
        let inputs: usize = spec.input_shape.iter().product();
        if let Some(row) = spec.weights.iter().position(|r| r.len() != inputs) {
            return Err(CloakError::ModelLoad {
                reason: format!(
                    "{}: weight row {} has {} entries, expected {}",
                    spec.name,
                    row,
                    spec.weights[row].len(),
                    inputs
                ),
            });
        }
        let flat: Vec<f32> = spec.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((classes, inputs), flat).map_err(|e| {
            CloakError::ModelLoad {
                reason: format!("{}: {}", spec.name, e),
            }
        })?;
        Self::new(spec.name, spec.input_shape, weights, spec.bias, spec.softmax)
    }

    pub fn to_spec(&self) -> LinearModelSpec {
        LinearModelSpec {
            name: self.name.clone(),
            input_shape: self.input_shape.clone(),
            weights: self.weights.outer_iter().map(|r| r.to_vec()).collect(),
            bias: self.bias.to_vec(),
            softmax: self.softmax,
        }
    }

    /// Load a JSON description
    pub fn load<P: AsRef<Path>>(path: P) -> CloakResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let spec: LinearModelSpec = serde_json::from_str(&text).map_err(|e| CloakError::ModelLoad {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_spec(spec)
    }

    /// Write the JSON description
    pub fn save<P: AsRef<Path>>(&self, path: P) -> CloakResult<()> {
        let json = serde_json::to_string(&self.to_spec())
            .map_err(|e| CloakError::InvalidConfig(format!("model serialization: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn check_input(&self, features: &FeatureTensor) -> CloakResult<()> {
        if features.shape() != self.input_shape.as_slice() {
            return Err(CloakError::ShapeMismatch {
                expected: self.input_shape.clone(),
                got: features.shape().to_vec(),
            });
        }
        Ok(())
    }

    fn logits(&self, features: &FeatureTensor) -> Array1<f32> {
        let x = Array1::from(features.to_vec());
        self.weights.dot(&x) + &self.bias
    }

    fn softmax(x: &[f32]) -> Vec<f32> {
        let max = x.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let exp: Vec<f32> = x.iter().map(|&v| (v - max).exp()).collect();
        let sum: f32 = exp.iter().sum();

        exp.iter().map(|&e| e / sum).collect()
    }
}

impl Model for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.weights.nrows())
    }

    fn scores(&self, features: &FeatureTensor) -> CloakResult<Vec<f32>> {
        self.check_input(features)?;
        let logits = self.logits(features).to_vec();
        Ok(if self.softmax {
            Self::softmax(&logits)
        } else {
            logits
        })
    }

    fn backward(&self, features: &FeatureTensor, grad_scores: &[f32]) -> CloakResult<FeatureTensor> {
        self.check_input(features)?;
        if grad_scores.len() != self.weights.nrows() {
            return Err(CloakError::ShapeMismatch {
                expected: vec![self.weights.nrows()],
                got: vec![grad_scores.len()],
            });
        }

        // Softmax Jacobian: ∂s/∂z = diag(s) − s sᵀ
        let upstream = if self.softmax {
            let s = Self::softmax(&self.logits(features).to_vec());
            let dot: f32 = s.iter().zip(grad_scores).map(|(a, b)| a * b).sum();
            s.iter()
                .zip(grad_scores)
                .map(|(&si, &ui)| si * (ui - dot))
                .collect()
        } else {
            grad_scores.to_vec()
        };

        let grad = self.weights.t().dot(&Array1::from(upstream));
        FeatureTensor::from_shape_vec(&self.input_shape, grad.to_vec())
    }

    fn supports_gradient(&self) -> bool {
        true
    }
}
