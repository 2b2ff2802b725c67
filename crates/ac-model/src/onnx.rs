//! ONNX classifier via tract (pure Rust)

use std::path::Path;

use ac_core::{CloakError, CloakResult, FeatureTensor};
use serde::{Deserialize, Serialize};
use tract_core::prelude::{Tensor, TValue, TVec};
use tract_onnx::prelude::{DatumExt, Framework, InferenceModelExt};

use crate::model::Model;

/// ONNX loading options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnnxConfig {
    /// Pin the input shape before optimization (needed for graphs with
    /// symbolic dimensions)
    pub input_shape: Option<Vec<usize>>,

    /// Worker threads for numeric gradient probes
    pub num_threads: usize,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            input_shape: None,
            num_threads: num_cpus::get(),
        }
    }
}

impl OnnxConfig {
    pub fn with_input_shape(mut self, shape: Vec<usize>) -> Self {
        self.input_shape = Some(shape);
        self
    }

    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads.max(1);
        self
    }
}

type TractPlan = tract_onnx::prelude::SimplePlan<
    tract_onnx::prelude::TypedFact,
    Box<dyn tract_onnx::prelude::TypedOp>,
    tract_onnx::prelude::Graph<
        tract_onnx::prelude::TypedFact,
        Box<dyn tract_onnx::prelude::TypedOp>,
    >,
>;

/// Scores-only model backed by an ONNX graph
///
/// The feature tensor is fed as the first graph input and the first output
/// is flattened into the score vector.
pub struct OnnxModel {
    name: String,
    plan: TractPlan,
    num_classes: Option<usize>,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("name", &self.name)
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

impl OnnxModel {
    pub fn load<P: AsRef<Path>>(path: P, config: &OnnxConfig) -> CloakResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CloakError::FileNotFound(path.display().to_string()));
        }

        let load_err = |e: tract_onnx::prelude::TractError| CloakError::ModelLoad {
            reason: format!("{}: {}", path.display(), e),
        };

        let mut model = tract_onnx::onnx().model_for_path(path).map_err(load_err)?;
        if let Some(shape) = &config.input_shape {
            model = model
                .with_input_fact(0, f32::fact(shape.clone()).into())
                .map_err(load_err)?;
        }

        let plan = model
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        let num_classes: Option<usize> = plan
            .model()
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().map(|dims| dims.iter().product()));

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        log::info!(
            "Loaded ONNX model {} ({} classes)",
            path.display(),
            num_classes.map_or_else(|| "dynamic".to_string(), |n| n.to_string())
        );

        Ok(Self {
            name,
            plan,
            num_classes,
        })
    }
}

impl Model for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    fn scores(&self, features: &FeatureTensor) -> CloakResult<Vec<f32>> {
        let tensor = Tensor::from_shape(features.shape(), &features.to_vec())
            .map_err(|e| CloakError::Inference(format!("{}: {}", self.name, e)))?;
        let inputs: TVec<TValue> = std::iter::once(tensor.into()).collect();

        let outputs = self
            .plan
            .run(inputs)
            .map_err(|e| CloakError::Inference(format!("{}: {}", self.name, e)))?;

        let first = outputs
            .first()
            .ok_or_else(|| CloakError::Inference(format!("{}: no output from model", self.name)))?;

        let scores = first
            .as_slice::<f32>()
            .map_err(|e| CloakError::Inference(format!("{}: {}", self.name, e)))?;

        Ok(scores.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let result = OnnxModel::load("/no/such/model.onnx", &OnnxConfig::default());
        assert!(matches!(result, Err(CloakError::FileNotFound(_))));
    }

    #[test]
    fn test_garbage_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"definitely not protobuf").unwrap();
        assert!(matches!(
            OnnxModel::load(&path, &OnnxConfig::default()),
            Err(CloakError::ModelLoad { .. })
        ));
    }

    #[test]
    fn test_config_threads_floor() {
        assert_eq!(OnnxConfig::default().with_num_threads(0).num_threads, 1);
    }
}
