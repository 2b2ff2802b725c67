//! Named model lookup in a directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ac_core::{CloakError, CloakResult};

use crate::finite_diff::FiniteDifference;
use crate::linear::LinearModel;
use crate::model::SharedModel;
use crate::onnx::{OnnxConfig, OnnxModel};

/// Directory of models addressed by file stem
///
/// `load("speech")` resolves `speech.json` (linear description) first, then
/// `speech.onnx`.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
    onnx: OnnxConfig,
    finite_difference: Option<f32>,
}

impl ModelStore {
    const EXTENSIONS: [&'static str; 2] = ["json", "onnx"];

    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            onnx: OnnxConfig::default(),
            finite_difference: None,
        }
    }

    pub fn with_onnx_config(mut self, config: OnnxConfig) -> Self {
        self.onnx = config;
        self
    }

    /// Wrap scores-only models with a central-difference gradient
    pub fn with_finite_difference(mut self, step: f32) -> Self {
        self.finite_difference = Some(step);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self, name: &str) -> CloakResult<SharedModel> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(CloakError::InvalidConfig(format!("invalid model name '{}'", name)));
        }

        let json = self.root.join(format!("{}.json", name));
        if json.is_file() {
            log::info!("Loading linear model {}", json.display());
            return Ok(Arc::new(LinearModel::load(&json)?));
        }

        let onnx = self.root.join(format!("{}.onnx", name));
        if onnx.is_file() {
            let model: SharedModel = Arc::new(OnnxModel::load(&onnx, &self.onnx)?);
            return match self.finite_difference {
                Some(step) => Ok(Arc::new(FiniteDifference::new(
                    model,
                    step,
                    self.onnx.num_threads,
                )?)),
                None => Ok(model),
            };
        }

        Err(CloakError::ModelNotFound {
            name: name.to_string(),
            store: self.root.display().to_string(),
        })
    }

    /// Sorted, de-duplicated model names
    pub fn list(&self) -> CloakResult<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| Self::EXTENSIONS.contains(&e))
                .unwrap_or(false);
            if !known || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ac_core::FeatureTensor;

    fn write_linear(dir: &Path, name: &str) {
        LinearModel::uniform(name, vec![1, 2, 2], &[0.0, 1.0], vec![0.1, 0.9])
            .unwrap()
            .save(dir.join(format!("{}.json", name)))
            .unwrap();
    }

    #[test]
    fn test_load_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write_linear(dir.path(), "speech");

        let store = ModelStore::new(dir.path());
        let model = store.load("speech").unwrap();
        assert_eq!(model.name(), "speech");
        let scores = model.scores(&FeatureTensor::zeros(&[1, 2, 2])).unwrap();
        assert_eq!(scores, vec![0.1, 0.9]);
    }

    #[test]
    fn test_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        match ModelStore::new(dir.path()).load("ghost") {
            Err(CloakError::ModelNotFound { name, .. }) => assert_eq!(name, "ghost"),
            other => panic!("expected ModelNotFound, got {:?}", other.map(|m| m.name().to_string())),
        }
    }

    #[test]
    fn test_rejects_path_names() {
        let store = ModelStore::new("/tmp");
        assert!(matches!(store.load("../etc"), Err(CloakError::InvalidConfig(_))));
    }

    #[test]
    fn test_list() {
        let dir = tempfile::tempdir().unwrap();
        write_linear(dir.path(), "b");
        write_linear(dir.path(), "a");
        std::fs::write(dir.path().join("a.onnx"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let names = ModelStore::new(dir.path()).list().unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_list_missing_dir() {
        assert!(ModelStore::new("/no/such/store").list().unwrap().is_empty());
    }
}
