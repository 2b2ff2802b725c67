//! Model capability trait

use std::sync::Arc;

use ac_core::{argmax, CloakError, CloakResult, FeatureTensor, Label};

/// Read-only classifier
///
/// Implementations must be deterministic: the same features always produce
/// the same scores. Models are shared across cloaking jobs, hence
/// `Send + Sync`.
pub trait Model: Send + Sync {
    /// Identifier used in logs and reports
    fn name(&self) -> &str;

    /// Number of output classes, if known without running inference
    fn num_classes(&self) -> Option<usize>;

    /// Per-class scores for one feature tensor
    fn scores(&self, features: &FeatureTensor) -> CloakResult<Vec<f32>>;

    /// Vector-Jacobian product: `Jᵀ · grad_scores`, shaped like `features`
    fn backward(&self, features: &FeatureTensor, grad_scores: &[f32]) -> CloakResult<FeatureTensor> {
        let _ = (features, grad_scores);
        Err(CloakError::GradientUnavailable(format!(
            "model '{}' does not expose gradients",
            self.name()
        )))
    }

    /// Whether [`Model::backward`] is implemented
    fn supports_gradient(&self) -> bool {
        false
    }

    /// Arg-max label
    fn predict(&self, features: &FeatureTensor) -> CloakResult<Label> {
        let scores = self.scores(features)?;
        argmax(&scores).ok_or_else(|| {
            CloakError::Inference(format!("model '{}' produced no scores", self.name()))
        })
    }

    /// Gradient of a single class score w.r.t. the features
    fn class_gradient(&self, features: &FeatureTensor, class: Label) -> CloakResult<FeatureTensor> {
        let classes = match self.num_classes() {
            Some(n) => n,
            None => self.scores(features)?.len(),
        };
        if class >= classes {
            return Err(CloakError::InvalidConfig(format!(
                "class {} out of range for {} classes",
                class, classes
            )));
        }
        let mut one_hot = vec![0.0; classes];
        one_hot[class] = 1.0;
        self.backward(features, &one_hot)
    }
}

/// Shared handle used throughout the pipeline
pub type SharedModel = Arc<dyn Model>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant;

    impl Model for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn num_classes(&self) -> Option<usize> {
            Some(3)
        }

        fn scores(&self, _features: &FeatureTensor) -> CloakResult<Vec<f32>> {
            Ok(vec![0.2, 0.7, 0.1])
        }
    }

    #[test]
    fn test_default_backward_unavailable() {
        let model = Constant;
        let features = FeatureTensor::zeros(&[1, 2, 2]);
        assert!(!model.supports_gradient());
        assert!(matches!(
            model.backward(&features, &[1.0, 0.0, 0.0]),
            Err(CloakError::GradientUnavailable(_))
        ));
    }

    #[test]
    fn test_predict() {
        let features = FeatureTensor::zeros(&[1, 2, 2]);
        assert_eq!(Constant.predict(&features).unwrap(), 1);
    }

    #[test]
    fn test_class_gradient_range() {
        let features = FeatureTensor::zeros(&[1, 2, 2]);
        assert!(matches!(
            Constant.class_gradient(&features, 5),
            Err(CloakError::InvalidConfig(_))
        ));
    }
}
