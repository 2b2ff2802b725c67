//! Cloaking objective: adversarial term plus weighted perceptual term

use ac_core::{argmax, CloakError, CloakResult, FeatureTensor, Label, LossTerms};
use ac_model::{Model, SharedModel};
use serde::{Deserialize, Serialize};

/// What the perturbation is trying to achieve
#[derive(Debug, Clone, PartialEq)]
pub enum AttackMode {
    /// Lower the score of whatever class currently wins
    Untargeted,
    /// Raise the score of a chosen class
    TargetLabel(Label),
    /// Move the features towards a target tensor
    TargetFeatures(FeatureTensor),
}

impl AttackMode {
    pub fn is_targeted(&self) -> bool {
        !matches!(self, AttackMode::Untargeted)
    }

    /// Short human-readable description for reports
    pub fn describe(&self) -> String {
        match self {
            AttackMode::Untargeted => "untargeted".into(),
            AttackMode::TargetLabel(label) => format!("target label {}", label),
            AttackMode::TargetFeatures(target) => format!("target features {:?}", target.shape()),
        }
    }
}

/// Distance between perturbed and original features
pub trait PerceptualDistance: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn distance(&self, perturbed: &FeatureTensor, original: &FeatureTensor) -> CloakResult<f64>;

    /// Gradient of [`PerceptualDistance::distance`] w.r.t. `perturbed`
    fn gradient(&self, perturbed: &FeatureTensor, original: &FeatureTensor) -> CloakResult<FeatureTensor>;
}

/// `‖perturbed − original‖₂`
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl PerceptualDistance for EuclideanDistance {
    fn name(&self) -> &str {
        "euclidean"
    }

    fn distance(&self, perturbed: &FeatureTensor, original: &FeatureTensor) -> CloakResult<f64> {
        Ok(perturbed.sub(original)?.l2_norm())
    }

    fn gradient(&self, perturbed: &FeatureTensor, original: &FeatureTensor) -> CloakResult<FeatureTensor> {
        let diff = perturbed.sub(original)?;
        Ok(unit_or_zero(diff))
    }
}

/// `mean((perturbed − original)²)`
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredDistance;

impl PerceptualDistance for MeanSquaredDistance {
    fn name(&self) -> &str {
        "mean-squared"
    }

    fn distance(&self, perturbed: &FeatureTensor, original: &FeatureTensor) -> CloakResult<f64> {
        let diff = perturbed.sub(original)?;
        if diff.is_empty() {
            return Ok(0.0);
        }
        Ok(diff.sum_squares() / diff.len() as f64)
    }

    fn gradient(&self, perturbed: &FeatureTensor, original: &FeatureTensor) -> CloakResult<FeatureTensor> {
        let diff = perturbed.sub(original)?;
        let scale = 2.0 / diff.len().max(1) as f32;
        Ok(diff.scale(scale))
    }
}

/// Serializable choice of perceptual distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PerceptualLoss {
    #[default]
    Euclidean,
    MeanSquared,
}

impl PerceptualLoss {
    pub fn build(self) -> Box<dyn PerceptualDistance> {
        match self {
            PerceptualLoss::Euclidean => Box::new(EuclideanDistance),
            PerceptualLoss::MeanSquared => Box::new(MeanSquaredDistance),
        }
    }
}

/// `v / ‖v‖`, with the zero subgradient at `v = 0`
fn unit_or_zero(v: FeatureTensor) -> FeatureTensor {
    let norm = v.l2_norm();
    if norm > 0.0 {
        v.scale((1.0 / norm) as f32)
    } else {
        v.zeros_like()
    }
}

/// Model scores, rejecting NaN or infinite outputs
pub(crate) fn finite_scores(model: &dyn Model, features: &FeatureTensor) -> CloakResult<Vec<f32>> {
    let scores = model.scores(features)?;
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(CloakError::NumericInstability {
            iteration: 0,
            what: format!("model '{}' produced score {}", model.name(), bad),
        });
    }
    Ok(scores)
}

/// Computes [`LossTerms`] and their gradient for a perturbed tensor
///
/// The adversarial term is the quantity the optimizer minimizes:
/// - untargeted: the winning class score (`+max`, so descending it lowers
///   the top class; the initializer's ascent direction on `−max` is the same)
/// - target label: the negated target score
/// - target features: distance to the target
pub struct LossEvaluator {
    model: SharedModel,
    perceptual: Box<dyn PerceptualDistance>,
    mode: AttackMode,
    beta: f32,
}

impl std::fmt::Debug for LossEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LossEvaluator")
            .field("model", &self.model.name())
            .field("perceptual", &self.perceptual.name())
            .field("mode", &self.mode.describe())
            .field("beta", &self.beta)
            .finish()
    }
}

impl LossEvaluator {
    pub fn new(
        model: SharedModel,
        perceptual: Box<dyn PerceptualDistance>,
        mode: AttackMode,
        beta: f32,
    ) -> CloakResult<Self> {
        if !(beta >= 0.0 && beta.is_finite()) {
            return Err(CloakError::InvalidConfig(format!(
                "beta must be non-negative, got {}",
                beta
            )));
        }
        if let (AttackMode::TargetLabel(label), Some(classes)) = (&mode, model.num_classes()) {
            if *label >= classes {
                return Err(CloakError::InvalidConfig(format!(
                    "target label {} out of range for {} classes",
                    label, classes
                )));
            }
        }
        Ok(Self {
            model,
            perceptual,
            mode,
            beta,
        })
    }

    pub fn mode(&self) -> &AttackMode {
        &self.mode
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    /// Loss terms only
    pub fn evaluate(&self, perturbed: &FeatureTensor, original: &FeatureTensor) -> CloakResult<LossTerms> {
        let adversarial = self.adversarial(perturbed, false)?.0;
        let perceptual = self.perceptual.distance(perturbed, original)?;
        Ok(LossTerms::new(adversarial, perceptual, self.beta as f64))
    }

    /// Loss terms and `∂total/∂perturbed`
    ///
    /// Since `perturbed = original + p`, this is also the gradient w.r.t. the
    /// perturbation.
    pub fn evaluate_with_gradient(
        &self,
        perturbed: &FeatureTensor,
        original: &FeatureTensor,
    ) -> CloakResult<(LossTerms, FeatureTensor)> {
        self.evaluate_with_gradient_weighted(perturbed, original, self.beta)
    }

    /// [`LossEvaluator::evaluate_with_gradient`] with an explicit perceptual weight
    pub fn evaluate_with_gradient_weighted(
        &self,
        perturbed: &FeatureTensor,
        original: &FeatureTensor,
        beta: f32,
    ) -> CloakResult<(LossTerms, FeatureTensor)> {
        if !(beta >= 0.0 && beta.is_finite()) {
            return Err(CloakError::InvalidConfig(format!(
                "beta must be non-negative, got {}",
                beta
            )));
        }
        let (adversarial, adv_grad) = self.adversarial(perturbed, true)?;
        let adv_grad = adv_grad.ok_or_else(|| {
            CloakError::GradientUnavailable("adversarial gradient was not computed".into())
        })?;

        let perceptual = self.perceptual.distance(perturbed, original)?;
        let perc_grad = self.perceptual.gradient(perturbed, original)?;

        let terms = LossTerms::new(adversarial, perceptual, beta as f64);
        let gradient = adv_grad.scaled_add(beta, &perc_grad)?;
        Ok((terms, gradient))
    }

    fn adversarial(
        &self,
        perturbed: &FeatureTensor,
        with_gradient: bool,
    ) -> CloakResult<(f64, Option<FeatureTensor>)> {
        match &self.mode {
            AttackMode::Untargeted => {
                let scores = finite_scores(self.model.as_ref(), perturbed)?;
                let top = argmax(&scores).ok_or_else(|| {
                    CloakError::Inference(format!("model '{}' produced no scores", self.model.name()))
                })?;
                let grad = if with_gradient {
                    Some(self.model.class_gradient(perturbed, top)?)
                } else {
                    None
                };
                Ok((scores[top] as f64, grad))
            }
            AttackMode::TargetLabel(label) => {
                let scores = finite_scores(self.model.as_ref(), perturbed)?;
                let score = scores.get(*label).copied().ok_or_else(|| {
                    CloakError::InvalidConfig(format!(
                        "target label {} out of range for {} classes",
                        label,
                        scores.len()
                    ))
                })?;
                let grad = if with_gradient {
                    Some(self.model.class_gradient(perturbed, *label)?.scale(-1.0))
                } else {
                    None
                };
                Ok((-(score as f64), grad))
            }
            AttackMode::TargetFeatures(target) => {
                let diff = perturbed.sub(target)?;
                let distance = diff.l2_norm();
                let grad = with_gradient.then(|| unit_or_zero(diff));
                Ok((distance, grad))
            }
        }
    }
}
