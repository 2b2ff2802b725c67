//! Signed-gradient starting point for the optimizer

use ac_core::{argmax, CloakError, CloakResult, FeatureTensor};
use ac_model::Model;

use crate::objective::{finite_scores, AttackMode};

/// One fast-gradient-sign step of size `epsilon`
///
/// - untargeted: ascend `−max(scores)`, i.e. push the winning score down
/// - target label: descend `−score[target]`
/// - target features: descend `‖features − target‖₂`
///
/// Elements whose gradient is exactly zero stay at zero.
pub fn initialize(
    features: &FeatureTensor,
    model: &dyn Model,
    mode: &AttackMode,
    epsilon: f32,
) -> CloakResult<FeatureTensor> {
    if !(epsilon > 0.0 && epsilon.is_finite()) {
        return Err(CloakError::InvalidConfig(format!(
            "epsilon must be positive, got {}",
            epsilon
        )));
    }

    let perturbation = match mode {
        AttackMode::Untargeted => {
            let scores = finite_scores(model, features)?;
            let top = argmax(&scores).ok_or_else(|| {
                CloakError::Inference(format!("model '{}' produced no scores", model.name()))
            })?;
            // ∇(−max s) = −∇s_top
            let mut upstream = vec![0.0; scores.len()];
            upstream[top] = -1.0;
            let grad = model.backward(features, &upstream)?;
            grad.signum().scale(epsilon)
        }
        AttackMode::TargetLabel(label) => {
            let scores = finite_scores(model, features)?;
            if *label >= scores.len() {
                return Err(CloakError::InvalidConfig(format!(
                    "target label {} out of range for {} classes",
                    label,
                    scores.len()
                )));
            }
            let mut upstream = vec![0.0; scores.len()];
            upstream[*label] = -1.0;
            let grad = model.backward(features, &upstream)?;
            grad.signum().scale(-epsilon)
        }
        AttackMode::TargetFeatures(target) => {
            // ∇‖f − t‖ has the sign of f − t
            let diff = features.sub(target)?;
            diff.signum().scale(-epsilon)
        }
    };

    log::debug!(
        "Initialized {} perturbation: {} of {} elements active",
        mode.describe(),
        perturbation.iter().filter(|&&x| x != 0.0).count(),
        perturbation.len()
    );

    Ok(perturbation)
}
