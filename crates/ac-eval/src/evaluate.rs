//! Model-side evaluation

use ac_core::{argmax, CloakError, CloakResult, FeatureTensor, Label};
use ac_model::Model;
use serde::{Deserialize, Serialize};

/// Outcome of running the model over cloaked samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Fraction of samples whose predicted label differs from the original
    pub success_rate: f64,

    /// Raw scores, one vector per sample
    pub model_output: Vec<Vec<f32>>,

    pub predicted_labels: Vec<Label>,
}

impl Evaluation {
    /// True when every sample evaded the original label
    pub fn all_evaded(&self) -> bool {
        self.success_rate >= 1.0
    }
}

/// Classify each sample and count how many escape `original_label`
pub fn evaluate_cloak(
    samples: &[FeatureTensor],
    model: &dyn Model,
    original_label: Label,
) -> CloakResult<Evaluation> {
    if samples.is_empty() {
        return Err(CloakError::InvalidAudio("no samples to evaluate".into()));
    }

    let mut model_output = Vec::with_capacity(samples.len());
    let mut predicted_labels = Vec::with_capacity(samples.len());

    for sample in samples {
        let scores = model.scores(sample)?;
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(CloakError::NumericInstability {
                iteration: 0,
                what: format!("model '{}' produced non-finite scores", model.name()),
            });
        }
        let label = argmax(&scores).ok_or_else(|| {
            CloakError::Inference(format!("model '{}' produced no scores", model.name()))
        })?;
        predicted_labels.push(label);
        model_output.push(scores);
    }

    let evaded = predicted_labels.iter().filter(|&&l| l != original_label).count();
    let success_rate = evaded as f64 / samples.len() as f64;

    log::debug!(
        "Evaluated {} samples against '{}': success rate {:.3}",
        samples.len(),
        model.name(),
        success_rate
    );

    Ok(Evaluation {
        success_rate,
        model_output,
        predicted_labels,
    })
}
