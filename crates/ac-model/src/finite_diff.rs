//! Numeric gradients for scores-only models

use ac_core::{CloakError, CloakResult, FeatureTensor};
use rayon::prelude::*;

use crate::model::{Model, SharedModel};

/// Central-difference gradient adapter
///
/// Each feature element is probed at `x ± step`; probes run in parallel on a
/// dedicated pool. Cost is `2 · len` forward passes per backward call.
pub struct FiniteDifference {
    inner: SharedModel,
    step: f32,
    name: String,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for FiniteDifference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiniteDifference")
            .field("inner", &self.inner.name())
            .field("step", &self.step)
            .finish()
    }
}

impl FiniteDifference {
    pub fn new(inner: SharedModel, step: f32, num_threads: usize) -> CloakResult<Self> {
        if !(step > 0.0 && step.is_finite()) {
            return Err(CloakError::InvalidConfig(format!(
                "finite-difference step must be positive, got {}",
                step
            )));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .build()
            .map_err(|e| CloakError::InvalidConfig(format!("thread pool: {}", e)))?;

        let name = format!("{}+fd", inner.name());
        Ok(Self {
            inner,
            step,
            name,
            pool,
        })
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    fn probe(&self, shape: &[usize], base: &[f32], index: usize, delta: f32) -> CloakResult<Vec<f32>> {
        let mut values = base.to_vec();
        values[index] += delta;
        let probe = FeatureTensor::from_shape_vec(shape, values)?;
        self.inner.scores(&probe)
    }
}

impl Model for FiniteDifference {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_classes(&self) -> Option<usize> {
        self.inner.num_classes()
    }

    fn scores(&self, features: &FeatureTensor) -> CloakResult<Vec<f32>> {
        self.inner.scores(features)
    }

    fn backward(&self, features: &FeatureTensor, grad_scores: &[f32]) -> CloakResult<FeatureTensor> {
        let shape = features.shape().to_vec();
        let base = features.to_vec();
        let h = self.step;

        let grad: Vec<f32> = self.pool.install(|| {
            (0..base.len())
                .into_par_iter()
                .map(|i| {
                    let plus = self.probe(&shape, &base, i, h)?;
                    let minus = self.probe(&shape, &base, i, -h)?;
                    if plus.len() != grad_scores.len() {
                        return Err(CloakError::ShapeMismatch {
                            expected: vec![plus.len()],
                            got: vec![grad_scores.len()],
                        });
                    }
                    let directional: f32 = plus
                        .iter()
                        .zip(&minus)
                        .zip(grad_scores)
                        .map(|((p, m), u)| u * (p - m))
                        .sum();
                    Ok(directional / (2.0 * h))
                })
                .collect::<CloakResult<Vec<f32>>>()
        })?;

        FeatureTensor::from_shape_vec(&shape, grad)
    }

    fn supports_gradient(&self) -> bool {
        true
    }
}
