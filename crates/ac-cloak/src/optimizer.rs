//! Iterative perturbation optimizer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ac_core::{CloakError, CloakResult, FeatureTensor, LossTerms};
use serde::{Deserialize, Serialize};

use crate::config::{OptimizerConfig, UpdateRule};
use crate::objective::LossEvaluator;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Mean |gradient| fell below the tolerance
    Converged,
    /// Iteration budget spent
    Exhausted,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Converged => "converged",
            Termination::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-iteration progress, handed to observers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    pub loss: LossTerms,
    pub mean_abs_gradient: f64,
}

/// Result of an optimization run
#[derive(Debug, Clone)]
pub struct Optimized {
    pub perturbation: FeatureTensor,
    pub termination: Termination,
    /// Gradient steps taken
    pub iterations: usize,
}

impl Optimized {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Shared cancellation flag, polled once per iteration
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Gradient search over the perturbation
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    cancel: Option<CancelFlag>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> CloakResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn optimize(
        &self,
        initial: &FeatureTensor,
        original: &FeatureTensor,
        evaluator: &LossEvaluator,
    ) -> CloakResult<Optimized> {
        self.optimize_with_observer(initial, original, evaluator, |_| {})
    }

    /// Run the loop, calling `observer` after every step
    ///
    /// The perceptual term is weighted by [`OptimizerConfig::beta`], not by
    /// the evaluator's own weight.
    pub fn optimize_with_observer<F>(
        &self,
        initial: &FeatureTensor,
        original: &FeatureTensor,
        evaluator: &LossEvaluator,
        mut observer: F,
    ) -> CloakResult<Optimized>
    where
        F: FnMut(&IterationReport),
    {
        original.ensure_same_shape(initial)?;

        let cfg = &self.config;
        let mut perturbation = initial.clone();

        if cfg.max_iterations == 0 {
            return Ok(Optimized {
                perturbation,
                termination: Termination::Exhausted,
                iterations: 0,
            });
        }

        let mut velocity: Option<FeatureTensor> = None;

        for iteration in 0..cfg.max_iterations {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                log::info!("Optimization cancelled at iteration {}", iteration);
                return Err(CloakError::Cancelled {
                    iterations: iteration,
                });
            }

            let perturbed = original.add(&perturbation)?;
            let (loss, gradient) = evaluator
                .evaluate_with_gradient_weighted(&perturbed, original, cfg.beta)
                .map_err(|e| match e {
                    CloakError::NumericInstability { what, .. } => {
                        CloakError::NumericInstability { iteration, what }
                    }
                    other => CloakError::Optimization {
                        iteration,
                        source: Box::new(other),
                    },
                })?;

            if !loss.is_finite() {
                return Err(CloakError::NumericInstability {
                    iteration,
                    what: format!("loss {:?}", loss),
                });
            }
            if !gradient.is_finite() {
                return Err(CloakError::NumericInstability {
                    iteration,
                    what: "gradient contains NaN or infinity".into(),
                });
            }

            let mean_abs_gradient = gradient.mean_abs();

            let step = match cfg.update_rule {
                UpdateRule::GradientDescent => gradient,
                UpdateRule::Momentum { decay } => {
                    let v = match velocity.take() {
                        Some(v) => gradient.scaled_add(decay, &v)?,
                        None => gradient,
                    };
                    velocity = Some(v.clone());
                    v
                }
            };

            perturbation = perturbation.scaled_add(-cfg.learning_rate, &step)?;
            if cfg.clamp_perturbation {
                perturbation = perturbation.clamp(-cfg.epsilon, cfg.epsilon);
            }

            let report = IterationReport {
                iteration,
                loss,
                mean_abs_gradient,
            };
            observer(&report);

            log::debug!(
                "iter {:>4}: total {:.6} (adv {:.6}, perc {:.6}) |g| {:.6}",
                iteration,
                loss.total,
                loss.adversarial,
                loss.perceptual,
                mean_abs_gradient
            );

            if mean_abs_gradient < cfg.convergence_tolerance as f64 {
                log::info!("Converged after {} iterations", iteration + 1);
                return Ok(Optimized {
                    perturbation,
                    termination: Termination::Converged,
                    iterations: iteration + 1,
                });
            }
        }

        log::warn!(
            "Optimization exhausted {} iterations without converging",
            cfg.max_iterations
        );

        Ok(Optimized {
            perturbation,
            termination: Termination::Exhausted,
            iterations: cfg.max_iterations,
        })
    }
}
