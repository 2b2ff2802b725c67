//! # ac-cloak
//!
//! Perturbation search against a classifier.
//!
//! ## Flow
//!
//! 1. [`initialize`]: one signed-gradient step of size `epsilon`
//! 2. [`Optimizer`]: iterative descent on [`LossEvaluator`]'s
//!    `adversarial + beta * perceptual` objective, clamped to `epsilon`
//! 3. [`apply_features`] / [`resynthesize`]: put the perturbation back onto
//!    features or onto the waveform
//!
//! [`Cloaker`] runs the whole chain for one input; [`BatchCloaker`] runs
//! many inputs on a rayon pool.
//!
//! ```rust,ignore
//! use ac_cloak::{CloakConfig, Cloaker};
//! use ac_model::ModelStore;
//!
//! let model = ModelStore::new("models").load("speaker-id")?;
//! let cloaker = Cloaker::new(model, CloakConfig::default())?;
//! let outcome = cloaker.cloak_file("voice.wav")?;
//! println!("evaded: {}", outcome.evaluation.all_evaded());
//! ```

mod apply;
mod config;
mod initializer;
mod job;
mod objective;
mod optimizer;
mod pipeline;

pub use apply::{apply_features, apply_waveform, resynthesize, AmplitudeClamp};
pub use config::{AttackTarget, CloakConfig, OptimizerConfig, UpdateRule};
pub use initializer::initialize;
pub use job::{BatchCloaker, CloakJob, JobId, JobResult, JobStatus};
pub use objective::{
    AttackMode, EuclideanDistance, LossEvaluator, MeanSquaredDistance, PerceptualDistance,
    PerceptualLoss,
};
pub use optimizer::{CancelFlag, IterationReport, Optimized, Optimizer, Termination};
pub use pipeline::{CloakOutcome, Cloaker};

pub use ac_core::LossTerms;
