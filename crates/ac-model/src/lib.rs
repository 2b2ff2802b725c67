//! # ac-model
//!
//! Classifier capability consumed by the cloaking core.
//!
//! A [`Model`] maps a feature tensor to per-class scores and, when it can,
//! pulls a score-space gradient back to feature space (a vector-Jacobian
//! product). Backends:
//!
//! - [`LinearModel`]: dense linear scorer with optional softmax, exact
//!   gradients, JSON description on disk
//! - [`OnnxModel`]: arbitrary ONNX graph via tract, scores only
//! - [`FiniteDifference`]: wraps any scores-only model with a numeric
//!   gradient
//!
//! [`ModelStore`] resolves model names against a directory.

mod finite_diff;
mod linear;
mod model;
mod onnx;
mod store;

pub use finite_diff::FiniteDifference;
pub use linear::{LinearModel, LinearModelSpec};
pub use model::{Model, SharedModel};
pub use onnx::{OnnxConfig, OnnxModel};
pub use store::ModelStore;
