//! # ac-eval
//!
//! Measures how well a cloak works and what it costs:
//!
//! - [`evaluate_cloak`]: does the model still recognize the original label?
//! - [`perceptual_distance`]: normalized PSD spectrogram distance between
//!   original and cloaked audio
//! - [`TechnicalReport`]: named measurements (spectral similarity, level
//!   deltas)
//! - [`CloakReport`]: per-run summary rendered as text, JSON or Markdown

mod evaluate;
mod perceptual;
mod report;
mod technical;

pub use evaluate::{evaluate_cloak, Evaluation};
pub use perceptual::{perceptual_distance, perceptual_distance_samples, perceptual_distance_with};
pub use report::{CloakReport, ReportFormat};
pub use technical::{conduct_technical_test, TechnicalReport};
