//! # ac-dsp
//!
//! Spectral front end for the cloaking pipeline.
//!
//! - [`Stft`]: centered short-time Fourier transform and its weighted
//!   overlap-add inverse
//! - [`mel`]: Slaney-scale mel filterbank
//! - [`FeatureExtractor`]: waveform → log-mel tensor `(1, bands, frames)`,
//!   decibels relative to the tensor's own maximum
//! - [`spectrogram`]: segment-averaged PSD spectrogram used by the
//!   evaluation side for perceptual distance
//!
//! Feature tensors are normalized per call, so tensors from two different
//! waveforms are only magnitude-comparable through a distance that accounts
//! for that.

pub mod features;
pub mod mel;
pub mod spectrogram;
pub mod stft;

pub use features::{extract, power_to_db, FeatureExtractor, FeatureParams};
pub use spectrogram::{psd_spectrogram, SpectrogramParams, SpectrogramWindow};
pub use stft::Stft;

/// Power floor used before taking logarithms
pub const AMIN: f32 = 1e-10;
