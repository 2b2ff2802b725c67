//! Putting a perturbation back onto features or audio

use ac_core::{CloakError, CloakResult, FeatureTensor, Waveform};
use ac_dsp::{FeatureExtractor, FeatureParams};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Final sample clamp to `[-1, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AmplitudeClamp {
    #[default]
    On,
    Off,
}

impl AmplitudeClamp {
    fn apply(self, samples: &mut [f32]) {
        if self == AmplitudeClamp::On {
            for s in samples.iter_mut() {
                *s = s.clamp(-1.0, 1.0);
            }
        }
    }
}

/// `features + perturbation`
pub fn apply_features(
    features: &FeatureTensor,
    perturbation: &FeatureTensor,
) -> CloakResult<FeatureTensor> {
    features.add(perturbation)
}

/// Sample-wise addition of a waveform-domain perturbation
///
/// `perturbation` is interleaved like the waveform's own samples.
pub fn apply_waveform(
    waveform: &Waveform,
    perturbation: &[f32],
    clamp: AmplitudeClamp,
) -> CloakResult<Waveform> {
    if perturbation.len() != waveform.samples().len() {
        return Err(CloakError::ShapeMismatch {
            expected: vec![waveform.samples().len()],
            got: vec![perturbation.len()],
        });
    }

    let mut samples: Vec<f32> = waveform
        .samples()
        .iter()
        .zip(perturbation)
        .map(|(x, p)| x + p)
        .collect();
    clamp.apply(&mut samples);
    waveform.with_samples(samples)
}

/// Map a log-mel perturbation onto the waveform
///
/// Every STFT bin takes the filter-weighted mean of the mel-band offsets of
/// its frame and is scaled by `10^(Δ/20)`. Bins outside every filter are
/// left untouched. All channels receive the same gains, and the output has
/// the input's length.
pub fn resynthesize(
    waveform: &Waveform,
    perturbation: &FeatureTensor,
    params: &FeatureParams,
    clamp: AmplitudeClamp,
) -> CloakResult<Waveform> {
    let extractor = FeatureExtractor::new(params.clone())?;
    let length = waveform.num_frames();

    let expected = extractor.feature_shape(length);
    if perturbation.shape() != expected.as_slice() {
        return Err(CloakError::ShapeMismatch {
            expected,
            got: perturbation.shape().to_vec(),
        });
    }

    let gains = bin_gains(&extractor, perturbation, waveform.sample_rate(), length)?;
    let stft = extractor.stft();

    let mut channels = Vec::with_capacity(waveform.channels());
    for ch in 0..waveform.channels() {
        let mut frames = stft.forward(&waveform.channel(ch))?;
        for (t, frame) in frames.iter_mut().enumerate() {
            for (k, bin) in frame.iter_mut().enumerate() {
                *bin *= gains[[k, t]];
            }
        }
        let mut samples = stft.inverse(&frames, length)?;
        clamp.apply(&mut samples);
        channels.push(samples);
    }

    log::debug!(
        "Resynthesized {} channel(s), {} samples, max |Δ| {:.4} dB",
        channels.len(),
        length,
        perturbation.max_abs()
    );

    Waveform::from_channels(&channels, waveform.sample_rate())
}

/// Per-bin amplitude gains, shape `(bins, frames)`
fn bin_gains(
    extractor: &FeatureExtractor,
    perturbation: &FeatureTensor,
    sample_rate: u32,
    length: usize,
) -> CloakResult<Array2<f32>> {
    let bands = extractor.params().num_bands;
    let frames = extractor.num_frames(length);

    let delta = Array2::from_shape_vec((bands, frames), perturbation.to_vec()).map_err(|_| {
        CloakError::ShapeMismatch {
            expected: vec![bands, frames],
            got: perturbation.shape().to_vec(),
        }
    })?;

    let filters = extractor.filterbank(sample_rate);
    let weight_sum = filters.sum_axis(ndarray::Axis(0));
    let mut bin_delta = filters.t().dot(&delta);

    for (mut row, &w) in bin_delta.outer_iter_mut().zip(weight_sum.iter()) {
        if w > 0.0 {
            row.mapv_inplace(|d| d / w);
        } else {
            row.fill(0.0);
        }
    }

    Ok(bin_delta.mapv(|d| 10f32.powf(d / 20.0)))
}
