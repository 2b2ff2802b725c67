//! Spectrogram-based perceptual distance

use ac_core::{CloakError, CloakResult, Waveform};
use ac_dsp::{psd_spectrogram, SpectrogramParams};
use ndarray::Array2;

/// Distance between two waveforms with default spectrogram parameters
///
/// Each PSD spectrogram is divided by its own maximum before taking the
/// Frobenius norm of the difference, so overall level is ignored.
pub fn perceptual_distance(original: &Waveform, cloaked: &Waveform) -> CloakResult<f64> {
    perceptual_distance_with(original, cloaked, &SpectrogramParams::default())
}

pub fn perceptual_distance_with(
    original: &Waveform,
    cloaked: &Waveform,
    params: &SpectrogramParams,
) -> CloakResult<f64> {
    if original.sample_rate() != cloaked.sample_rate() {
        return Err(CloakError::InvalidAudio(format!(
            "sample rates differ: {} Hz vs {} Hz",
            original.sample_rate(),
            cloaked.sample_rate()
        )));
    }
    distance(
        &original.mono_samples(),
        &cloaked.mono_samples(),
        original.sample_rate(),
        params,
    )
}

/// Distance between two mono sample buffers at a shared rate
pub fn perceptual_distance_samples(original: &[f32], cloaked: &[f32], sample_rate: u32) -> CloakResult<f64> {
    distance(original, cloaked, sample_rate, &SpectrogramParams::default())
}

fn distance(original: &[f32], cloaked: &[f32], sample_rate: u32, params: &SpectrogramParams) -> CloakResult<f64> {
    if original.len() != cloaked.len() {
        return Err(CloakError::ShapeMismatch {
            expected: vec![original.len()],
            got: vec![cloaked.len()],
        });
    }

    let a = normalize_by_max(psd_spectrogram(original, sample_rate as f64, params)?);
    let b = normalize_by_max(psd_spectrogram(cloaked, sample_rate as f64, params)?);

    let sum_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    Ok(sum_sq.sqrt())
}

/// Divide by the maximum; silent spectrograms stay as they are
fn normalize_by_max(spec: Array2<f64>) -> Array2<f64> {
    let max = spec.iter().fold(0.0f64, |m, &v| m.max(v));
    if max > 0.0 { spec / max } else { spec }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 22050.0).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_identical_is_zero() {
        let wf = Waveform::mono(tone(440.0, 8192), 22050).unwrap();
        assert_eq!(perceptual_distance(&wf, &wf).unwrap(), 0.0);
    }

    #[test]
    fn test_level_invariant() {
        let loud = tone(440.0, 8192);
        let quiet: Vec<f32> = loud.iter().map(|s| s * 0.25).collect();
        let d = perceptual_distance_samples(&loud, &quiet, 22050).unwrap();
        assert_relative_eq!(d, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_different_content_is_far() {
        let d_near = perceptual_distance_samples(&tone(440.0, 8192), &tone(445.0, 8192), 22050).unwrap();
        let d_far = perceptual_distance_samples(&tone(440.0, 8192), &tone(3000.0, 8192), 22050).unwrap();
        assert!(d_far > d_near);
    }

    #[test]
    fn test_silence_left_unscaled() {
        let silent = vec![0.0f32; 4096];
        assert_eq!(perceptual_distance_samples(&silent, &silent, 22050).unwrap(), 0.0);
    }

    #[test]
    fn test_mismatches() {
        let a = Waveform::mono(tone(440.0, 1000), 22050).unwrap();
        let b = Waveform::mono(tone(440.0, 1000), 44100).unwrap();
        assert!(matches!(
            perceptual_distance(&a, &b),
            Err(CloakError::InvalidAudio(_))
        ));

        let c = Waveform::mono(tone(440.0, 900), 22050).unwrap();
        assert!(matches!(
            perceptual_distance(&a, &c),
            Err(CloakError::ShapeMismatch { .. })
        ));
    }
}
