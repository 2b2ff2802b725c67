//! Power spectral density spectrogram
//!
//! Segmented periodogram used for perceptual comparisons: constant detrend,
//! one-sided density scaling, segments shrink to the signal length for
//! short inputs.

use ac_core::{CloakError, CloakResult};
use ndarray::Array2;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Segment taper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpectrogramWindow {
    /// Tapered cosine with the given taper fraction
    Tukey(f64),
    Hann,
}

impl Default for SpectrogramWindow {
    fn default() -> Self {
        SpectrogramWindow::Tukey(0.25)
    }
}

impl SpectrogramWindow {
    /// Periodic window of length `len`
    pub fn coefficients(&self, len: usize) -> Vec<f64> {
        if len <= 1 {
            return vec![1.0; len];
        }
        // Periodic = symmetric of len + 1 with the last point dropped
        let mut w = match *self {
            SpectrogramWindow::Tukey(alpha) => tukey_symmetric(len + 1, alpha),
            SpectrogramWindow::Hann => tukey_symmetric(len + 1, 1.0),
        };
        w.truncate(len);
        w
    }
}

fn tukey_symmetric(m: usize, alpha: f64) -> Vec<f64> {
    if m <= 1 || alpha <= 0.0 {
        return vec![1.0; m];
    }
    let alpha = alpha.min(1.0);
    let denom = (m - 1) as f64;
    let width = (alpha * denom / 2.0).floor() as usize;

    (0..m)
        .map(|n| {
            let x = n as f64;
            if n <= width {
                0.5 * (1.0 + (std::f64::consts::PI * (-1.0 + 2.0 * x / alpha / denom)).cos())
            } else if n >= m - width - 1 {
                0.5 * (1.0
                    + (std::f64::consts::PI * (-2.0 / alpha + 1.0 + 2.0 * x / alpha / denom)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

/// Spectrogram parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrogramParams {
    /// Samples per segment
    pub segment_len: usize,

    /// Overlap between segments, None = segment / 8
    pub overlap: Option<usize>,

    pub window: SpectrogramWindow,

    /// Subtract each segment's mean before windowing
    pub detrend: bool,
}

impl Default for SpectrogramParams {
    fn default() -> Self {
        Self {
            segment_len: 256,
            overlap: None,
            window: SpectrogramWindow::default(),
            detrend: true,
        }
    }
}

impl SpectrogramParams {
    pub fn with_segment_len(mut self, len: usize) -> Self {
        self.segment_len = len;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = Some(overlap);
        self
    }

    pub fn with_window(mut self, window: SpectrogramWindow) -> Self {
        self.window = window;
        self
    }
}

/// PSD spectrogram, shape `(segment / 2 + 1, segments)`
pub fn psd_spectrogram(
    samples: &[f32],
    sample_rate: f64,
    params: &SpectrogramParams,
) -> CloakResult<Array2<f64>> {
    if samples.is_empty() {
        return Err(CloakError::InvalidAudio("cannot compute spectrogram of empty signal".into()));
    }
    if sample_rate <= 0.0 {
        return Err(CloakError::InvalidAudio("sample rate must be positive".into()));
    }
    if params.segment_len == 0 {
        return Err(CloakError::InvalidConfig("segment_len must be positive".into()));
    }

    let seg = params.segment_len.min(samples.len());
    let overlap = params.overlap.unwrap_or(seg / 8).min(seg.saturating_sub(1));
    let step = seg - overlap;
    let num_segments = (samples.len() - overlap) / step;
    let num_bins = seg / 2 + 1;

    let window = params.window.coefficients(seg);
    let scale = 1.0 / (sample_rate * window.iter().map(|w| w * w).sum::<f64>());

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(seg);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let mut scratch = fft.make_scratch_vec();

    let mut psd = Array2::<f64>::zeros((num_bins, num_segments));

    for s in 0..num_segments {
        let segment = &samples[s * step..s * step + seg];
        let mean = if params.detrend {
            segment.iter().map(|&x| x as f64).sum::<f64>() / seg as f64
        } else {
            0.0
        };
        for ((slot, &x), &w) in input.iter_mut().zip(segment).zip(&window) {
            *slot = (x as f64 - mean) * w;
        }

        fft.process_with_scratch(&mut input, &mut spectrum, &mut scratch)
            .map_err(|e| CloakError::InvalidAudio(format!("FFT failed: {}", e)))?;

        for (k, bin) in spectrum.iter().enumerate() {
            let mut p = bin.norm_sqr() * scale;
            // One-sided: fold negative frequencies, DC and Nyquist excluded
            let is_nyquist = seg % 2 == 0 && k == num_bins - 1;
            if k != 0 && !is_nyquist {
                p *= 2.0;
            }
            psd[[k, s]] = p;
        }
    }

    Ok(psd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_shape() {
        let samples = vec![0.1f32; 22050];
        let psd = psd_spectrogram(&samples, 22050.0, &SpectrogramParams::default()).unwrap();
        // (22050 - 32) / 224 = 98 segments
        assert_eq!(psd.dim(), (129, 98));
    }

    #[test]
    fn test_short_signal_shrinks_segment() {
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 * 0.3).sin()).collect();
        let psd = psd_spectrogram(&samples, 8000.0, &SpectrogramParams::default()).unwrap();
        assert_eq!(psd.dim(), (51, 1));
    }

    #[test]
    fn test_constant_detrended_to_zero() {
        let psd = psd_spectrogram(&[0.7; 1024], 1000.0, &SpectrogramParams::default()).unwrap();
        assert!(psd.iter().all(|&p| p.abs() < 1e-12));
    }

    #[test]
    fn test_tone_peak_bin() {
        // 1 kHz at 8 kHz with 256-point segments -> bin 32
        let samples: Vec<f32> = (0..4096)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 8000.0).sin())
            .collect();
        let psd = psd_spectrogram(&samples, 8000.0, &SpectrogramParams::default()).unwrap();
        let col = psd.column(3);
        let peak = (0..col.len()).max_by(|&a, &b| col[a].total_cmp(&col[b])).unwrap();
        assert_eq!(peak, 32);
    }

    #[test]
    fn test_window_shapes() {
        let w = SpectrogramWindow::Tukey(0.25).coefficients(256);
        assert_eq!(w.len(), 256);
        assert_relative_eq!(w[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(w[128], 1.0, epsilon = 1e-12);

        let hann = SpectrogramWindow::Hann.coefficients(8);
        assert_relative_eq!(hann[4], 1.0, epsilon = 1e-12);
        assert_relative_eq!(hann[2], 0.5, epsilon = 1e-12);

        assert_eq!(SpectrogramWindow::Tukey(0.25).coefficients(1), vec![1.0]);
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            psd_spectrogram(&[], 22050.0, &SpectrogramParams::default()),
            Err(CloakError::InvalidAudio(_))
        ));
    }
}
