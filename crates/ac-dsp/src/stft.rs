//! Short-time Fourier transform

use std::sync::Arc;

use ac_core::{CloakError, CloakResult};
use ndarray::Array2;
use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

/// Centered STFT with a periodic Hann window
///
/// The signal is zero-padded by `fft_size / 2` on both sides, so frame `t`
/// is centered on sample `t * hop` and there are `1 + len / hop` frames.
pub struct Stft {
    fft_size: usize,
    hop_size: usize,
    window: Vec<f32>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft")
            .field("fft_size", &self.fft_size)
            .field("hop_size", &self.hop_size)
            .finish()
    }
}

impl Stft {
    pub fn new(fft_size: usize, hop_size: usize) -> CloakResult<Self> {
        if fft_size < 2 {
            return Err(CloakError::InvalidConfig(format!(
                "FFT window must be at least 2 samples, got {}",
                fft_size
            )));
        }
        if hop_size == 0 {
            return Err(CloakError::InvalidConfig("hop length must be positive".into()));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let window = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Ok(Self {
            fft_size,
            hop_size,
            window,
            forward,
            inverse,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Frame count for a signal of `len` samples
    pub fn num_frames(&self, len: usize) -> usize {
        1 + len / self.hop_size
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Complex spectra, one vector of `num_bins` per frame
    pub fn forward(&self, samples: &[f32]) -> CloakResult<Vec<Vec<Complex32>>> {
        let pad = self.fft_size / 2;
        let num_frames = self.num_frames(samples.len());

        let mut input = vec![0.0f32; self.fft_size];
        let mut scratch = self.forward.make_scratch_vec();
        let mut frames = Vec::with_capacity(num_frames);

        for t in 0..num_frames {
            // Frame start in padded coordinates is t * hop
            let start = (t * self.hop_size) as isize - pad as isize;
            for (i, slot) in input.iter_mut().enumerate() {
                let idx = start + i as isize;
                let sample = if idx >= 0 && (idx as usize) < samples.len() {
                    samples[idx as usize]
                } else {
                    0.0
                };
                *slot = sample * self.window[i];
            }

            let mut spectrum = self.forward.make_output_vec();
            self.forward
                .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .map_err(|e| CloakError::InvalidAudio(format!("FFT failed: {}", e)))?;
            frames.push(spectrum);
        }

        Ok(frames)
    }

    /// Power spectrogram `|X|²`, shape `(num_bins, num_frames)`
    pub fn power(&self, samples: &[f32]) -> CloakResult<Array2<f32>> {
        let frames = self.forward(samples)?;
        let mut power = Array2::<f32>::zeros((self.num_bins(), frames.len()));
        for (t, frame) in frames.iter().enumerate() {
            for (k, bin) in frame.iter().enumerate() {
                power[[k, t]] = bin.norm_sqr();
            }
        }
        Ok(power)
    }

    /// Weighted overlap-add inverse of [`Stft::forward`]
    ///
    /// Returns exactly `length` samples, padding removed.
    pub fn inverse(&self, frames: &[Vec<Complex32>], length: usize) -> CloakResult<Vec<f32>> {
        let pad = self.fft_size / 2;
        let total = self.fft_size + self.hop_size * frames.len().saturating_sub(1);
        let mut output = vec![0.0f32; total.max(length + 2 * pad)];
        let mut window_sum = vec![0.0f32; output.len()];

        let mut scratch = self.inverse.make_scratch_vec();
        let mut time = self.inverse.make_output_vec();
        let norm = 1.0 / self.fft_size as f32;

        for (t, frame) in frames.iter().enumerate() {
            if frame.len() != self.num_bins() {
                return Err(CloakError::ShapeMismatch {
                    expected: vec![self.num_bins()],
                    got: vec![frame.len()],
                });
            }
            let mut spectrum = frame.clone();
            // DC and Nyquist must be real for a real inverse
            spectrum[0].im = 0.0;
            if let Some(last) = spectrum.last_mut() {
                if self.fft_size % 2 == 0 {
                    last.im = 0.0;
                }
            }

            self.inverse
                .process_with_scratch(&mut spectrum, &mut time, &mut scratch)
                .map_err(|e| CloakError::InvalidAudio(format!("inverse FFT failed: {}", e)))?;

            let start = t * self.hop_size;
            for (i, &w) in self.window.iter().enumerate() {
                output[start + i] += time[i] * norm * w;
                window_sum[start + i] += w * w;
            }
        }

        for (y, &ws) in output.iter_mut().zip(window_sum.iter()) {
            if ws > 1e-8 {
                *y /= ws;
            }
        }

        Ok(output.into_iter().skip(pad).take(length).collect())
    }
}
