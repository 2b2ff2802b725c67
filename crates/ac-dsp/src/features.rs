//! Log-mel feature extraction

use ac_core::{CloakError, CloakResult, FeatureTensor, Waveform};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::mel::mel_filterbank;
use crate::stft::Stft;
use crate::AMIN;

/// Feature extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// FFT window length (samples)
    pub fft_window: usize,

    /// Samples between successive frames
    pub hop_length: usize,

    /// Number of mel bands
    pub num_bands: usize,

    /// Lowest filter edge (Hz)
    pub f_min: f64,

    /// Highest filter edge (Hz), None = Nyquist
    pub f_max: Option<f64>,

    /// Dynamic range floor below the maximum (dB), None = unbounded
    pub top_db: Option<f32>,

    /// Append a trailing channel axis: `(1, bands, frames, 1)`
    pub channel_axis: bool,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            fft_window: 2048,
            hop_length: 512,
            num_bands: 128,
            f_min: 0.0,
            f_max: None,
            top_db: Some(80.0),
            channel_axis: false,
        }
    }
}

impl FeatureParams {
    /// Small, fast configuration for short clips
    pub fn compact() -> Self {
        Self {
            fft_window: 512,
            hop_length: 128,
            num_bands: 40,
            ..Default::default()
        }
    }

    pub fn with_fft_window(mut self, size: usize) -> Self {
        self.fft_window = size;
        self
    }

    pub fn with_hop_length(mut self, hop: usize) -> Self {
        self.hop_length = hop;
        self
    }

    pub fn with_num_bands(mut self, bands: usize) -> Self {
        self.num_bands = bands;
        self
    }

    pub fn with_channel_axis(mut self, enabled: bool) -> Self {
        self.channel_axis = enabled;
        self
    }

    pub fn validate(&self) -> CloakResult<()> {
        if self.fft_window < 2 {
            return Err(CloakError::InvalidConfig(format!(
                "fft_window must be at least 2, got {}",
                self.fft_window
            )));
        }
        if self.hop_length == 0 {
            return Err(CloakError::InvalidConfig("hop_length must be positive".into()));
        }
        if self.num_bands == 0 {
            return Err(CloakError::InvalidConfig("num_bands must be positive".into()));
        }
        if let Some(f_max) = self.f_max {
            if f_max <= self.f_min {
                return Err(CloakError::InvalidConfig(format!(
                    "f_max ({}) must exceed f_min ({})",
                    f_max, self.f_min
                )));
            }
        }
        Ok(())
    }

    /// Upper filter edge for a given sample rate
    pub fn f_max_for(&self, sample_rate: u32) -> f64 {
        self.f_max.unwrap_or(sample_rate as f64 / 2.0)
    }
}

/// Waveform → log-mel feature tensor
#[derive(Debug)]
pub struct FeatureExtractor {
    params: FeatureParams,
    stft: Stft,
}

impl FeatureExtractor {
    pub fn new(params: FeatureParams) -> CloakResult<Self> {
        params.validate()?;
        let stft = Stft::new(params.fft_window, params.hop_length)?;
        Ok(Self { params, stft })
    }

    pub fn params(&self) -> &FeatureParams {
        &self.params
    }

    pub fn stft(&self) -> &Stft {
        &self.stft
    }

    /// Number of frames produced for `num_samples` mono samples
    pub fn num_frames(&self, num_samples: usize) -> usize {
        self.stft.num_frames(num_samples)
    }

    /// Tensor shape produced for `num_samples` mono samples
    pub fn feature_shape(&self, num_samples: usize) -> Vec<usize> {
        let mut shape = vec![1, self.params.num_bands, self.num_frames(num_samples)];
        if self.params.channel_axis {
            shape.push(1);
        }
        shape
    }

    /// Extract features from a waveform (multi-channel input is mixed down)
    pub fn extract(&self, waveform: &Waveform) -> CloakResult<FeatureTensor> {
        self.extract_samples(&waveform.mono_samples(), waveform.sample_rate())
    }

    /// Extract features from mono samples
    pub fn extract_samples(&self, samples: &[f32], sample_rate: u32) -> CloakResult<FeatureTensor> {
        let mel = self.mel_power(samples, sample_rate)?;
        let db = power_to_db(&mel, self.params.top_db);

        let (bands, frames) = db.dim();
        let data = db.insert_axis(Axis(0)).into_dyn();
        let tensor = if self.params.channel_axis {
            FeatureTensor::new(data.insert_axis(Axis(3)))
        } else {
            FeatureTensor::new(data)
        };

        log::debug!(
            "Extracted features: {} samples @ {} Hz -> {} bands x {} frames",
            samples.len(),
            sample_rate,
            bands,
            frames
        );

        Ok(tensor)
    }

    /// Mel power spectrogram, shape `(num_bands, frames)`
    pub fn mel_power(&self, samples: &[f32], sample_rate: u32) -> CloakResult<Array2<f32>> {
        if samples.is_empty() {
            return Err(CloakError::InvalidAudio("waveform is empty".into()));
        }
        if sample_rate == 0 {
            return Err(CloakError::InvalidAudio("sample rate must be positive".into()));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(CloakError::InvalidAudio("waveform contains NaN or infinity".into()));
        }

        let power = self.stft.power(samples)?;
        let filters = self.filterbank(sample_rate);
        Ok(filters.dot(&power))
    }

    /// Mel filterbank for a sample rate, shape `(num_bands, fft_window / 2 + 1)`
    pub fn filterbank(&self, sample_rate: u32) -> Array2<f32> {
        mel_filterbank(
            sample_rate,
            self.params.fft_window,
            self.params.num_bands,
            self.params.f_min,
            self.params.f_max_for(sample_rate),
        )
    }
}

/// Power → decibels relative to the maximum of `power`
///
/// `10·log10(max(S, amin)) − 10·log10(max(ref, amin))`, floored at
/// `max − top_db` when `top_db` is set. The result is ≤ 0 everywhere.
pub fn power_to_db(power: &Array2<f32>, top_db: Option<f32>) -> Array2<f32> {
    let reference = power.iter().fold(0.0f32, |m, &p| m.max(p)).max(AMIN);
    let ref_db = 10.0 * reference.log10();
    let mut db = power.mapv(|p| 10.0 * p.max(AMIN).log10() - ref_db);

    if let Some(range) = top_db {
        let max_db = db.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let floor = max_db - range;
        db.mapv_inplace(|v| v.max(floor));
    }
    db
}

/// One-shot extraction from raw mono samples
pub fn extract(samples: &[f32], sample_rate: u32, params: &FeatureParams) -> CloakResult<FeatureTensor> {
    FeatureExtractor::new(params.clone())?.extract_samples(samples, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.8)
            .collect()
    }

    #[test]
    fn test_one_second_shape() {
        let features = extract(&tone(22050, 22050), 22050, &FeatureParams::default()).unwrap();
        assert_eq!(features.shape(), &[1, 128, 44]);
    }

    #[test]
    fn test_channel_axis() {
        let params = FeatureParams::default().with_channel_axis(true);
        let features = extract(&tone(22050, 22050), 22050, &params).unwrap();
        assert_eq!(features.shape(), &[1, 128, 44, 1]);
    }

    #[test]
    fn test_db_range() {
        let features = extract(&tone(22050, 22050), 22050, &FeatureParams::default()).unwrap();
        assert!((features.max() - 0.0).abs() < 1e-4);
        assert!(features.min() >= -80.0 - 1e-3);
    }

    #[test]
    fn test_deterministic() {
        let samples = tone(8000, 16000);
        let params = FeatureParams::compact();
        let a = extract(&samples, 16000, &params).unwrap();
        let b = extract(&samples, 16000, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_gain_invariance() {
        // Per-call max normalization removes overall level
        let samples = tone(8000, 16000);
        let quiet: Vec<f32> = samples.iter().map(|s| s * 0.1).collect();
        let params = FeatureParams::compact();
        let a = extract(&samples, 16000, &params).unwrap();
        let b = extract(&quiet, 16000, &params).unwrap();
        let diff = a.sub(&b).unwrap();
        assert!(diff.max_abs() < 1e-2);
    }

    #[test]
    fn test_invalid_audio() {
        let params = FeatureParams::default();
        assert!(matches!(
            extract(&[], 22050, &params),
            Err(CloakError::InvalidAudio(_))
        ));
        assert!(matches!(
            extract(&[0.1, 0.2], 0, &params),
            Err(CloakError::InvalidAudio(_))
        ));
    }

    #[test]
    fn test_invalid_params() {
        let params = FeatureParams::default().with_num_bands(0);
        assert!(matches!(
            FeatureExtractor::new(params),
            Err(CloakError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_power_to_db_floor() {
        let power = Array2::from_shape_vec((1, 3), vec![1.0, 1e-3, 0.0]).unwrap();
        let db = power_to_db(&power, Some(20.0));
        assert!((db[[0, 0]] - 0.0).abs() < 1e-5);
        assert!((db[[0, 1]] - -20.0).abs() < 1e-4);
        assert!((db[[0, 2]] - -20.0).abs() < 1e-4);
    }
}
