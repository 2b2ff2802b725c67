//! Waveform container

use serde::{Deserialize, Serialize};

use crate::error::{CloakError, CloakResult};

/// Interleaved audio samples tagged with a sample rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl Waveform {
    /// Create from interleaved samples
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> CloakResult<Self> {
        if channels == 0 {
            return Err(CloakError::InvalidAudio("channel count must be at least 1".into()));
        }
        if sample_rate == 0 {
            return Err(CloakError::InvalidAudio("sample rate must be positive".into()));
        }
        if samples.len() % channels != 0 {
            return Err(CloakError::InvalidAudio(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    /// Single-channel waveform
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> CloakResult<Self> {
        Self::new(samples, 1, sample_rate)
    }

    /// Build from per-channel vectors (shortest channel wins)
    pub fn from_channels(channels: &[Vec<f32>], sample_rate: u32) -> CloakResult<Self> {
        let num_channels = channels.len();
        let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * num_channels);
        for i in 0..frames {
            for ch in channels {
                samples.push(ch[i]);
            }
        }
        Self::new(samples, num_channels, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per channel
    pub fn num_frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// One channel, de-interleaved
    pub fn channel(&self, index: usize) -> Vec<f32> {
        if index >= self.channels {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels)
            .copied()
            .collect()
    }

    /// Channel average
    pub fn mono_samples(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }
        let scale = 1.0 / self.channels as f32;
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    }

    pub fn to_mono(&self) -> Waveform {
        Waveform {
            samples: self.mono_samples(),
            channels: 1,
            sample_rate: self.sample_rate,
        }
    }

    /// Same layout, new samples (length must match)
    pub fn with_samples(&self, samples: Vec<f32>) -> CloakResult<Waveform> {
        if samples.len() != self.samples.len() {
            return Err(CloakError::ShapeMismatch {
                expected: vec![self.samples.len()],
                got: vec![samples.len()],
            });
        }
        Ok(Waveform {
            samples,
            channels: self.channels,
            sample_rate: self.sample_rate,
        })
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(Waveform::new(vec![0.0; 4], 0, 44100).is_err());
        assert!(Waveform::new(vec![0.0; 3], 2, 44100).is_err());
        assert!(Waveform::new(vec![0.0; 4], 2, 0).is_err());
        assert!(Waveform::new(vec![], 1, 22050).is_ok());
    }

    #[test]
    fn test_mono_mixdown() {
        let wf = Waveform::new(vec![1.0, 0.0, 0.0, 1.0, 0.5, 0.5], 2, 44100).unwrap();
        assert_eq!(wf.num_frames(), 3);
        assert_eq!(wf.mono_samples(), vec![0.5, 0.5, 0.5]);
        assert_eq!(wf.channel(1), vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_from_channels_interleaves() {
        let wf = Waveform::from_channels(&[vec![1.0, 2.0], vec![-1.0, -2.0]], 8000).unwrap();
        assert_eq!(wf.samples(), &[1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn test_levels() {
        let wf = Waveform::mono(vec![1.0, 0.5, -0.5, -1.0], 44100).unwrap();
        assert_eq!(wf.peak(), 1.0);
        // sqrt((1 + 0.25 + 0.25 + 1) / 4)
        assert!((wf.rms() - 0.7906).abs() < 0.001);
    }
}
