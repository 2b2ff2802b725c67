//! Technical comparison of original and cloaked audio

use std::collections::BTreeMap;

use ac_core::{CloakError, CloakResult, Waveform};
use serde::{Deserialize, Serialize};

use crate::perceptual::perceptual_distance;

/// Named measurements, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalReport {
    pub measurements: BTreeMap<String, f64>,
}

impl TechnicalReport {
    pub const SPECTRAL_SIMILARITY: &'static str = "spectral_similarity";
    pub const PEAK_DELTA_DB: &'static str = "peak_delta_db";
    pub const RMS_DELTA_DB: &'static str = "rms_delta_db";
    pub const MAX_SAMPLE_DELTA: &'static str = "max_sample_delta";

    pub fn get(&self, name: &str) -> Option<f64> {
        self.measurements.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.measurements.insert(name.into(), value);
    }
}

fn level_db(level: f32) -> f64 {
    20.0 * (level.max(1e-10) as f64).log10()
}

/// Spectral similarity plus level deltas (cloaked minus original)
pub fn conduct_technical_test(original: &Waveform, cloaked: &Waveform) -> CloakResult<TechnicalReport> {
    if original.channels() != cloaked.channels() {
        return Err(CloakError::InvalidAudio(format!(
            "channel counts differ: {} vs {}",
            original.channels(),
            cloaked.channels()
        )));
    }

    let mut report = TechnicalReport::default();
    report.insert(
        TechnicalReport::SPECTRAL_SIMILARITY,
        perceptual_distance(original, cloaked)?,
    );
    report.insert(
        TechnicalReport::PEAK_DELTA_DB,
        level_db(cloaked.peak()) - level_db(original.peak()),
    );
    report.insert(
        TechnicalReport::RMS_DELTA_DB,
        level_db(cloaked.rms()) - level_db(original.rms()),
    );

    let max_delta = original
        .samples()
        .iter()
        .zip(cloaked.samples())
        .fold(0.0f32, |m, (a, b)| m.max((a - b).abs()));
    report.insert(TechnicalReport::MAX_SAMPLE_DELTA, max_delta as f64);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tone(gain: f32) -> Waveform {
        let samples = (0..4096)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 22050.0).sin() * gain)
            .collect();
        Waveform::mono(samples, 22050).unwrap()
    }

    #[test]
    fn test_identical_audio() {
        let report = conduct_technical_test(&tone(0.5), &tone(0.5)).unwrap();
        assert_eq!(report.get(TechnicalReport::SPECTRAL_SIMILARITY), Some(0.0));
        assert_eq!(report.get(TechnicalReport::MAX_SAMPLE_DELTA), Some(0.0));
        assert_eq!(report.measurements.len(), 4);
    }

    #[test]
    fn test_half_gain_is_minus_six_db() {
        let report = conduct_technical_test(&tone(0.5), &tone(0.25)).unwrap();
        let peak = report.get(TechnicalReport::PEAK_DELTA_DB).unwrap();
        let rms = report.get(TechnicalReport::RMS_DELTA_DB).unwrap();
        assert_relative_eq!(peak, -6.0206, epsilon = 1e-3);
        assert_relative_eq!(rms, -6.0206, epsilon = 1e-3);
    }
}
