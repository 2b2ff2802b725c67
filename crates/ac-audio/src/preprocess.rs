//! Waveform preprocessing

use ac_core::{CloakError, CloakResult, Waveform};

/// Average all channels into one
pub fn to_mono(waveform: &Waveform) -> Waveform {
    waveform.to_mono()
}

/// Scale so the largest absolute sample is 1.0
///
/// Silent input is returned unchanged.
pub fn normalize_peak(waveform: &Waveform) -> Waveform {
    let peak = waveform.peak();
    if peak <= f32::MIN_POSITIVE || !peak.is_finite() {
        return waveform.clone();
    }
    let gain = 1.0 / peak;
    let samples = waveform.samples().iter().map(|&s| s * gain).collect();
    // Layout is unchanged, so this cannot fail
    waveform.with_samples(samples).unwrap_or_else(|_| waveform.clone())
}

/// Linear-interpolation resampling, per channel
pub fn resample(waveform: &Waveform, target_rate: u32) -> CloakResult<Waveform> {
    if target_rate == 0 {
        return Err(CloakError::InvalidConfig("target sample rate must be positive".into()));
    }
    let from_rate = waveform.sample_rate();
    if from_rate == target_rate {
        return Ok(waveform.clone());
    }

    let ratio = target_rate as f64 / from_rate as f64;
    let channels: Vec<Vec<f32>> = (0..waveform.channels())
        .map(|ch| resample_channel(&waveform.channel(ch), ratio))
        .collect();

    log::debug!(
        "Resampled {} frames @ {} Hz -> {} frames @ {} Hz",
        waveform.num_frames(),
        from_rate,
        channels.first().map(|c| c.len()).unwrap_or(0),
        target_rate
    );

    Waveform::from_channels(&channels, target_rate)
}

fn resample_channel(audio: &[f32], ratio: f64) -> Vec<f32> {
    let new_len = (audio.len() as f64 * ratio) as usize;

    (0..new_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = pos.floor() as usize;
            let frac = pos - idx as f64;

            let s0 = audio.get(idx).copied().unwrap_or(0.0) as f64;
            let s1 = audio.get(idx + 1).map(|&s| s as f64).unwrap_or(s0);

            (s0 * (1.0 - frac) + s1 * frac) as f32
        })
        .collect()
}
