//! Slaney-scale mel filterbank

use ndarray::Array2;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Hz → mel (linear below 1 kHz, logarithmic above)
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// mel → Hz
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// `count` center frequencies evenly spaced on the mel scale
pub fn mel_frequencies(count: usize, f_min: f64, f_max: f64) -> Vec<f64> {
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    if count < 2 {
        return vec![mel_to_hz(mel_min); count];
    }
    (0..count)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (count - 1) as f64))
        .collect()
}

/// Triangular filters with Slaney area normalization
///
/// Shape `(n_mels, n_fft / 2 + 1)`. Row `m` weights the power bins that
/// feed mel band `m`.
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    f_min: f64,
    f_max: f64,
) -> Array2<f32> {
    let num_bins = n_fft / 2 + 1;
    let mut weights = Array2::<f32>::zeros((n_mels, num_bins));

    let fft_freqs: Vec<f64> = (0..num_bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();
    let mel_f = mel_frequencies(n_mels + 2, f_min, f_max);

    for m in 0..n_mels {
        let lower_edge = mel_f[m];
        let center = mel_f[m + 1];
        let upper_edge = mel_f[m + 2];
        let rise = center - lower_edge;
        let fall = upper_edge - center;
        let enorm = 2.0 / (upper_edge - lower_edge);

        for (k, &freq) in fft_freqs.iter().enumerate() {
            let lower = if rise > 0.0 { (freq - lower_edge) / rise } else { 0.0 };
            let upper = if fall > 0.0 { (upper_edge - freq) / fall } else { 0.0 };
            let w = lower.min(upper).max(0.0);
            weights[[m, k]] = (w * enorm) as f32;
        }
    }

    weights
}
