//! ac-core: Shared types for AudioCloak
//!
//! Every other crate in the workspace speaks in terms of these:
//! - [`Waveform`]: interleaved samples tagged with a sample rate
//! - [`FeatureTensor`]: n-dimensional `f32` energies (batch × bands × frames)
//! - [`LossTerms`]: adversarial / perceptual / total objective values
//! - [`CloakError`]: the single error taxonomy shared by the pipeline

mod error;
mod loss;
mod tensor;
mod waveform;

pub use error::*;
pub use loss::*;
pub use tensor::*;
pub use waveform::*;

/// Class identifier produced by arg-max over model scores
pub type Label = usize;

/// Index of the largest score, ties resolved towards the lower index
///
/// NaN scores never win.
pub fn argmax(scores: &[f32]) -> Option<Label> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.9]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5, 0.2]), Some(0));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN, 0.5]), Some(1));
        assert_eq!(argmax(&[0.5, f32::NAN]), Some(0));
        assert_eq!(argmax(&[f32::NAN]), None);
    }
}
