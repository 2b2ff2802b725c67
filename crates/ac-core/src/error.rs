//! Error types for AudioCloak

use thiserror::Error;

/// Cloaking error taxonomy
#[derive(Error, Debug)]
pub enum CloakError {
    /// Empty waveform, zero sample rate, undecodable samples
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Model not found: '{name}' in {store}")]
    ModelNotFound { name: String, store: String },

    #[error("Failed to load model: {reason}")]
    ModelLoad { reason: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    /// The model cannot differentiate its scores w.r.t. the input
    #[error("Gradient unavailable: {0}")]
    GradientUnavailable(String),

    /// Gradient computation failed inside the optimization loop
    #[error("Optimization failed at iteration {iteration}: {source}")]
    Optimization {
        iteration: usize,
        source: Box<CloakError>,
    },

    /// NaN or infinity in a loss or gradient
    #[error("Numeric instability at iteration {iteration}: {what}")]
    NumericInstability { iteration: usize, what: String },

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloakError {
    /// Errors detected before optimization begins
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CloakError::InvalidAudio(_)
                | CloakError::FileNotFound(_)
                | CloakError::UnsupportedFormat(_)
                | CloakError::ModelNotFound { .. }
                | CloakError::InvalidConfig(_)
        )
    }

    /// Errors raised by the numeric core, fatal to the current job
    pub fn is_numerical(&self) -> bool {
        match self {
            CloakError::NumericInstability { .. } | CloakError::GradientUnavailable(_) => true,
            CloakError::Optimization { source, .. } => source.is_numerical(),
            _ => false,
        }
    }
}

/// Result type alias
pub type CloakResult<T> = Result<T, CloakError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert!(CloakError::InvalidAudio("empty".into()).is_input_error());
        assert!(!CloakError::InvalidAudio("empty".into()).is_numerical());

        let wrapped = CloakError::Optimization {
            iteration: 3,
            source: Box::new(CloakError::GradientUnavailable("onnx".into())),
        };
        assert!(wrapped.is_numerical());
        assert!(wrapped.to_string().contains("iteration 3"));
    }
}
