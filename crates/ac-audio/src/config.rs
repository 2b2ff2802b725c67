//! Loader configuration

use serde::{Deserialize, Serialize};

/// Decoder selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DecodeBackend {
    /// hound for `.wav`, symphonia for everything else
    #[default]
    Auto,
    /// hound only; non-WAV input is rejected
    Wav,
    /// symphonia for every format, WAV included
    Symphonia,
}

/// Audio loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Decoder selection
    pub backend: DecodeBackend,

    /// Resample to this rate after decoding (None = keep file rate)
    pub target_sample_rate: Option<u32>,

    /// Mix down to a single channel
    pub mono: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            backend: DecodeBackend::Auto,
            target_sample_rate: Some(crate::DEFAULT_SAMPLE_RATE),
            mono: true,
        }
    }
}

impl LoaderConfig {
    /// Decode as-is: native rate, all channels
    pub fn native() -> Self {
        Self {
            target_sample_rate: None,
            mono: false,
            ..Default::default()
        }
    }

    pub fn with_backend(mut self, backend: DecodeBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.target_sample_rate = Some(rate);
        self
    }

    pub fn with_mono(mut self, mono: bool) -> Self {
        self.mono = mono;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.backend, DecodeBackend::Auto);
        assert_eq!(config.target_sample_rate, Some(22050));
        assert!(config.mono);
    }

    #[test]
    fn test_native_config() {
        let config = LoaderConfig::native().with_backend(DecodeBackend::Wav);
        assert_eq!(config.target_sample_rate, None);
        assert!(!config.mono);
        assert_eq!(config.backend, DecodeBackend::Wav);
    }
}
