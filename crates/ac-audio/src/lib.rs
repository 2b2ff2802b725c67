//! # ac-audio
//!
//! Audio plumbing around the cloaking core:
//!
//! - **Loading**: WAV through hound, everything else through symphonia,
//!   selected by [`DecodeBackend`] at loader construction
//! - **Preprocessing**: mono mixdown, linear resampling, peak normalization
//! - **Writing**: WAV output for cloaked audio
//!
//! ```rust,ignore
//! use ac_audio::{AudioLoader, LoaderConfig};
//!
//! let loader = AudioLoader::new(LoaderConfig::default());
//! let waveform = loader.load("speech.flac")?;
//! assert_eq!(waveform.sample_rate(), 22050);
//! ```

mod config;
mod loader;
mod preprocess;
mod writer;

pub use config::{DecodeBackend, LoaderConfig};
pub use loader::AudioLoader;
pub use preprocess::{normalize_peak, resample, to_mono};
pub use writer::{write_wav, WavEncoding};

/// Sample rate the feature pipeline is tuned for
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;
