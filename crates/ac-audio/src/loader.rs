//! Audio file loading

use std::path::Path;

use ac_core::{CloakError, CloakResult, Waveform};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::{DecodeBackend, LoaderConfig};
use crate::preprocess;

/// Audio file loader; the decoder backend is fixed at construction
#[derive(Debug, Clone, Default)]
pub struct AudioLoader {
    config: LoaderConfig,
}

impl AudioLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Decode a file, then apply the configured mixdown and resampling
    pub fn load<P: AsRef<Path>>(&self, path: P) -> CloakResult<Waveform> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        if !path.exists() {
            return Err(CloakError::FileNotFound(path_str));
        }

        let is_wav = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);

        let decoded = match (self.config.backend, is_wav) {
            (DecodeBackend::Auto, true) | (DecodeBackend::Wav, true) => {
                Self::load_wav(path, &path_str)?
            }
            (DecodeBackend::Wav, false) => {
                return Err(CloakError::UnsupportedFormat(format!(
                    "{}: WAV backend selected",
                    path_str
                )));
            }
            (DecodeBackend::Auto, false) | (DecodeBackend::Symphonia, _) => {
                Self::load_symphonia(path, &path_str)?
            }
        };

        if decoded.is_empty() {
            return Err(CloakError::InvalidAudio(format!("{}: no samples", path_str)));
        }

        log::debug!(
            "Decoded {}: {} Hz, {} ch, {:.2}s",
            path_str,
            decoded.sample_rate(),
            decoded.channels(),
            decoded.duration_secs()
        );

        let mut waveform = if self.config.mono {
            preprocess::to_mono(&decoded)
        } else {
            decoded
        };

        if let Some(rate) = self.config.target_sample_rate {
            if rate != waveform.sample_rate() {
                waveform = preprocess::resample(&waveform, rate)?;
            }
        }

        Ok(waveform)
    }

    /// Decode WAV with hound (exact for 32-bit float)
    fn load_wav(path: &Path, path_str: &str) -> CloakResult<Waveform> {
        let reader = hound::WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(io) => CloakError::Io(io),
            hound::Error::Unsupported => {
                CloakError::UnsupportedFormat(format!("{}: unsupported WAV encoding", path_str))
            }
            other => CloakError::InvalidAudio(format!("{}: {}", path_str, other)),
        })?;

        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| CloakError::InvalidAudio(format!("{}: {}", path_str, e)))?,
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| CloakError::InvalidAudio(format!("{}: {}", path_str, e)))?
            }
        };

        Waveform::new(samples, spec.channels as usize, spec.sample_rate)
    }

    /// Decode any symphonia-supported container
    fn load_symphonia(path: &Path, path_str: &str) -> CloakResult<Waveform> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Self::map_symphonia_error(path_str, e))?;

        let mut format = probed.format;

        let track = format.default_track().ok_or_else(|| {
            CloakError::UnsupportedFormat(format!("{}: no audio track", path_str))
        })?;

        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
            CloakError::InvalidAudio(format!("{}: unknown sample rate", path_str))
        })?;

        let num_channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| CloakError::InvalidAudio(format!("{}: unknown channels", path_str)))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Self::map_symphonia_error(path_str, e))?;

        let track_id = track.id;
        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(Self::map_symphonia_error(path_str, e)),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(msg)) => {
                    log::warn!("{}: skipping corrupt packet ({})", path_str, msg);
                    continue;
                }
                Err(e) => return Err(Self::map_symphonia_error(path_str, e)),
            };

            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }

        Waveform::new(samples, num_channels, sample_rate)
    }

    fn map_symphonia_error(path_str: &str, e: SymphoniaError) -> CloakError {
        match e {
            SymphoniaError::Unsupported(what) => {
                CloakError::UnsupportedFormat(format!("{}: {}", path_str, what))
            }
            SymphoniaError::IoError(io) => CloakError::Io(io),
            other => CloakError::InvalidAudio(format!("{}: {}", path_str, other)),
        }
    }
}
