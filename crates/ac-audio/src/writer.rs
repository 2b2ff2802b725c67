//! WAV output

use std::path::Path;

use ac_core::{CloakError, CloakResult, Waveform};
use serde::{Deserialize, Serialize};

/// Sample encoding for written files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WavEncoding {
    /// 32-bit IEEE float, lossless for the perturbation
    #[default]
    Float32,
    /// 16-bit PCM, samples clipped to [-1, 1]
    Pcm16,
}

/// Write a waveform as a WAV file
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    waveform: &Waveform,
    encoding: WavEncoding,
) -> CloakResult<()> {
    let path = path.as_ref();
    let (bits_per_sample, sample_format) = match encoding {
        WavEncoding::Float32 => (32, hound::SampleFormat::Float),
        WavEncoding::Pcm16 => (16, hound::SampleFormat::Int),
    };
    let spec = hound::WavSpec {
        channels: waveform.channels() as u16,
        sample_rate: waveform.sample_rate(),
        bits_per_sample,
        sample_format,
    };

    let map_err = |e: hound::Error| match e {
        hound::Error::IoError(io) => CloakError::Io(io),
        other => CloakError::InvalidAudio(format!("{}: {}", path.display(), other)),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(map_err)?;
    match encoding {
        WavEncoding::Float32 => {
            for &s in waveform.samples() {
                writer.write_sample(s).map_err(map_err)?;
            }
        }
        WavEncoding::Pcm16 => {
            for &s in waveform.samples() {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                writer.write_sample(v).map_err(map_err)?;
            }
        }
    }
    writer.finalize().map_err(map_err)?;

    log::info!(
        "Wrote {} ({} Hz, {} ch, {:.2}s)",
        path.display(),
        waveform.sample_rate(),
        waveform.channels(),
        waveform.duration_secs()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_clips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hot.wav");
        let wf = Waveform::mono(vec![2.0, -2.0, 0.0], 8000).unwrap();
        write_wav(&path, &wf, WavEncoding::Pcm16).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![i16::MAX, -i16::MAX, 0]);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let wf = Waveform::mono(vec![0.0; 4], 8000).unwrap();
        let result = write_wav("/no/such/dir/out.wav", &wf, WavEncoding::Float32);
        assert!(matches!(result, Err(CloakError::Io(_))));
    }
}
