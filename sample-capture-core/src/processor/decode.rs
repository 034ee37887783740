//! Source decoding into an in-memory float buffer.

use std::fs;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::models::audio_models::SampleLayout;
use crate::models::error::{DecodeError, TrimRangeError};
use crate::models::sample::TrimWindow;
use crate::processing::{pcm, trim};
use crate::traits::converter::AudioConverter;

/// Decoded audio in the processor's working representation.
///
/// Samples are normalized to [-1.0, 1.0]. The original bit depth and sample
/// format are kept so the staging file can be written back in the same PCM
/// format the source used.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub layout: SampleLayout,
    pub bits_per_sample: u16,
    pub sample_format: SampleFormat,
    pub data: Vec<f32>,
}

impl DecodedAudio {
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate.max(1) as f64
    }

    /// Keep only the frames inside `window`.
    pub fn trimmed(self, window: &TrimWindow) -> Result<Self, TrimRangeError> {
        let range = trim::frame_range(window, self.frame_count(), self.sample_rate)?;
        let data = trim::copy_frames(&self.data, self.channels as usize, self.layout, range);
        Ok(Self { data, ..self })
    }

    /// Samples in interleaved order regardless of layout.
    pub fn interleaved(&self) -> Vec<f32> {
        match self.layout {
            SampleLayout::Interleaved => self.data.clone(),
            SampleLayout::Planar => pcm::planar_to_interleaved(&self.data, self.channels as usize),
        }
    }

    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: self.sample_format,
        }
    }

    /// Write the audio as a WAV file in the source's PCM format.
    pub fn write_wav(&self, path: &Path) -> Result<(), String> {
        self.write_wav_with(path, self.spec())
    }

    /// Write the audio as 16-bit integer PCM.
    pub fn write_wav_16(&self, path: &Path) -> Result<(), String> {
        let spec = WavSpec {
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
            ..self.spec()
        };
        self.write_wav_with(path, spec)
    }

    fn write_wav_with(&self, path: &Path, spec: WavSpec) -> Result<(), String> {
        let mut writer =
            WavWriter::create(path, spec).map_err(|e| format!("failed to create {}: {}", path.display(), e))?;

        let samples = self.interleaved();
        match spec.sample_format {
            SampleFormat::Float => {
                for sample in samples {
                    writer.write_sample(sample).map_err(|e| e.to_string())?;
                }
            }
            SampleFormat::Int => {
                for sample in samples {
                    writer
                        .write_sample(pcm::f32_to_int(sample, spec.bits_per_sample))
                        .map_err(|e| e.to_string())?;
                }
            }
        }
        writer
            .finalize()
            .map_err(|e| format!("failed to finalize {}: {}", path.display(), e))
    }
}

/// Decode a WAV file with hound.
pub fn read_wav(path: &Path) -> Result<DecodedAudio, DecodeError> {
    if !path.is_file() {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }

    let reader = WavReader::open(path).map_err(|e| DecodeError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(DecodeError::Unsupported {
            path: path.to_path_buf(),
            reason: "zero channels".into(),
        });
    }

    let unreadable = |e: hound::Error| DecodeError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let data: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(unreadable)?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => reader
            .into_samples::<i32>()
            .map(|s| s.map(|s| pcm::int_to_f32(s, bits)))
            .collect::<Result<_, _>>()
            .map_err(unreadable)?,
        (format, bits) => {
            return Err(DecodeError::Unsupported {
                path: path.to_path_buf(),
                reason: format!("{:?} samples at {} bits", format, bits),
            });
        }
    };

    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        layout: SampleLayout::Interleaved,
        bits_per_sample: spec.bits_per_sample,
        sample_format: spec.sample_format,
        data,
    })
}

/// Decode any supported source. Non-WAV sources are first turned into a WAV
/// in `scratch_dir` by `converter`; that intermediate file is always removed.
pub fn decode_file(
    path: &Path,
    scratch_dir: &Path,
    converter: &dyn AudioConverter,
) -> Result<DecodedAudio, DecodeError> {
    if !path.is_file() {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }
    if is_wav(path) {
        return read_wav(path);
    }

    fs::create_dir_all(scratch_dir).map_err(|e| DecodeError::Unreadable {
        path: path.to_path_buf(),
        reason: format!("scratch directory unavailable: {}", e),
    })?;
    let intermediate = scratch_dir.join(format!("decode_{}.wav", uuid::Uuid::new_v4()));

    let result = converter
        .decode_to_wav(path, &intermediate)
        .map_err(|e| DecodeError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
        .and_then(|()| read_wav(&intermediate));

    remove_quietly(&intermediate);
    result
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error::ConversionError;
    use crate::models::sample::TargetFormat;
    use approx::assert_abs_diff_eq;

    struct NoConverter;

    impl AudioConverter for NoConverter {
        fn encode(&self, _: &Path, _: &Path, format: TargetFormat) -> Result<(), ConversionError> {
            Err(ConversionError::ToolNotFound(format!("no encoder for {}", format.name())))
        }

        fn decode_to_wav(&self, _: &Path, _: &Path) -> Result<(), ConversionError> {
            Err(ConversionError::ToolNotFound("no decoder".into()))
        }
    }

    fn write_test_wav(path: &Path, spec: WavSpec, samples: &[i32]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn stereo_16() -> WavSpec {
        WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn reads_16_bit_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.wav");
        write_test_wav(&path, stereo_16(), &[0, 16384, -16384, 32767]);

        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.frame_count(), 2);
        assert_abs_diff_eq!(audio.data[1], 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(audio.data[2], -0.5, epsilon = 1e-4);
    }

    #[test]
    fn staging_preserves_pcm_format() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 24,
            sample_format: SampleFormat::Int,
        };
        write_test_wav(&source, spec, &[0, 1_000_000, -1_000_000]);

        let staged = dir.path().join("staged.wav");
        read_wav(&source).unwrap().write_wav(&staged).unwrap();

        let reader = WavReader::open(&staged).unwrap();
        assert_eq!(reader.spec(), spec);
        let samples: Vec<i32> = reader.into_samples::<i32>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![0, 1_000_000, -1_000_000]);
    }

    #[test]
    fn trimming_keeps_window() {
        let audio = DecodedAudio {
            sample_rate: 4,
            channels: 1,
            layout: SampleLayout::Interleaved,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
            data: vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7],
        };
        let trimmed = audio.trimmed(&TrimWindow::new(0.5, 1.5)).unwrap();
        assert_eq!(trimmed.data, vec![0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn planar_audio_is_interleaved_for_output() {
        let audio = DecodedAudio {
            sample_rate: 48_000,
            channels: 2,
            layout: SampleLayout::Planar,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
            data: vec![1.0, 2.0, -1.0, -2.0],
        };
        assert_eq!(audio.interleaved(), vec![1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.wav");
        assert_eq!(
            decode_file(&missing, dir.path(), &NoConverter),
            Err(DecodeError::NotFound(missing))
        );
    }

    #[test]
    fn garbage_wav_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        fs::write(&path, b"definitely not RIFF").unwrap();
        assert!(matches!(read_wav(&path), Err(DecodeError::Unreadable { .. })));
    }

    #[test]
    fn failed_foreign_decode_leaves_no_intermediate() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mp3");
        fs::write(&source, b"ID3").unwrap();
        let scratch = dir.path().join("scratch");

        let result = decode_file(&source, &scratch, &NoConverter);
        assert!(matches!(result, Err(DecodeError::Unreadable { .. })));
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
        assert!(source.exists());
    }
}
