use std::path::Path;

use crate::models::error::ConversionError;
use crate::models::sample::TargetFormat;

/// Encodes and decodes audio files outside the WAV path.
///
/// Implemented by `FfmpegConverter`. Tests substitute their own.
pub trait AudioConverter: Send + Sync {
    /// Encode the WAV file at `input` into `format`, writing `output`.
    fn encode(&self, input: &Path, output: &Path, format: TargetFormat) -> Result<(), ConversionError>;

    /// Decode any supported file at `input` into a PCM WAV at `output`.
    fn decode_to_wav(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}
