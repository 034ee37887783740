//! Format conversion of staged audio.
//!
//! WAV targets are rewritten in-process with hound. Compressed targets go
//! through an external ffmpeg binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::models::error::ConversionError;
use crate::models::sample::TargetFormat;
use crate::processor::decode;
use crate::traits::converter::AudioConverter;

/// Convert the staged WAV at `staging` into `format` at `output`.
pub fn convert(
    staging: &Path,
    output: &Path,
    format: TargetFormat,
    converter: &dyn AudioConverter,
) -> Result<(), ConversionError> {
    match format {
        TargetFormat::Wav => {
            let failed = |reason: String| ConversionError::Failed {
                format: format.name().to_string(),
                reason,
            };
            let audio = decode::read_wav(staging).map_err(|e| failed(e.to_string()))?;
            audio.write_wav_16(output).map_err(failed)
        }
        _ => converter.encode(staging, output, format),
    }
}

/// Converter backed by the ffmpeg command-line tool.
#[derive(Debug, Clone, Default)]
pub struct FfmpegConverter {
    binary: Option<PathBuf>,
}

impl FfmpegConverter {
    /// `binary` overrides discovery when set.
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }

    fn binary(&self) -> Result<PathBuf, ConversionError> {
        match &self.binary {
            Some(path) if path.exists() => Ok(path.clone()),
            Some(path) => Err(ConversionError::ToolNotFound(format!(
                "configured ffmpeg not found at {}",
                path.display()
            ))),
            None => find_ffmpeg(),
        }
    }

    fn run(&self, args: &[&OsStr], format: TargetFormat) -> Result<(), ConversionError> {
        let binary = self.binary()?;
        log::debug!("Running {} {:?}", binary.display(), args);

        let output = Command::new(&binary)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(args)
            .output()
            .map_err(|e| ConversionError::ToolNotFound(format!("failed to run {}: {}", binary.display(), e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ConversionError::Failed {
                format: format.name().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl AudioConverter for FfmpegConverter {
    fn encode(&self, input: &Path, output: &Path, format: TargetFormat) -> Result<(), ConversionError> {
        let mut args = vec![OsStr::new("-i"), input.as_os_str(), OsStr::new("-vn")];
        args.extend(codec_args(format).iter().map(OsStr::new));
        args.push(output.as_os_str());
        self.run(&args, format)
    }

    fn decode_to_wav(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let mut args = vec![OsStr::new("-i"), input.as_os_str(), OsStr::new("-vn")];
        args.extend(codec_args(TargetFormat::Wav).iter().map(OsStr::new));
        args.push(output.as_os_str());
        self.run(&args, TargetFormat::Wav)
    }
}

fn codec_args(format: TargetFormat) -> &'static [&'static str] {
    match format {
        TargetFormat::Aac => &["-c:a", "aac", "-b:a", "256k", "-f", "ipod"],
        TargetFormat::Mp3 => &["-c:a", "libmp3lame", "-q:a", "2", "-f", "mp3"],
        TargetFormat::Flac => &["-c:a", "flac", "-f", "flac"],
        TargetFormat::Wav => &["-c:a", "pcm_s16le", "-f", "wav"],
    }
}

/// Locate ffmpeg in the usual install locations, then on `PATH`.
pub fn find_ffmpeg() -> Result<PathBuf, ConversionError> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &["/opt/homebrew/bin/ffmpeg", "/usr/local/bin/ffmpeg", "/usr/bin/ffmpeg"]
    } else if cfg!(target_os = "linux") {
        &["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg", "/snap/bin/ffmpeg"]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\ffmpeg\\bin\\ffmpeg.exe",
            "C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe",
            "C:\\Program Files (x86)\\ffmpeg\\bin\\ffmpeg.exe",
        ]
    } else {
        &[]
    };

    if let Some(path) = candidates.iter().map(PathBuf::from).find(|p| p.exists()) {
        log::debug!("Found ffmpeg at {}", path.display());
        return Ok(path);
    }

    let search = if cfg!(target_os = "windows") { "where" } else { "which" };
    let output = Command::new(search)
        .arg("ffmpeg")
        .output()
        .map_err(|e| ConversionError::ToolNotFound(format!("failed to search PATH for ffmpeg: {}", e)))?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(first) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            log::debug!("Found ffmpeg in PATH at {}", first);
            return Ok(PathBuf::from(first));
        }
    }

    Err(ConversionError::ToolNotFound("ffmpeg not found in standard locations or PATH".into()))
}
