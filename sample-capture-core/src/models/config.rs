use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Raw sink format. Captures are always written as 48 kHz stereo 16-bit PCM.
pub const RAW_SAMPLE_RATE: u32 = 48_000;
pub const RAW_CHANNELS: u16 = 2;
pub const RAW_BIT_DEPTH: u16 = 16;

/// Configuration for a capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfiguration {
    /// Sample rate in Hz (fixed: 48000).
    pub sample_rate: u32,

    /// Bit depth of the raw sink file (fixed: 16).
    pub bit_depth: u16,

    /// Number of channels (fixed: 2).
    pub channels: u16,

    /// Private working directory for raw capture files. Created on demand.
    pub recordings_dir: PathBuf,

    /// Capacity of the loudness event queue. Events beyond it are dropped.
    pub level_event_capacity: usize,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate != RAW_SAMPLE_RATE {
            return Err(format!("unsupported sample rate: {}", self.sample_rate));
        }
        if self.bit_depth != RAW_BIT_DEPTH {
            return Err(format!("unsupported bit depth: {}", self.bit_depth));
        }
        if self.channels != RAW_CHANNELS {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.level_event_capacity == 0 {
            return Err("level event capacity must be at least 1".into());
        }
        Ok(())
    }

    /// Capture configuration rooted in a library's scratch directory.
    pub fn for_library(library: &LibraryConfig) -> Self {
        Self {
            recordings_dir: library.recordings_dir(),
            level_event_capacity: library.level_channel_capacity,
            ..Self::default()
        }
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: RAW_SAMPLE_RATE,
            bit_depth: RAW_BIT_DEPTH,
            channels: RAW_CHANNELS,
            recordings_dir: default_scratch_dir().join("recordings"),
            level_event_capacity: 64,
        }
    }
}

/// How the catalog's tag index reacts to removals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagIndexPolicy {
    /// Tags are only ever added; removals leave stale tags behind.
    #[default]
    GrowOnly,
    /// The index is rebuilt from the remaining samples after every removal.
    Recompute,
}

/// Library-wide settings: where scratch files live, which directory is the
/// catalog, and how it is watched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub scratch_dir: PathBuf,
    pub catalog_root: PathBuf,
    pub tag_index_policy: TagIndexPolicy,
    pub watch_interval_ms: u64,
    pub ffmpeg_path: Option<PathBuf>,
    pub level_channel_capacity: usize,
}

impl LibraryConfig {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let json = fs::read_to_string(path)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e)))?;
        let config: LibraryConfig = serde_json::from_str(&json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.watch_interval_ms == 0 {
            return Err("watch interval must be positive".into());
        }
        if self.level_channel_capacity == 0 {
            return Err("level channel capacity must be at least 1".into());
        }
        if self.catalog_root.as_os_str().is_empty() {
            return Err("catalog root must be set".into());
        }
        if self.scratch_dir == self.catalog_root {
            return Err("scratch directory must differ from the catalog root".into());
        }
        Ok(())
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.scratch_dir.join("recordings")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.scratch_dir.join("staging")
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            catalog_root: PathBuf::from("samples"),
            tag_index_policy: TagIndexPolicy::GrowOnly,
            watch_interval_ms: 500,
            ffmpeg_path: None,
            level_channel_capacity: 64,
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("sample-capture-{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capture_config_is_valid() {
        assert!(CaptureConfiguration::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_raw_formats() {
        let config = CaptureConfiguration {
            sample_rate: 44_100,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfiguration {
            channels: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn library_config_from_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        fs::write(
            &path,
            r#"{ "catalog_root": "/tmp/samples", "tag_index_policy": "recompute" }"#,
        )
        .unwrap();

        let config = LibraryConfig::load(&path).unwrap();
        assert_eq!(config.catalog_root, PathBuf::from("/tmp/samples"));
        assert_eq!(config.tag_index_policy, TagIndexPolicy::Recompute);
        assert_eq!(config.watch_interval_ms, 500);
    }

    #[test]
    fn library_config_rejects_zero_interval() {
        let config = LibraryConfig {
            watch_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn capture_config_follows_library_scratch_dir() {
        let library = LibraryConfig {
            scratch_dir: PathBuf::from("/tmp/scratch"),
            ..Default::default()
        };
        let capture = CaptureConfiguration::for_library(&library);
        assert_eq!(capture.recordings_dir, PathBuf::from("/tmp/scratch/recordings"));
    }
}
