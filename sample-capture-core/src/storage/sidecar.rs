use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::error::CaptureError;
use crate::models::sample::{SampleMetadata, TargetFormat};

/// Extra sample metadata that does not fit the filename grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSidecar {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub format: TargetFormat,
    pub duration_secs: f64,
    pub created_at: String,
}

impl SampleSidecar {
    pub fn new(id: impl Into<String>, metadata: &SampleMetadata, duration_secs: f64) -> Self {
        Self {
            id: id.into(),
            title: metadata.title.clone(),
            tags: metadata.tags().to_vec(),
            description: metadata.description.clone(),
            format: metadata.format,
            duration_secs,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// `{sample_path}.metadata.json`
pub fn sidecar_path(sample_path: &Path) -> PathBuf {
    let mut name = sample_path.as_os_str().to_owned();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// Write sample metadata as a JSON sidecar file next to the sample.
pub fn write_sidecar(sidecar: &SampleSidecar, sample_path: &Path) -> Result<PathBuf, CaptureError> {
    let path = sidecar_path(sample_path);
    let json = serde_json::to_string_pretty(sidecar)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize sidecar: {}", e)))?;
    fs::write(&path, json).map_err(|e| CaptureError::StorageError(format!("failed to write sidecar: {}", e)))?;
    Ok(path)
}

pub fn read_sidecar(sample_path: &Path) -> Result<SampleSidecar, CaptureError> {
    let path = sidecar_path(sample_path);
    let json = fs::read_to_string(&path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read sidecar: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| CaptureError::StorageError(format!("failed to parse sidecar: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_sits_next_to_sample() {
        let path = sidecar_path(Path::new("/lib/kick--drum.wav"));
        assert_eq!(path, PathBuf::from("/lib/kick--drum.wav.metadata.json"));
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("kick--drum_808.wav");
        let metadata = SampleMetadata::new("kick", TargetFormat::Wav)
            .with_tags(["drum", "808"])
            .with_description("tight low kick");

        write_sidecar(&SampleSidecar::new("a1b2", &metadata, 1.5), &sample).unwrap();
        let read = read_sidecar(&sample).unwrap();
        assert_eq!(read.id, "a1b2");
        assert_eq!(read.description.as_deref(), Some("tight low kick"));
        assert_eq!(read.tags, vec!["drum".to_string(), "808".to_string()]);
        assert_eq!(read.duration_secs, 1.5);
    }

    #[test]
    fn missing_sidecar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_sidecar(&dir.path().join("none--x.wav")).is_err());
    }
}
