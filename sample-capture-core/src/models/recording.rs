use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::error::CaptureError;

/// The raw capture file of a recording in progress or awaiting finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRecording {
    pub id: String,
    pub temp_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl ActiveRecording {
    /// Allocate a new recording inside `working_dir`, creating the directory
    /// if it does not exist yet. The file itself is created by the sink writer.
    pub fn create_in(working_dir: &Path) -> Result<Self, CaptureError> {
        fs::create_dir_all(working_dir).map_err(|e| {
            CaptureError::StorageError(format!(
                "failed to create working directory {}: {}",
                working_dir.display(),
                e
            ))
        })?;

        let id = uuid::Uuid::new_v4().to_string();
        let temp_path = working_dir.join(format!("recording_{}.wav", id));
        Ok(Self {
            id,
            temp_path,
            created_at: Utc::now(),
        })
    }
}

/// Returned when the sink file has been finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSummary {
    pub file_path: PathBuf,
    pub frames_written: u64,
    pub duration_secs: f64,
    pub dropped_buffers: u64,
    pub checksum: String,
}

/// A stopped recording waiting for metadata before it is processed.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecording {
    pub recording: ActiveRecording,
    pub summary: CaptureSummary,
}
