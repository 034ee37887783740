use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing a capture source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureSetupError {
    #[error("no capturable audio target available")]
    NoTarget,

    #[error("permission denied")]
    PermissionDenied,

    #[error("capture setup failed: {0}")]
    Platform(String),
}

/// Errors raised by a running capture source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureRuntimeError {
    #[error("capture stopped unexpectedly: {0}")]
    StoppedUnexpectedly(String),
}

/// Errors from the audio sink writer.
///
/// `InvalidBuffer` is buffer-level and never ends a session; the rest are
/// file-level and fatal to the session that owns the writer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriterError {
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    #[error("failed to open sink file: {0}")]
    Open(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("failed to finalize sink file: {0}")]
    Close(String),

    #[error("sink file reached the {0}-byte WAV data limit")]
    SizeLimit(u64),

    #[error("sink writer is closed")]
    Closed,
}

/// Session-level error surfaced by the controller and the recorder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error(transparent)]
    Setup(#[from] CaptureSetupError),

    #[error(transparent)]
    Runtime(#[from] CaptureRuntimeError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("failed to spawn {0} thread")]
    ThreadSpawn(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("source file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to decode {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("unsupported sample format in {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrimRangeError {
    #[error("trim start must be finite and non-negative, got {0}")]
    InvalidStart(f64),

    #[error("trim end must be finite, got {0}")]
    InvalidEnd(f64),

    #[error("empty trim window: start {start_secs}s is not before end {end_secs}s")]
    EmptyWindow { start_secs: f64, end_secs: f64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("conversion tool not found: {0}")]
    ToolNotFound(String),

    #[error("conversion to {format} failed: {reason}")]
    Failed { format: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogMoveError {
    #[error("a sample already exists at {0}")]
    Collision(PathBuf),

    #[error("destination directory unavailable: {0}")]
    Destination(String),

    #[error("failed to move {from} to {to}: {reason}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },
}

/// Failure of a single sample processing invocation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Trim(#[from] TrimRangeError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Move(#[from] CatalogMoveError),

    #[error("failed to stage audio: {0}")]
    Staging(String),

    #[error("processing task failed: {0}")]
    Task(String),
}
