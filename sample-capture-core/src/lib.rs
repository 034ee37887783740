//! # sample-capture-core
//!
//! Platform-agnostic core of a system-audio sample recorder.
//!
//! Captures arrive from a [`CaptureSource`], are written to a raw WAV by a
//! serial [`SinkWriter`] that also meters loudness, and are turned into
//! named, tagged samples by the [`SampleProcessor`]. The [`CatalogService`]
//! keeps an index of the samples in a watched directory. Platform backends
//! (Windows WASAPI loopback) implement `CaptureSource` in their own crates.
//!
//! ## Architecture
//!
//! ```text
//! sample-capture-core (this crate)
//! ├── traits/       ← CaptureSource, CaptureOutput, BufferSink, AudioConverter
//! ├── models/       ← errors, states, configuration, PcmBuffer, SampleMetadata, etc.
//! ├── processing/   ← PCM conversion, loudness, trim ranges, WAV header generation
//! ├── storage/      ← SinkWriter, filename grammar, metadata sidecars
//! ├── session/      ← StreamController, Recorder
//! ├── processor/    ← decode, convert (ffmpeg), promote, SampleProcessor
//! ├── catalog/      ← SampleCatalog, DirectoryWatcher, CatalogService
//! └── sources/      ← ManualSource
//! ```

pub mod catalog;
pub mod events;
pub mod models;
pub mod processing;
pub mod processor;
pub mod session;
pub mod sources;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use catalog::index::{CatalogNotification, SampleCatalog};
pub use catalog::service::{CatalogEvent, CatalogHandle, CatalogService};
pub use models::audio_models::{CaptureTarget, LevelEvent, PcmBuffer, SampleLayout, SessionHandle};
pub use models::config::{CaptureConfiguration, LibraryConfig, TagIndexPolicy};
pub use models::error::{CaptureError, ProcessError};
pub use models::recording::{ActiveRecording, CaptureSummary, FinishedRecording};
pub use models::sample::{EditConfiguration, Sample, SampleMetadata, TargetFormat, TrimWindow};
pub use models::state::{RecorderStatus, SessionState};
pub use processor::convert::FfmpegConverter;
pub use processor::pipeline::{ProcessRequest, ProcessTask, ProcessedSample, SampleProcessor};
pub use session::controller::StreamController;
pub use session::orchestrator::{Recorder, RecorderEvent};
pub use sources::{ManualFeed, ManualSource};
pub use storage::sink_writer::SinkWriter;
pub use traits::capture_source::{BufferSink, CaptureOutput, CaptureSource};
pub use traits::converter::AudioConverter;
