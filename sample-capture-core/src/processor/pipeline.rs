use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crate::catalog::service::CatalogHandle;
use crate::models::config::LibraryConfig;
use crate::models::error::ProcessError;
use crate::models::sample::{EditConfiguration, SampleMetadata};
use crate::processor::convert::{self, FfmpegConverter};
use crate::processor::{decode, promote};
use crate::storage::naming;
use crate::storage::sidecar::{self, SampleSidecar};
use crate::traits::converter::AudioConverter;

/// One unit of work for the [`SampleProcessor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    pub source: PathBuf,
    pub metadata: SampleMetadata,
    pub edit: Option<EditConfiguration>,
}

impl ProcessRequest {
    pub fn new(source: impl Into<PathBuf>, metadata: SampleMetadata) -> Self {
        Self {
            source: source.into(),
            metadata,
            edit: None,
        }
    }

    pub fn with_edit(mut self, edit: EditConfiguration) -> Self {
        self.edit = Some(edit);
        self
    }
}

/// A sample that made it into a catalog directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSample {
    /// Sample id, also recorded in the sidecar when one is written.
    pub id: String,
    pub path: PathBuf,
    /// Metadata as it reads back from the filename, plus the description.
    pub metadata: SampleMetadata,
    pub duration_secs: f64,
    pub sidecar: Option<PathBuf>,
    /// Whether the source was deleted afterwards.
    pub source_removed: bool,
}

/// Handle to a processing call running on its own thread.
pub struct ProcessTask {
    handle: thread::JoinHandle<Result<ProcessedSample, ProcessError>>,
}

impl ProcessTask {
    /// Run `job` on a new "sample-processor" thread.
    pub(crate) fn spawn<F>(job: F) -> io::Result<Self>
    where
        F: FnOnce() -> Result<ProcessedSample, ProcessError> + Send + 'static,
    {
        let handle = thread::Builder::new().name("sample-processor".into()).spawn(job)?;
        Ok(Self { handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the task completes.
    pub fn wait(self) -> Result<ProcessedSample, ProcessError> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(ProcessError::Task("processing thread panicked".into())))
    }
}

/// Turns a raw or existing audio file into a catalogued sample.
///
/// ```text
/// decode → trim → stage (WAV) → convert → name → promote → cleanup
/// ```
///
/// Every call gets its own staging files, so independent calls can run in
/// parallel. On conversion or promotion failure the staging WAV is kept for
/// inspection and the source is never touched.
#[derive(Clone)]
pub struct SampleProcessor {
    staging_dir: PathBuf,
    default_destination: PathBuf,
    converter: Arc<dyn AudioConverter>,
    catalog: Option<CatalogHandle>,
}

impl SampleProcessor {
    pub fn new(library: &LibraryConfig) -> Self {
        Self::with_converter(
            library.staging_dir(),
            library.catalog_root.clone(),
            Arc::new(FfmpegConverter::new(library.ffmpeg_path.clone())),
        )
    }

    pub fn with_converter(
        staging_dir: impl Into<PathBuf>,
        default_destination: impl Into<PathBuf>,
        converter: Arc<dyn AudioConverter>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            default_destination: default_destination.into(),
            converter,
            catalog: None,
        }
    }

    /// Notify `catalog` of every sample promoted into its root.
    pub fn attach_catalog(&mut self, catalog: CatalogHandle) {
        self.catalog = Some(catalog);
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Run `request` on a new "sample-processor" thread.
    pub fn spawn(&self, request: ProcessRequest) -> Result<ProcessTask, ProcessError> {
        let processor = self.clone();
        ProcessTask::spawn(move || processor.process(&request))
            .map_err(|e| ProcessError::Task(format!("failed to spawn processing thread: {}", e)))
    }

    /// Run the full pipeline for one request on the calling thread.
    pub fn process(&self, request: &ProcessRequest) -> Result<ProcessedSample, ProcessError> {
        let edit = request
            .edit
            .clone()
            .unwrap_or_else(|| EditConfiguration::new(self.default_destination.clone()));
        let format = edit.format.unwrap_or(request.metadata.format);

        log::info!(
            "Processing {} as '{}' ({})",
            request.source.display(),
            request.metadata.title,
            format.name()
        );

        let mut audio = decode::decode_file(&request.source, &self.staging_dir, self.converter.as_ref())?;
        if let Some(window) = &edit.trim {
            audio = audio.trimmed(window)?;
        }
        let duration_secs = audio.duration_secs();

        fs::create_dir_all(&self.staging_dir)
            .map_err(|e| ProcessError::Staging(format!("{}: {}", self.staging_dir.display(), e)))?;
        let job = uuid::Uuid::new_v4();
        let staging = self.staging_dir.join(format!("staging_{}.wav", job));
        audio.write_wav(&staging).map_err(ProcessError::Staging)?;
        drop(audio);

        let converted = self
            .staging_dir
            .join(format!("converted_{}.{}", job, format.extension()));
        if let Err(e) = convert::convert(&staging, &converted, format, self.converter.as_ref()) {
            log::error!("Conversion failed; staging file kept at {}", staging.display());
            remove_quietly(&converted);
            return Err(e.into());
        }

        let metadata = naming::canonical_metadata(&request.metadata, format);
        let filename = naming::canonical_filename(&request.metadata, format);
        let target = edit.destination.join(&filename);
        let replaces_source = edit.delete_after_complete && same_file(&request.source, &target);

        let path = match promote::promote(&converted, &edit.destination, &filename, replaces_source) {
            Ok(path) => path,
            Err(e) => {
                log::error!("Promotion failed; staging file kept at {}", staging.display());
                remove_quietly(&converted);
                return Err(e.into());
            }
        };
        remove_quietly(&staging);

        let id = job.to_string();
        let sidecar = self.write_sidecar(&id, &metadata, &path, duration_secs);

        let source_removed = if replaces_source {
            true
        } else if edit.delete_after_complete {
            self.remove_source(&request.source)
        } else {
            false
        };

        if let Some(catalog) = &self.catalog {
            catalog.notify_added(path.clone());
            if source_removed && !replaces_source {
                catalog.notify_removed(request.source.clone());
            }
        }

        Ok(ProcessedSample {
            id,
            path,
            metadata,
            duration_secs,
            sidecar,
            source_removed,
        })
    }

    fn write_sidecar(&self, id: &str, metadata: &SampleMetadata, path: &Path, duration_secs: f64) -> Option<PathBuf> {
        metadata.description.as_ref()?;
        match sidecar::write_sidecar(&SampleSidecar::new(id, metadata, duration_secs), path) {
            Ok(written) => Some(written),
            Err(e) => {
                log::warn!("Sample promoted without sidecar: {}", e);
                None
            }
        }
    }

    fn remove_source(&self, source: &Path) -> bool {
        match fs::remove_file(source) {
            Ok(()) => {
                let old_sidecar = sidecar::sidecar_path(source);
                if old_sidecar.exists() {
                    remove_quietly(&old_sidecar);
                }
                true
            }
            Err(e) => {
                log::warn!("Sample promoted but source {} was not deleted: {}", source.display(), e);
                false
            }
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
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
    use crate::models::error::{CatalogMoveError, ConversionError, DecodeError, TrimRangeError};
    use crate::models::sample::{TargetFormat, TrimWindow};
    use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

    struct FailingConverter;

    impl AudioConverter for FailingConverter {
        fn encode(&self, _: &Path, _: &Path, format: TargetFormat) -> Result<(), ConversionError> {
            Err(ConversionError::Failed {
                format: format.name().into(),
                reason: "encoder exploded".into(),
            })
        }

        fn decode_to_wav(&self, _: &Path, _: &Path) -> Result<(), ConversionError> {
            Err(ConversionError::ToolNotFound("no decoder".into()))
        }
    }

    /// Copies the input verbatim, standing in for an encoder.
    struct CopyConverter;

    impl AudioConverter for CopyConverter {
        fn encode(&self, input: &Path, output: &Path, _: TargetFormat) -> Result<(), ConversionError> {
            fs::copy(input, output).map(|_| ()).map_err(|e| ConversionError::Failed {
                format: "copy".into(),
                reason: e.to_string(),
            })
        }

        fn decode_to_wav(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
            self.encode(input, output, TargetFormat::Wav)
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn staging(&self) -> PathBuf {
            self.dir.path().join("staging")
        }

        fn catalog(&self) -> PathBuf {
            self.dir.path().join("catalog")
        }

        fn processor(&self, converter: Arc<dyn AudioConverter>) -> SampleProcessor {
            SampleProcessor::with_converter(self.staging(), self.catalog(), converter)
        }

        /// One second of 48 kHz stereo.
        fn raw_recording(&self) -> PathBuf {
            let path = self.dir.path().join("recording.wav");
            let spec = WavSpec {
                channels: 2,
                sample_rate: 48_000,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            };
            let mut writer = WavWriter::create(&path, spec).unwrap();
            for i in 0..96_000 {
                writer.write_sample(((i % 200) as i16 - 100) * 100).unwrap();
            }
            writer.finalize().unwrap();
            path
        }

        fn staging_files(&self) -> Vec<PathBuf> {
            match fs::read_dir(self.staging()) {
                Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    fn kick() -> SampleMetadata {
        SampleMetadata::new("kick", TargetFormat::Wav).with_tags(["drum", "808"])
    }

    #[test]
    fn wav_sample_is_promoted_with_canonical_name() {
        let fx = Fixture::new();
        let source = fx.raw_recording();
        let processor = fx.processor(Arc::new(FailingConverter));

        let request = ProcessRequest::new(&source, kick())
            .with_edit(EditConfiguration::new(fx.catalog()).delete_after_complete(true));
        let sample = processor.process(&request).unwrap();

        assert_eq!(sample.path, fx.catalog().join("kick--drum_808.wav"));
        assert!(sample.path.exists());
        assert!(sample.source_removed);
        assert!(!source.exists());
        assert!(fx.staging_files().is_empty());
        assert!((sample.duration_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn without_edit_configuration_source_is_kept() {
        let fx = Fixture::new();
        let source = fx.raw_recording();
        let processor = fx.processor(Arc::new(FailingConverter));

        let sample = processor.process(&ProcessRequest::new(&source, kick())).unwrap();
        assert_eq!(sample.path.parent(), Some(fx.catalog().as_path()));
        assert!(!sample.source_removed);
        assert!(source.exists());
    }

    #[test]
    fn trim_shortens_output() {
        let fx = Fixture::new();
        let source = fx.raw_recording();
        let processor = fx.processor(Arc::new(FailingConverter));

        let edit = EditConfiguration::new(fx.catalog()).with_trim(TrimWindow::new(0.25, 0.75));
        let sample = processor.process(&ProcessRequest::new(&source, kick()).with_edit(edit)).unwrap();

        let reader = WavReader::open(&sample.path).unwrap();
        assert_eq!(reader.duration(), 24_000);
        assert!((sample.duration_secs - 0.5).abs() < 1e-9);
    }

    #[test]
    fn degenerate_trim_produces_nothing() {
        let fx = Fixture::new();
        let source = fx.raw_recording();
        let processor = fx.processor(Arc::new(FailingConverter));

        let edit = EditConfiguration::new(fx.catalog())
            .with_trim(TrimWindow::new(0.8, 0.2))
            .delete_after_complete(true);
        let result = processor.process(&ProcessRequest::new(&source, kick()).with_edit(edit));

        assert!(matches!(result, Err(ProcessError::Trim(TrimRangeError::EmptyWindow { .. }))));
        assert!(source.exists());
        assert!(!fx.catalog().exists());
    }

    #[test]
    fn conversion_failure_keeps_staging_and_source() {
        let fx = Fixture::new();
        let source = fx.raw_recording();
        let processor = fx.processor(Arc::new(FailingConverter));

        let edit = EditConfiguration::new(fx.catalog())
            .with_format(TargetFormat::Mp3)
            .delete_after_complete(true);
        let result = processor.process(&ProcessRequest::new(&source, kick()).with_edit(edit));

        assert!(matches!(result, Err(ProcessError::Conversion(ConversionError::Failed { .. }))));
        assert!(source.exists());
        let staged = fx.staging_files();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].file_name().unwrap().to_string_lossy().starts_with("staging_"));
    }

    #[test]
    fn format_override_changes_extension() {
        let fx = Fixture::new();
        let source = fx.raw_recording();
        let processor = fx.processor(Arc::new(CopyConverter));

        let edit = EditConfiguration::new(fx.catalog()).with_format(TargetFormat::Aac);
        let sample = processor.process(&ProcessRequest::new(&source, kick()).with_edit(edit)).unwrap();

        assert_eq!(sample.path, fx.catalog().join("kick--drum_808.m4a"));
        assert_eq!(sample.metadata.format, TargetFormat::Aac);
    }

    #[test]
    fn collision_is_reported_and_source_kept() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.catalog()).unwrap();
        fs::write(fx.catalog().join("kick--drum_808.wav"), b"existing").unwrap();
        let source = fx.raw_recording();
        let processor = fx.processor(Arc::new(FailingConverter));

        let edit = EditConfiguration::new(fx.catalog()).delete_after_complete(true);
        let result = processor.process(&ProcessRequest::new(&source, kick()).with_edit(edit));

        assert!(matches!(result, Err(ProcessError::Move(CatalogMoveError::Collision(_)))));
        assert!(source.exists());
        assert_eq!(fs::read(fx.catalog().join("kick--drum_808.wav")).unwrap(), b"existing");
    }

    #[test]
    fn reprocessing_in_place_replaces_sample() {
        let fx = Fixture::new();
        let processor = fx.processor(Arc::new(FailingConverter));
        let first = processor
            .process(&ProcessRequest::new(fx.raw_recording(), kick()))
            .unwrap();

        let edit = EditConfiguration::new(fx.catalog())
            .with_trim(TrimWindow::new(0.0, 0.5))
            .delete_after_complete(true);
        let second = processor
            .process(&ProcessRequest::new(&first.path, kick()).with_edit(edit))
            .unwrap();

        assert_eq!(second.path, first.path);
        assert!(second.source_removed);
        assert_eq!(WavReader::open(&second.path).unwrap().duration(), 24_000);
    }

    #[test]
    fn missing_source_is_decode_error() {
        let fx = Fixture::new();
        let processor = fx.processor(Arc::new(FailingConverter));
        let result = processor.process(&ProcessRequest::new(fx.dir.path().join("nope.wav"), kick()));
        assert!(matches!(result, Err(ProcessError::Decode(DecodeError::NotFound(_)))));
    }

    #[test]
    fn description_is_written_to_sidecar() {
        let fx = Fixture::new();
        let processor = fx.processor(Arc::new(FailingConverter));
        let metadata = kick().with_description("tight and punchy");

        let sample = processor
            .process(&ProcessRequest::new(fx.raw_recording(), metadata))
            .unwrap();

        let sidecar_path = sample.sidecar.unwrap();
        assert!(sidecar_path.exists());
        let read = sidecar::read_sidecar(&sample.path).unwrap();
        assert_eq!(read.description.as_deref(), Some("tight and punchy"));
        assert_eq!(read.id, sample.id);

        let catalogued = crate::models::sample::Sample::from_path(&sample.path).unwrap();
        assert_eq!(catalogued.id, sample.id);
    }

    #[test]
    fn spawned_task_completes() {
        let fx = Fixture::new();
        let processor = fx.processor(Arc::new(FailingConverter));
        let task = processor
            .spawn(ProcessRequest::new(fx.raw_recording(), kick()))
            .unwrap();
        let sample = task.wait().unwrap();
        assert!(sample.path.exists());
    }

    #[test]
    fn tasks_run_on_the_processor_thread() {
        let task = ProcessTask::spawn(|| {
            let name = thread::current().name().unwrap_or_default().to_string();
            Err(ProcessError::Task(name))
        })
        .unwrap();
        assert_eq!(task.wait(), Err(ProcessError::Task("sample-processor".into())));
    }

    #[test]
    fn panicking_task_becomes_an_error() {
        let task = ProcessTask::spawn(|| panic!("boom")).unwrap();
        assert!(matches!(task.wait(), Err(ProcessError::Task(_))));
    }
}
