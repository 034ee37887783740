use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::events::EventBus;
use crate::models::audio_models::LevelEvent;
use crate::models::config::CaptureConfiguration;
use crate::models::error::{CaptureError, ProcessError, WriterError};
use crate::models::recording::{ActiveRecording, FinishedRecording};
use crate::models::sample::{EditConfiguration, SampleMetadata};
use crate::models::state::RecorderStatus;
use crate::processing::wav_format::SinkFormat;
use crate::processor::pipeline::{ProcessRequest, ProcessTask, ProcessedSample, SampleProcessor};
use crate::session::controller::StreamController;
use crate::storage::sink_writer::SinkWriter;
use crate::traits::capture_source::CaptureSource;

/// What the recorder reports to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    StatusChanged(RecorderStatus),
    /// Whole seconds since the current recording started.
    Elapsed { secs: u64 },
    /// The capture failed. Audio written up to the failure is kept and
    /// reported by a following `Stopped`.
    CaptureFailed(CaptureError),
    /// A recording stopped and now awaits finalize or discard.
    Stopped(FinishedRecording),
    Finalized {
        recording_id: String,
        result: Result<ProcessedSample, ProcessError>,
    },
}

/// Ticks [`RecorderEvent::Elapsed`] once per second on its own thread.
struct ElapsedTicker {
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ElapsedTicker {
    fn start(events: EventBus<RecorderEvent>) -> Result<Self, CaptureError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("elapsed-timer".into())
            .spawn(move || {
                let started = Instant::now();
                let mut secs = 0u64;
                loop {
                    secs += 1;
                    let due = started + Duration::from_secs(secs);
                    let wait = due.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => events.emit(RecorderEvent::Elapsed { secs }),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|_| CaptureError::ThreadSpawn("elapsed-timer".into()))?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    fn cancel(mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct RecordingSession {
    recording: ActiveRecording,
    writer: SinkWriter,
    ticker: ElapsedTicker,
    /// Dropping this wakes the failure watcher so it exits.
    _watch: Sender<()>,
    generation: u64,
}

struct RecorderInner<S: CaptureSource> {
    config: CaptureConfiguration,
    controller: StreamController<S>,
    level_tx: Sender<LevelEvent>,
    session: Option<RecordingSession>,
    pending: Vec<FinishedRecording>,
    finalizing: usize,
    status: RecorderStatus,
    generation: u64,
}

impl<S: CaptureSource> RecorderInner<S> {
    fn refresh_status(&mut self, events: &EventBus<RecorderEvent>) {
        let status = if self.session.is_some() {
            RecorderStatus::Recording
        } else if self.finalizing > 0 {
            RecorderStatus::Busy
        } else {
            RecorderStatus::Idle
        };
        if status != self.status {
            log::info!("Recorder: {:?} → {:?}", self.status, status);
            self.status = status;
            events.emit(RecorderEvent::StatusChanged(status));
        }
    }
}

/// Drives one capture source through record, stop and finalize.
///
/// ```text
/// start() → [source] → [SinkWriter] → raw WAV ─ stop() → pending
///                          └→ levels()                      │
///                         finalize(metadata, edit) → [SampleProcessor]
/// ```
///
/// Status is `recording` while a session runs, `busy` while any finalize
/// task runs, and `idle` otherwise. `busy` never blocks `start`.
///
/// Raw files are deleted only by [`discard`](Self::discard), by a finalize
/// that asks for deletion, or when `start` fails before capturing.
pub struct Recorder<S: CaptureSource + 'static> {
    shared: Arc<Mutex<RecorderInner<S>>>,
    events: EventBus<RecorderEvent>,
    levels: Receiver<LevelEvent>,
}

impl<S: CaptureSource + 'static> Recorder<S> {
    pub fn new(source: S, config: CaptureConfiguration) -> Self {
        let (level_tx, levels) = crossbeam_channel::bounded(config.level_event_capacity.max(1));
        let inner = RecorderInner {
            config,
            controller: StreamController::new(source),
            level_tx,
            session: None,
            pending: Vec::new(),
            finalizing: 0,
            status: RecorderStatus::Idle,
            generation: 0,
        };
        Self {
            shared: Arc::new(Mutex::new(inner)),
            events: EventBus::new(),
            levels,
        }
    }

    pub fn status(&self) -> RecorderStatus {
        self.shared.lock().status
    }

    pub fn subscribe(&self) -> Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    /// Loudness of each written buffer. Lossy: events that do not fit the
    /// configured capacity are dropped.
    pub fn levels(&self) -> Receiver<LevelEvent> {
        self.levels.clone()
    }

    /// Recordings that stopped, cleanly or not, and were not finalized or
    /// discarded yet.
    pub fn pending(&self) -> Vec<FinishedRecording> {
        self.shared.lock().pending.clone()
    }

    /// Start a new recording. A no-op while already recording.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut inner = self.shared.lock();
        if inner.session.is_some() {
            log::info!("Recorder already recording; ignoring start");
            return Ok(());
        }

        let recording = ActiveRecording::create_in(&inner.config.recordings_dir)?;
        let format = SinkFormat::from_config(&inner.config);
        let writer = match SinkWriter::open(recording.temp_path.clone(), format, inner.level_tx.clone()) {
            Ok(writer) => writer,
            Err(e) => {
                remove_raw(&recording);
                return Err(self.fail_start(e.into()));
            }
        };

        let config = inner.config.clone();
        let begun = inner
            .controller
            .setup(&config)
            .and_then(|_| inner.controller.start_capture(Arc::new(writer.input())));
        if let Err(e) = begun {
            abandon(writer, &recording);
            return Err(self.fail_start(e));
        }

        inner.generation += 1;
        let generation = inner.generation;
        let writer_failures = writer.failures();
        let session = self.start_session_threads(&mut inner, generation, writer_failures).map(|(ticker, watch)| RecordingSession {
            recording: recording.clone(),
            writer,
            ticker,
            _watch: watch,
            generation,
        });
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                let _ = inner.controller.stop_capture();
                remove_raw(&recording);
                return Err(self.fail_start(e));
            }
        };

        log::info!("Recording {} started at {}", recording.id, recording.temp_path.display());
        inner.session = Some(session);
        inner.refresh_status(&self.events);
        Ok(())
    }

    fn fail_start(&self, error: CaptureError) -> CaptureError {
        log::error!("Failed to start recording: {}", error);
        self.events.emit(RecorderEvent::CaptureFailed(error.clone()));
        error
    }

    fn start_session_threads(
        &self,
        inner: &mut RecorderInner<S>,
        generation: u64,
        writer_failures: Receiver<WriterError>,
    ) -> Result<(ElapsedTicker, Sender<()>), CaptureError> {
        let failures = inner
            .controller
            .failures()
            .ok_or_else(|| CaptureError::InvalidState("capture started without a failure channel".into()))?;
        let ticker = ElapsedTicker::start(self.events.clone())?;

        let (watch_tx, watch_rx) = crossbeam_channel::bounded::<()>(0);
        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name("capture-events".into())
            .spawn(move || {
                crossbeam_channel::select! {
                    recv(failures) -> failure => {
                        if let Ok(error) = failure {
                            abort_session(&shared, &events, generation, CaptureError::Runtime(error));
                        }
                    }
                    recv(writer_failures) -> failure => {
                        if let Ok(error) = failure {
                            abort_session(&shared, &events, generation, CaptureError::Writer(error));
                        }
                    }
                    recv(watch_rx) -> _ => {}
                }
            });

        match spawned {
            Ok(_) => Ok((ticker, watch_tx)),
            Err(_) => {
                ticker.cancel();
                Err(CaptureError::ThreadSpawn("capture-events".into()))
            }
        }
    }

    /// Stop the current recording. Returns `Ok(None)` if nothing was recording.
    ///
    /// The finished recording stays pending until [`finalize`](Self::finalize)
    /// or [`discard`](Self::discard) is called for it.
    pub fn stop(&self) -> Result<Option<FinishedRecording>, CaptureError> {
        let mut inner = self.shared.lock();
        let Some(session) = inner.session.take() else {
            log::debug!("Recorder not recording; ignoring stop");
            return Ok(None);
        };

        if let Err(e) = inner.controller.stop_capture() {
            log::warn!("Capture source did not stop cleanly: {}", e);
        }
        let RecordingSession {
            recording,
            mut writer,
            ticker,
            ..
        } = session;
        ticker.cancel();

        let summary = match writer.close() {
            Ok(summary) => summary,
            Err(e) => {
                log::error!(
                    "Recording {} could not be finalized; raw file left at {}",
                    recording.id,
                    recording.temp_path.display()
                );
                inner.refresh_status(&self.events);
                let error = CaptureError::from(e);
                self.events.emit(RecorderEvent::CaptureFailed(error.clone()));
                return Err(error);
            }
        };

        log::info!(
            "Recording {} stopped: {} frames ({:.2}s), {} buffers dropped",
            recording.id,
            summary.frames_written,
            summary.duration_secs,
            summary.dropped_buffers
        );
        let finished = FinishedRecording { recording, summary };
        inner.pending.push(finished.clone());
        inner.refresh_status(&self.events);
        self.events.emit(RecorderEvent::Stopped(finished.clone()));
        Ok(Some(finished))
    }

    /// Hand a pending recording to `processor` as a background task.
    ///
    /// Status is `busy` until the task finishes. If processing fails the
    /// recording goes back to the pending list so it can be retried.
    pub fn finalize(
        &self,
        recording_id: &str,
        metadata: SampleMetadata,
        edit: Option<EditConfiguration>,
        processor: &SampleProcessor,
    ) -> Result<ProcessTask, CaptureError> {
        let finished = {
            let mut inner = self.shared.lock();
            let index = inner
                .pending
                .iter()
                .position(|f| f.recording.id == recording_id)
                .ok_or_else(|| CaptureError::InvalidState(format!("no pending recording {}", recording_id)))?;
            let finished = inner.pending.remove(index);
            inner.finalizing += 1;
            inner.refresh_status(&self.events);
            finished
        };

        let mut request = ProcessRequest::new(finished.recording.temp_path.clone(), metadata);
        request.edit = edit;

        let processor = processor.clone();
        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let requeue = finished.clone();
        let spawned = ProcessTask::spawn(move || {
            let result = processor.process(&request);
            {
                let mut inner = shared.lock();
                inner.finalizing -= 1;
                if result.is_err() && requeue.recording.temp_path.exists() {
                    inner.pending.push(requeue.clone());
                }
                inner.refresh_status(&events);
            }
            events.emit(RecorderEvent::Finalized {
                recording_id: requeue.recording.id.clone(),
                result: result.clone(),
            });
            result
        });

        match spawned {
            Ok(task) => Ok(task),
            Err(_) => {
                let mut inner = self.shared.lock();
                inner.finalizing -= 1;
                inner.pending.push(finished);
                inner.refresh_status(&self.events);
                Err(CaptureError::ThreadSpawn("sample-processor".into()))
            }
        }
    }

    /// Drop a pending recording and delete its raw file.
    pub fn discard(&self, recording_id: &str) -> Result<(), CaptureError> {
        let finished = {
            let mut inner = self.shared.lock();
            let index = inner
                .pending
                .iter()
                .position(|f| f.recording.id == recording_id)
                .ok_or_else(|| CaptureError::InvalidState(format!("no pending recording {}", recording_id)))?;
            inner.pending.remove(index)
        };
        fs::remove_file(&finished.recording.temp_path).map_err(|e| {
            CaptureError::StorageError(format!(
                "failed to delete {}: {}",
                finished.recording.temp_path.display(),
                e
            ))
        })?;
        log::info!("Discarded recording {}", recording_id);
        Ok(())
    }
}

impl<S: CaptureSource + 'static> Drop for Recorder<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Recorder dropped while recording: {}", e);
        }
    }
}

/// Tear down the session of `generation` after a capture or writer failure.
///
/// The writer is closed and whatever it wrote becomes a pending recording.
fn abort_session<S: CaptureSource>(
    shared: &Mutex<RecorderInner<S>>,
    events: &EventBus<RecorderEvent>,
    generation: u64,
    error: CaptureError,
) {
    let mut inner = shared.lock();
    if inner.session.as_ref().map(|s| s.generation) != Some(generation) {
        return;
    }
    match &error {
        CaptureError::Runtime(runtime) => {
            inner.controller.handle_failure(runtime.clone());
        }
        _ => {
            if let Err(e) = inner.controller.stop_capture() {
                log::warn!("Capture source did not stop cleanly: {}", e);
            }
        }
    }

    let Some(RecordingSession {
        recording,
        mut writer,
        ticker,
        ..
    }) = inner.session.take()
    else {
        return;
    };
    ticker.cancel();
    log::error!("Recording {} aborted: {}", recording.id, error);
    events.emit(RecorderEvent::CaptureFailed(error));

    let partial = match writer.close() {
        Ok(summary) => Some(FinishedRecording { recording, summary }),
        Err(e) => {
            log::error!(
                "Partial recording could not be finalized; raw file left at {}: {}",
                recording.temp_path.display(),
                e
            );
            None
        }
    };
    inner.refresh_status(events);
    if let Some(finished) = partial {
        inner.pending.push(finished.clone());
        events.emit(RecorderEvent::Stopped(finished));
    }
}

fn abandon(mut writer: SinkWriter, recording: &ActiveRecording) {
    if let Err(e) = writer.close() {
        log::debug!("Sink writer for {} closed with error: {}", recording.id, e);
    }
    drop(writer);
    remove_raw(recording);
}

fn remove_raw(recording: &ActiveRecording) {
    if recording.temp_path.exists() {
        if let Err(e) = fs::remove_file(&recording.temp_path) {
            log::warn!("Failed to remove {}: {}", recording.temp_path.display(), e);
        }
    }
}
