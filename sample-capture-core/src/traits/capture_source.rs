use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::models::audio_models::{CaptureTarget, PcmBuffer, SessionHandle};
use crate::models::config::CaptureConfiguration;
use crate::models::error::{CaptureError, CaptureRuntimeError, CaptureSetupError};

/// Destination for captured buffers.
pub trait BufferSink: Send + Sync {
    /// Accept one buffer. Returns `false` if the sink no longer takes buffers.
    fn accept(&self, buffer: PcmBuffer) -> bool;
}

impl BufferSink for Sender<PcmBuffer> {
    fn accept(&self, buffer: PcmBuffer) -> bool {
        self.send(buffer).is_ok()
    }
}

/// Where a running capture source delivers buffers and runtime failures.
///
/// The owner can deregister the output at any time; after that, buffers are
/// discarded and failures are no longer reported. At most one failure is
/// ever reported per output.
#[derive(Clone)]
pub struct CaptureOutput {
    sink: Arc<dyn BufferSink>,
    failures: Sender<CaptureRuntimeError>,
    registered: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
}

impl CaptureOutput {
    pub fn new(sink: Arc<dyn BufferSink>, failures: Sender<CaptureRuntimeError>) -> Self {
        Self {
            sink,
            failures,
            registered: Arc::new(AtomicBool::new(true)),
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Hand a buffer to the sink. Returns `false` if it was discarded.
    pub fn deliver(&self, buffer: PcmBuffer) -> bool {
        if !self.is_registered() {
            return false;
        }
        self.sink.accept(buffer)
    }

    /// Report an unrecoverable failure. The output deregisters itself so no
    /// further buffers get through.
    pub fn fail(&self, error: CaptureRuntimeError) {
        if !self.is_registered() || self.failed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registered.store(false, Ordering::SeqCst);
        let _ = self.failures.send(error);
    }

    pub fn deregister(&self) {
        self.registered.store(false, Ordering::SeqCst);
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }
}

/// Interface for platform-specific audio taps.
///
/// Implemented by:
/// - `ManualSource` (buffers pushed in-process)
/// - `WasapiLoopbackSource` (Windows system audio)
pub trait CaptureSource: Send {
    /// Resolve the capture target and check permissions.
    fn setup(&mut self, config: &CaptureConfiguration) -> Result<SessionHandle, CaptureSetupError>;

    /// Start delivering buffers to `output` in increasing timestamp order.
    ///
    /// Buffers usually arrive on a dedicated capture thread.
    fn start(&mut self, output: CaptureOutput) -> Result<(), CaptureError>;

    /// Stop capturing and release the platform handle.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// The target this source taps, once known.
    fn target(&self) -> Option<CaptureTarget>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn buffer() -> PcmBuffer {
        PcmBuffer::interleaved(Duration::ZERO, 2, vec![0.0; 4])
    }

    #[test]
    fn deregistered_output_discards_buffers() {
        let (buffers_tx, buffers_rx) = crossbeam_channel::unbounded::<PcmBuffer>();
        let (failures_tx, _failures_rx) = crossbeam_channel::unbounded();
        let output = CaptureOutput::new(Arc::new(buffers_tx), failures_tx);

        assert!(output.deliver(buffer()));
        output.deregister();
        assert!(!output.deliver(buffer()));
        assert_eq!(buffers_rx.try_iter().count(), 1);
    }

    #[test]
    fn failure_is_reported_once() {
        let (buffers_tx, _buffers_rx) = crossbeam_channel::unbounded::<PcmBuffer>();
        let (failures_tx, failures_rx) = crossbeam_channel::unbounded();
        let output = CaptureOutput::new(Arc::new(buffers_tx), failures_tx);
        let clone = output.clone();

        output.fail(CaptureRuntimeError::StoppedUnexpectedly("device lost".into()));
        clone.fail(CaptureRuntimeError::StoppedUnexpectedly("again".into()));

        assert_eq!(failures_rx.try_iter().count(), 1);
        assert!(!clone.deliver(buffer()));
    }
}
