use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::models::audio_models::SessionHandle;
use crate::models::config::CaptureConfiguration;
use crate::models::error::{CaptureError, CaptureRuntimeError};
use crate::models::state::SessionState;
use crate::traits::capture_source::{BufferSink, CaptureOutput, CaptureSource};

/// Owns the lifecycle of one capture session at a time.
///
/// ```text
/// uninitialized → prepared → capturing → stopped
///                               ↓
///                            errored
/// ```
///
/// Runtime failures are reported at most once per session on the receiver
/// returned by [`failures`](Self::failures). The owner then calls
/// [`handle_failure`](Self::handle_failure) to perform the implicit stop.
pub struct StreamController<S: CaptureSource> {
    source: S,
    state: SessionState,
    handle: Option<SessionHandle>,
    output: Option<CaptureOutput>,
    failures: Option<Receiver<CaptureRuntimeError>>,
}

impl<S: CaptureSource> StreamController<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: SessionState::Uninitialized,
            handle: None,
            output: None,
            failures: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    /// Failure stream of the current session, if one was started.
    pub fn failures(&self) -> Option<Receiver<CaptureRuntimeError>> {
        self.failures.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Prepare a new session. Transitions: uninitialized/stopped/errored → prepared.
    pub fn setup(&mut self, config: &CaptureConfiguration) -> Result<SessionHandle, CaptureError> {
        if self.state.is_capturing() {
            return Err(CaptureError::InvalidState("cannot set up while capturing".into()));
        }
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        let handle = match self.source.setup(config) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Capture setup failed: {}", e);
                self.state = SessionState::Uninitialized;
                self.handle = None;
                return Err(e.into());
            }
        };

        log::info!(
            "Capture session {} prepared on '{}' ({} Hz, {} ch)",
            handle.session_id,
            handle.target.name,
            handle.sample_rate,
            handle.channels
        );
        self.handle = Some(handle.clone());
        self.set_state(SessionState::Prepared);
        Ok(handle)
    }

    /// Start delivering buffers to `sink`. Transitions: prepared → capturing.
    ///
    /// A second call while capturing is a logged no-op.
    pub fn start_capture(&mut self, sink: Arc<dyn BufferSink>) -> Result<(), CaptureError> {
        match self.state {
            SessionState::Capturing => {
                log::info!("start_capture called while already capturing; ignoring");
                return Ok(());
            }
            SessionState::Prepared => {}
            ref other => {
                return Err(CaptureError::InvalidState(format!(
                    "can only start from prepared state, not {}",
                    other.name()
                )));
            }
        }

        let (failures_tx, failures_rx) = crossbeam_channel::unbounded();
        let output = CaptureOutput::new(sink, failures_tx);

        if let Err(e) = self.source.start(output.clone()) {
            output.deregister();
            log::error!("Capture start failed: {}", e);
            self.set_state(SessionState::Uninitialized);
            return Err(e);
        }

        self.output = Some(output);
        self.failures = Some(failures_rx);
        self.set_state(SessionState::Capturing);
        Ok(())
    }

    /// Stop the session. Transitions: capturing → stopped.
    ///
    /// The output is deregistered before the source is stopped so a buffer
    /// racing with teardown is discarded instead of written.
    pub fn stop_capture(&mut self) -> Result<(), CaptureError> {
        if !self.state.is_capturing() {
            log::debug!("stop_capture in state {}; nothing to do", self.state.name());
            return Ok(());
        }

        if let Some(output) = self.output.take() {
            output.deregister();
        }
        let result = self.source.stop();
        self.set_state(SessionState::Stopped);
        result
    }

    /// Implicit stop after a runtime failure. Transitions: capturing → errored.
    ///
    /// Returns `false` if the session was no longer capturing.
    pub fn handle_failure(&mut self, error: CaptureRuntimeError) -> bool {
        if !self.state.is_capturing() {
            return false;
        }

        log::error!("Capture failed: {}", error);
        if let Some(output) = self.output.take() {
            output.deregister();
        }
        if let Err(e) = self.source.stop() {
            log::warn!("Failed to release capture source after error: {}", e);
        }
        self.set_state(SessionState::Errored(error));
        true
    }

    fn set_state(&mut self, state: SessionState) {
        log::debug!("Capture session: {} → {}", self.state.name(), state.name());
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::PcmBuffer;
    use crate::models::error::CaptureSetupError;
    use crate::sources::{ManualFeed, ManualSource};

    fn prepared() -> (StreamController<ManualSource>, ManualFeed) {
        let (source, feed) = ManualSource::new();
        let mut controller = StreamController::new(source);
        controller.setup(&CaptureConfiguration::default()).unwrap();
        (controller, feed)
    }

    #[test]
    fn lifecycle_transitions() {
        let (mut controller, feed) = prepared();
        assert_eq!(controller.state(), &SessionState::Prepared);

        let (buffers_tx, buffers_rx) = crossbeam_channel::unbounded::<PcmBuffer>();
        controller.start_capture(Arc::new(buffers_tx)).unwrap();
        assert_eq!(controller.state(), &SessionState::Capturing);

        assert!(feed.push(vec![0.1; 8]));
        controller.stop_capture().unwrap();
        assert_eq!(controller.state(), &SessionState::Stopped);
        assert!(!feed.push(vec![0.1; 8]));
        assert_eq!(buffers_rx.try_iter().count(), 1);
    }

    #[test]
    fn second_start_is_a_no_op() {
        let (mut controller, feed) = prepared();
        let (first_tx, first_rx) = crossbeam_channel::unbounded::<PcmBuffer>();
        let (second_tx, second_rx) = crossbeam_channel::unbounded::<PcmBuffer>();

        controller.start_capture(Arc::new(first_tx)).unwrap();
        controller.start_capture(Arc::new(second_tx)).unwrap();
        feed.push(vec![0.0; 4]);

        assert_eq!(first_rx.try_iter().count(), 1);
        assert_eq!(second_rx.try_iter().count(), 0);
    }

    #[test]
    fn start_requires_setup() {
        let (source, _feed) = ManualSource::new();
        let mut controller = StreamController::new(source);
        let (buffers_tx, _buffers_rx) = crossbeam_channel::unbounded::<PcmBuffer>();
        assert!(matches!(
            controller.start_capture(Arc::new(buffers_tx)),
            Err(CaptureError::InvalidState(_))
        ));
    }

    #[test]
    fn setup_surfaces_permission_denied() {
        let (source, _feed) = ManualSource::failing_setup(CaptureSetupError::PermissionDenied);
        let mut controller = StreamController::new(source);
        let result = controller.setup(&CaptureConfiguration::default());
        assert_eq!(result, Err(CaptureError::Setup(CaptureSetupError::PermissionDenied)));
        assert_eq!(controller.state(), &SessionState::Uninitialized);
    }

    #[test]
    fn runtime_failure_is_reported_once_and_stops() {
        let (mut controller, feed) = prepared();
        let (buffers_tx, _buffers_rx) = crossbeam_channel::unbounded::<PcmBuffer>();
        controller.start_capture(Arc::new(buffers_tx)).unwrap();
        let failures = controller.failures().unwrap();

        feed.fail("device unplugged");
        feed.fail("device unplugged again");
        let reported: Vec<_> = failures.try_iter().collect();
        assert_eq!(reported.len(), 1);

        assert!(controller.handle_failure(reported[0].clone()));
        assert!(matches!(controller.state(), SessionState::Errored(_)));
        assert!(!controller.handle_failure(reported[0].clone()));
        assert!(!feed.is_live());
    }

    #[test]
    fn stop_when_not_capturing_is_harmless() {
        let (mut controller, _feed) = prepared();
        controller.stop_capture().unwrap();
        assert_eq!(controller.state(), &SessionState::Prepared);
    }

    #[test]
    fn can_set_up_again_after_stop() {
        let (mut controller, _feed) = prepared();
        let (buffers_tx, _buffers_rx) = crossbeam_channel::unbounded::<PcmBuffer>();
        controller.start_capture(Arc::new(buffers_tx)).unwrap();
        controller.stop_capture().unwrap();
        controller.setup(&CaptureConfiguration::default()).unwrap();
        assert_eq!(controller.state(), &SessionState::Prepared);
    }
}
