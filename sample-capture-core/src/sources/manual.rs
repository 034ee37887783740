//! Capture source fed in-process.
//!
//! Useful for bridging taps that already produce PCM elsewhere, and for
//! driving the pipeline in tests without audio hardware.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{CaptureTarget, PcmBuffer, SessionHandle};
use crate::models::config::CaptureConfiguration;
use crate::models::error::{CaptureError, CaptureRuntimeError, CaptureSetupError};
use crate::traits::capture_source::{CaptureOutput, CaptureSource};

#[derive(Default)]
struct ManualState {
    output: Option<CaptureOutput>,
    sample_rate: u32,
    channels: u16,
    frames_delivered: u64,
}

/// A capture source whose buffers are pushed through a [`ManualFeed`].
pub struct ManualSource {
    state: Arc<Mutex<ManualState>>,
    target: CaptureTarget,
    setup_error: Option<CaptureSetupError>,
    prepared: bool,
}

/// Producer side of a [`ManualSource`].
#[derive(Clone)]
pub struct ManualFeed {
    state: Arc<Mutex<ManualState>>,
}

impl ManualSource {
    pub fn new() -> (Self, ManualFeed) {
        let state = Arc::new(Mutex::new(ManualState::default()));
        let source = Self {
            state: Arc::clone(&state),
            target: CaptureTarget {
                id: "manual".into(),
                name: "Manual feed".into(),
                is_default: true,
            },
            setup_error: None,
            prepared: false,
        };
        (source, ManualFeed { state })
    }

    /// A source whose `setup` always fails with `error`.
    pub fn failing_setup(error: CaptureSetupError) -> (Self, ManualFeed) {
        let (mut source, feed) = Self::new();
        source.setup_error = Some(error);
        (source, feed)
    }
}

impl CaptureSource for ManualSource {
    fn setup(&mut self, config: &CaptureConfiguration) -> Result<SessionHandle, CaptureSetupError> {
        if let Some(error) = &self.setup_error {
            return Err(error.clone());
        }

        {
            let mut state = self.state.lock();
            state.sample_rate = config.sample_rate;
            state.channels = config.channels;
            state.frames_delivered = 0;
        }
        self.prepared = true;

        Ok(SessionHandle {
            session_id: uuid::Uuid::new_v4().to_string(),
            target: self.target.clone(),
            sample_rate: config.sample_rate,
            channels: config.channels,
        })
    }

    fn start(&mut self, output: CaptureOutput) -> Result<(), CaptureError> {
        if !self.prepared {
            return Err(CaptureError::InvalidState("manual source not set up".into()));
        }
        let mut state = self.state.lock();
        if state.output.is_some() {
            return Err(CaptureError::InvalidState("manual source already running".into()));
        }
        state.output = Some(output);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.state.lock().output = None;
        self.prepared = false;
        Ok(())
    }

    fn target(&self) -> Option<CaptureTarget> {
        Some(self.target.clone())
    }
}

impl ManualFeed {
    /// Deliver interleaved samples stamped at the running frame position.
    pub fn push(&self, interleaved: Vec<f32>) -> bool {
        let mut state = self.state.lock();
        let Some(output) = state.output.clone() else {
            return false;
        };
        let channels = state.channels.max(1);
        let timestamp = Duration::from_secs_f64(state.frames_delivered as f64 / state.sample_rate.max(1) as f64);
        let buffer = PcmBuffer::interleaved(timestamp, channels, interleaved);
        state.frames_delivered += buffer.frame_count as u64;
        output.deliver(buffer)
    }

    /// Deliver a prebuilt buffer as-is.
    pub fn push_buffer(&self, buffer: PcmBuffer) -> bool {
        let mut state = self.state.lock();
        let Some(output) = state.output.clone() else {
            return false;
        };
        state.frames_delivered += buffer.frame_count as u64;
        output.deliver(buffer)
    }

    /// Simulate an unrecoverable capture failure.
    pub fn fail(&self, reason: &str) {
        let output = self.state.lock().output.clone();
        if let Some(output) = output {
            output.fail(CaptureRuntimeError::StoppedUnexpectedly(reason.to_string()));
        }
    }

    /// Whether a running session is attached and still registered.
    pub fn is_live(&self) -> bool {
        self.state
            .lock()
            .output
            .as_ref()
            .map(CaptureOutput::is_registered)
            .unwrap_or(false)
    }
}
