use serde::Serialize;

use super::error::CaptureRuntimeError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// uninitialized → prepared → capturing → stopped
///                               ↓
///                            errored
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Prepared,
    Capturing,
    Stopped,
    Errored(CaptureRuntimeError),
}

impl SessionState {
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Errored(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Prepared => "prepared",
            Self::Capturing => "capturing",
            Self::Stopped => "stopped",
            Self::Errored(_) => "errored",
        }
    }
}

/// Recorder status as presented to collaborators.
///
/// `Busy` means a finalize task is running. It is advisory only: it never
/// blocks another `start` or another processing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    Idle,
    Recording,
    Busy,
}

impl RecorderStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }
}
