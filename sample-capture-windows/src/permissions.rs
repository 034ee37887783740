//! Loopback availability and permission probe.
//!
//! WASAPI loopback on unpackaged desktop apps needs no consent prompt, but
//! group policy or a sandboxed (AppContainer) process can still deny access
//! to the render endpoint. Opening an `IAudioClient` on the default render
//! device is the cheapest reliable way to find out before capture starts.

use windows::Win32::Foundation::{E_ACCESSDENIED, E_NOTFOUND};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use sample_capture_core::models::audio_models::CaptureTarget;
use sample_capture_core::models::error::CaptureSetupError;

/// Resolve the default render endpoint and check it can be opened.
///
/// Returns `NoTarget` if there is no active render device and
/// `PermissionDenied` if activation is refused.
pub fn probe_default_render_endpoint() -> Result<CaptureTarget, CaptureSetupError> {
    unsafe {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(|e| CaptureSetupError::Platform(format!("CoInitializeEx failed: {}", e)))?;
        let _com_guard = crate::wasapi_loopback::CoUninitializeGuard;

        probe_inner()
    }
}

unsafe fn probe_inner() -> Result<CaptureTarget, CaptureSetupError> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
        .map_err(|e| CaptureSetupError::Platform(format!("failed to create enumerator: {}", e)))?;

    let device = match enumerator.GetDefaultAudioEndpoint(eRender, eConsole) {
        Ok(device) => device,
        Err(e) if e.code() == E_NOTFOUND => return Err(CaptureSetupError::NoTarget),
        Err(e) => {
            log::warn!("GetDefaultAudioEndpoint failed: {}", e);
            return Err(CaptureSetupError::NoTarget);
        }
    };

    let id = match device.GetId() {
        Ok(raw) => {
            let id = raw.to_string().unwrap_or_default();
            CoTaskMemFree(Some(raw.0 as *const _));
            id
        }
        Err(e) => return Err(CaptureSetupError::Platform(format!("GetId failed: {}", e))),
    };

    let activated: windows::core::Result<IAudioClient> = device.Activate(CLSCTX_ALL, None);
    match activated {
        Ok(_) => Ok(CaptureTarget {
            id,
            name: "System Audio (Loopback)".into(),
            is_default: true,
        }),
        Err(e) if e.code() == E_ACCESSDENIED => Err(CaptureSetupError::PermissionDenied),
        Err(e) => Err(CaptureSetupError::Platform(format!("Activate failed: {}", e))),
    }
}
