//! WASAPI loopback capture source for system audio.
//!
//! Captures the mix going to the default render endpoint using
//! `AUDCLNT_STREAMFLAGS_LOOPBACK`. The stream is opened in the session's
//! fixed format (32-bit float at the configured rate and channel count) and
//! the audio engine converts from the device mix format.
//!
//! ## Notes
//! - DRM-protected audio is silenced in loopback
//! - Only the default render device is tapped
//! - Gaps reported by the engine are logged, not repaired

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use windows::core::PCWSTR;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use sample_capture_core::models::audio_models::{CaptureTarget, PcmBuffer, SessionHandle};
use sample_capture_core::models::config::CaptureConfiguration;
use sample_capture_core::models::error::{CaptureError, CaptureRuntimeError, CaptureSetupError};
use sample_capture_core::traits::capture_source::{CaptureOutput, CaptureSource};

use crate::permissions;

const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

/// 100 ms in 100 ns units.
const BUFFER_DURATION: i64 = 1_000_000;

/// WASAPI loopback capture of the default render device.
pub struct WasapiLoopbackSource {
    target: Option<CaptureTarget>,
    sample_rate: u32,
    channels: u16,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl WasapiLoopbackSource {
    pub fn new() -> Self {
        Self {
            target: None,
            sample_rate: 0,
            channels: 0,
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
        }
    }
}

impl Default for WasapiLoopbackSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for WasapiLoopbackSource {
    fn setup(&mut self, config: &CaptureConfiguration) -> Result<SessionHandle, CaptureSetupError> {
        let target = permissions::probe_default_render_endpoint()?;
        self.sample_rate = config.sample_rate;
        self.channels = config.channels;
        self.target = Some(target.clone());

        Ok(SessionHandle {
            session_id: uuid::Uuid::new_v4().to_string(),
            target,
            sample_rate: config.sample_rate,
            channels: config.channels,
        })
    }

    fn start(&mut self, output: CaptureOutput) -> Result<(), CaptureError> {
        if self.target.is_none() {
            return Err(CaptureError::InvalidState("loopback source not set up".into()));
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::InvalidState("loopback capture already running".into()));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let format = StreamFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        };
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let handle = thread::Builder::new()
            .name("wasapi-loopback-capture".into())
            .spawn(move || {
                if let Err(e) = loopback_capture_loop(&running, format, &output, ready_tx) {
                    log::error!("Loopback capture error: {}", e);
                    output.fail(CaptureRuntimeError::StoppedUnexpectedly(e));
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|_| CaptureError::ThreadSpawn("wasapi-loopback-capture".into()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.capture_handle = Some(handle);
                Ok(())
            }
            Ok(Err(setup)) => {
                let _ = handle.join();
                Err(setup.into())
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureSetupError::Platform("capture thread exited during startup".into()).into())
            }
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("Loopback capture thread panicked");
            }
        }
        Ok(())
    }

    fn target(&self) -> Option<CaptureTarget> {
        self.target.clone()
    }
}

impl Drop for WasapiLoopbackSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[derive(Clone, Copy)]
struct StreamFormat {
    sample_rate: u32,
    channels: u16,
}

impl StreamFormat {
    fn wave_format(&self) -> WAVEFORMATEX {
        let block_align = self.channels * 4;
        WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_IEEE_FLOAT,
            nChannels: self.channels,
            nSamplesPerSec: self.sample_rate,
            nAvgBytesPerSec: self.sample_rate * block_align as u32,
            nBlockAlign: block_align,
            wBitsPerSample: 32,
            cbSize: 0,
        }
    }
}

/// Capture loop running on the dedicated capture thread.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Get default render endpoint
/// 3. Activate IAudioClient
/// 4. Initialize with LOOPBACK and AUTOCONVERTPCM in shared mode
/// 5. Get IAudioCaptureClient
/// 6. Register with MMCSS
/// 7. Start, report ready, poll for buffers
///
/// Errors before step 7 go to `ready`; errors after it are returned.
fn loopback_capture_loop(
    running: &AtomicBool,
    format: StreamFormat,
    output: &CaptureOutput,
    ready: Sender<Result<(), CaptureSetupError>>,
) -> Result<(), String> {
    unsafe {
        let session = match open_stream(format) {
            Ok(session) => session,
            Err(e) => {
                let _ = ready.send(Err(e));
                return Ok(());
            }
        };
        let _ = ready.send(Ok(()));

        let rate = format.sample_rate.max(1) as f64;
        let channels = format.channels;

        // Poll every 10ms
        while running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));

            let mut packet_length = session
                .capture_client
                .GetNextPacketSize()
                .map_err(|e| format!("GetNextPacketSize failed: {}", e))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;
                let mut device_position: u64 = 0;

                session
                    .capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, Some(&mut device_position), None)
                    .map_err(|e| format!("GetBuffer failed: {}", e))?;

                if flags & (AUDCLNT_BUFFERFLAGS_DATA_DISCONTINUITY.0 as u32) != 0 {
                    log::debug!("Loopback discontinuity at frame {}", device_position);
                }

                if num_frames > 0 && !buffer_ptr.is_null() {
                    let total_samples = num_frames as usize * channels as usize;
                    let data = if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        vec![0.0f32; total_samples]
                    } else {
                        std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples).to_vec()
                    };
                    let timestamp = Duration::from_secs_f64(device_position as f64 / rate);
                    output.deliver(PcmBuffer::interleaved(timestamp, channels, data));
                }

                session
                    .capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| format!("ReleaseBuffer failed: {}", e))?;

                packet_length = session
                    .capture_client
                    .GetNextPacketSize()
                    .map_err(|e| format!("GetNextPacketSize failed: {}", e))?;
            }
        }

        let _ = session.audio_client.Stop();
    }

    Ok(())
}

/// COM objects of an open loopback stream. Field order keeps COM alive
/// until the clients are released.
struct LoopbackStream {
    capture_client: IAudioCaptureClient,
    audio_client: IAudioClient,
    _com_guard: CoUninitializeGuard,
}

unsafe fn open_stream(format: StreamFormat) -> Result<LoopbackStream, CaptureSetupError> {
    let platform = |what: &str, e: windows::core::Error| CaptureSetupError::Platform(format!("{} failed: {}", what, e));

    CoInitializeEx(None, COINIT_MULTITHREADED)
        .ok()
        .map_err(|e| platform("CoInitializeEx", e))?;
    let com_guard = CoUninitializeGuard;

    let enumerator: IMMDeviceEnumerator =
        CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|e| platform("CoCreateInstance", e))?;

    // Loopback reads from the render endpoint, not a capture endpoint
    let device = enumerator
        .GetDefaultAudioEndpoint(eRender, eConsole)
        .map_err(|_| CaptureSetupError::NoTarget)?;

    let audio_client: IAudioClient = device.Activate(CLSCTX_ALL, None).map_err(|e| platform("Activate", e))?;

    let wave_format = format.wave_format();
    audio_client
        .Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            AUDCLNT_STREAMFLAGS_LOOPBACK
                | AUDCLNT_STREAMFLAGS_NOPERSIST
                | AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM
                | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
            BUFFER_DURATION,
            0,
            &wave_format,
            None,
        )
        .map_err(|e| platform("IAudioClient::Initialize (loopback)", e))?;

    let capture_client: IAudioCaptureClient = audio_client.GetService().map_err(|e| platform("GetService", e))?;

    // MMCSS registration for real-time priority
    let mut task_index: u32 = 0;
    let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
    if AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index).is_err() {
        log::debug!("MMCSS registration failed; capturing at normal priority");
    }

    audio_client.Start().map_err(|e| platform("IAudioClient::Start", e))?;
    log::info!(
        "Loopback capture started ({} Hz, {} ch)",
        format.sample_rate,
        format.channels
    );

    Ok(LoopbackStream {
        capture_client,
        audio_client,
        _com_guard: com_guard,
    })
}

pub(crate) struct CoUninitializeGuard;

impl Drop for CoUninitializeGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
