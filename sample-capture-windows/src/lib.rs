//! # sample-capture-windows
//!
//! Windows WASAPI backend for sample-capture-kit.
//!
//! Provides:
//! - `WasapiLoopbackSource` — system audio capture via WASAPI loopback on the default render endpoint
//! - `permissions` — render endpoint availability and access probe
//!
//! ## Platform Requirements
//! - Windows 7+ for `AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM` in shared mode
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use sample_capture_core::{CaptureConfiguration, Recorder};
//! use sample_capture_windows::WasapiLoopbackSource;
//!
//! let recorder = Recorder::new(WasapiLoopbackSource::new(), CaptureConfiguration::default());
//! recorder.start()?;
//! ```

#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod wasapi_loopback;

#[cfg(target_os = "windows")]
pub use wasapi_loopback::WasapiLoopbackSource;
