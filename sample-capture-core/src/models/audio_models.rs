use std::borrow::Cow;
use std::time::Duration;

use serde::Serialize;

/// How multi-channel samples are arranged in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleLayout {
    /// `[L0, R0, L1, R1, ...]`
    Interleaved,
    /// `[L0, L1, ..., R0, R1, ...]`
    Planar,
}

/// A block of f32 PCM samples delivered by a capture source.
///
/// Samples are normalized to `[-1.0, 1.0]`. `timestamp` is the offset of the
/// first frame from the start of the capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub timestamp: Duration,
    pub frame_count: usize,
    pub channels: u16,
    pub layout: SampleLayout,
    pub data: Vec<f32>,
}

impl PcmBuffer {
    pub fn interleaved(timestamp: Duration, channels: u16, data: Vec<f32>) -> Self {
        let frame_count = if channels == 0 { 0 } else { data.len() / channels as usize };
        Self {
            timestamp,
            frame_count,
            channels,
            layout: SampleLayout::Interleaved,
            data,
        }
    }

    pub fn planar(timestamp: Duration, channels: u16, data: Vec<f32>) -> Self {
        let frame_count = if channels == 0 { 0 } else { data.len() / channels as usize };
        Self {
            timestamp,
            frame_count,
            channels,
            layout: SampleLayout::Planar,
            data,
        }
    }

    /// Check that the buffer is non-empty and its shape matches its data.
    pub fn validate(&self) -> Result<(), String> {
        if self.channels == 0 {
            return Err("buffer has no channels".into());
        }
        if self.frame_count == 0 || self.data.is_empty() {
            return Err("buffer is empty".into());
        }
        let expected = self.frame_count * self.channels as usize;
        if self.data.len() != expected {
            return Err(format!(
                "buffer holds {} samples, expected {} ({} frames x {} channels)",
                self.data.len(),
                expected,
                self.frame_count,
                self.channels
            ));
        }
        if self.data.iter().any(|s| !s.is_finite()) {
            return Err("buffer contains non-finite samples".into());
        }
        Ok(())
    }

    /// Samples in interleaved order, converting planar data if needed.
    pub fn interleaved_samples(&self) -> Cow<'_, [f32]> {
        match self.layout {
            SampleLayout::Interleaved => Cow::Borrowed(&self.data),
            SampleLayout::Planar => Cow::Owned(crate::processing::pcm::planar_to_interleaved(
                &self.data,
                self.channels as usize,
            )),
        }
    }

    pub fn duration(&self, sample_rate: u32) -> Duration {
        Duration::from_secs_f64(self.frame_count as f64 / sample_rate as f64)
    }
}

/// A loudness reading for one written buffer, in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelEvent {
    pub level: f32,
    #[serde(skip)]
    pub timestamp: Duration,
}

/// The audio target a capture source taps (e.g., a render endpoint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Handle returned by a successful capture source setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub target: CaptureTarget,
    pub sample_rate: u32,
    pub channels: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_well_formed_buffer() {
        let buffer = PcmBuffer::interleaved(Duration::ZERO, 2, vec![0.1, -0.1, 0.2, -0.2]);
        assert_eq!(buffer.frame_count, 2);
        assert!(buffer.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_and_ragged_buffers() {
        let empty = PcmBuffer::interleaved(Duration::ZERO, 2, Vec::new());
        assert!(empty.validate().is_err());

        let mut ragged = PcmBuffer::interleaved(Duration::ZERO, 2, vec![0.1, 0.2, 0.3, 0.4]);
        ragged.frame_count = 3;
        assert!(ragged.validate().is_err());

        let no_channels = PcmBuffer::interleaved(Duration::ZERO, 0, vec![0.1]);
        assert!(no_channels.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan() {
        let buffer = PcmBuffer::interleaved(Duration::ZERO, 1, vec![0.1, f32::NAN]);
        assert!(buffer.validate().is_err());
    }

    #[test]
    fn planar_buffer_interleaves_on_demand() {
        let buffer = PcmBuffer::planar(Duration::ZERO, 2, vec![1.0, 2.0, 3.0, -1.0, -2.0, -3.0]);
        assert_eq!(buffer.frame_count, 3);
        assert_eq!(&*buffer.interleaved_samples(), &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }
}
