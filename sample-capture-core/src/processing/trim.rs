//! Frame-accurate extraction of a time window from a PCM buffer.

use std::ops::Range;

use crate::models::audio_models::SampleLayout;
use crate::models::error::TrimRangeError;
use crate::models::sample::TrimWindow;

/// Resolve a trim window into a frame range of a buffer with `total_frames`.
///
/// `end` is clamped down to the buffer duration. A window that is empty after
/// clamping is an error.
pub fn frame_range(window: &TrimWindow, total_frames: usize, sample_rate: u32) -> Result<Range<usize>, TrimRangeError> {
    if !window.start_secs.is_finite() || window.start_secs < 0.0 {
        return Err(TrimRangeError::InvalidStart(window.start_secs));
    }
    if window.end_secs.is_nan() || window.end_secs == f64::NEG_INFINITY {
        return Err(TrimRangeError::InvalidEnd(window.end_secs));
    }

    let duration_secs = total_frames as f64 / sample_rate as f64;
    let end_secs = window.end_secs.min(duration_secs);
    if window.start_secs >= end_secs {
        return Err(TrimRangeError::EmptyWindow {
            start_secs: window.start_secs,
            end_secs,
        });
    }

    let start = ((window.start_secs * sample_rate as f64).round() as usize).min(total_frames);
    let end = ((end_secs * sample_rate as f64).round() as usize).min(total_frames);
    if start >= end {
        return Err(TrimRangeError::EmptyWindow {
            start_secs: window.start_secs,
            end_secs,
        });
    }
    Ok(start..end)
}

/// Copy `frames` out of `data`, keeping the buffer's layout.
///
/// Interleaved data is one contiguous slice; planar data is copied channel by
/// channel so each channel plane stays intact.
pub fn copy_frames(data: &[f32], channels: usize, layout: SampleLayout, frames: Range<usize>) -> Vec<f32> {
    let channels = channels.max(1);
    let total_frames = data.len() / channels;
    let start = frames.start.min(total_frames);
    let end = frames.end.min(total_frames).max(start);

    match layout {
        SampleLayout::Interleaved => data[start * channels..end * channels].to_vec(),
        SampleLayout::Planar => {
            let mut out = Vec::with_capacity((end - start) * channels);
            for plane in data.chunks_exact(total_frames.max(1)).take(channels) {
                out.extend_from_slice(&plane[start..end]);
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 48_000;

    #[test]
    fn window_maps_to_rounded_frames() {
        let range = frame_range(&TrimWindow::new(0.5, 1.25), RATE as usize * 3, RATE).unwrap();
        assert_eq!(range, 24_000..60_000);
        assert_eq!(range.len(), 36_000);
    }

    #[test]
    fn fractional_windows_stay_within_one_frame() {
        for (start, end) in [(0.0, 0.00003), (0.1234567, 0.9876543), (1.0 / 3.0, 2.0 / 3.0)] {
            let range = frame_range(&TrimWindow::new(start, end), RATE as usize, RATE).unwrap();
            let expected = ((end - start) * RATE as f64).round() as i64;
            assert!((range.len() as i64 - expected).abs() <= 1, "{}..{}", start, end);
        }
    }

    #[test]
    fn end_is_clamped_to_duration() {
        let range = frame_range(&TrimWindow::new(1.0, 10.0), RATE as usize * 2, RATE).unwrap();
        assert_eq!(range, 48_000..96_000);
    }

    #[test]
    fn degenerate_windows_are_rejected() {
        let total = RATE as usize * 2;
        assert!(matches!(
            frame_range(&TrimWindow::new(1.0, 1.0), total, RATE),
            Err(TrimRangeError::EmptyWindow { .. })
        ));
        assert!(matches!(
            frame_range(&TrimWindow::new(3.0, 5.0), total, RATE),
            Err(TrimRangeError::EmptyWindow { .. })
        ));
        assert!(matches!(
            frame_range(&TrimWindow::new(-0.1, 1.0), total, RATE),
            Err(TrimRangeError::InvalidStart(_))
        ));
        assert!(matches!(
            frame_range(&TrimWindow::new(0.0, f64::NAN), total, RATE),
            Err(TrimRangeError::InvalidEnd(_))
        ));
    }

    #[test]
    fn copies_interleaved_frames() {
        let data = vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5];
        let out = copy_frames(&data, 2, SampleLayout::Interleaved, 1..3);
        assert_eq!(out, vec![1.0, 1.5, 2.0, 2.5]);
    }

    #[test]
    fn copies_planar_frames_per_channel() {
        let data = vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0];
        let out = copy_frames(&data, 2, SampleLayout::Planar, 1..3);
        assert_eq!(out, vec![1.0, 2.0, 11.0, 12.0]);
    }
}
