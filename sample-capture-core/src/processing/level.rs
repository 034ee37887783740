/// Exponent applied to the RMS value so quiet material still moves the meter.
pub const PERCEPTUAL_EXPONENT: f32 = 0.3;

/// RMS of all samples across all channels (0.0–1.0 for normalized audio).
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Meter level for one buffer: `rms ^ 0.3`, clamped to `[0.0, 1.0]`.
///
/// Silence maps to exactly 0.0.
pub fn loudness(samples: &[f32]) -> f32 {
    let rms = rms_level(samples);
    if rms <= 0.0 {
        return 0.0;
    }
    rms.powf(PERCEPTUAL_EXPONENT).min(1.0)
}
