//! Sample layout and quantization helpers.

/// Convert f32 samples `[-1.0, 1.0]` to 16-bit PCM (little-endian bytes).
///
/// Out-of-range values are clamped. Output length is `samples.len() * 2`.
pub fn to_i16_le_bytes(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        data.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    data
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Scale an integer sample of `bits` width into `[-1.0, 1.0)`.
pub fn int_to_f32(sample: i32, bits: u16) -> f32 {
    let scale = (1i64 << (bits.clamp(1, 32) - 1)) as f32;
    sample as f32 / scale
}

/// Inverse of [`int_to_f32`], clamping to the representable range.
pub fn f32_to_int(sample: f32, bits: u16) -> i32 {
    let bits = bits.clamp(1, 32);
    let max = ((1i64 << (bits - 1)) - 1) as f64;
    let min = -(1i64 << (bits - 1)) as f64;
    let scaled = (sample as f64 * (max + 1.0)).round();
    scaled.clamp(min, max) as i32
}

/// `[c0f0, c0f1, ..., c1f0, c1f1, ...]` → `[c0f0, c1f0, c0f1, c1f1, ...]`
pub fn planar_to_interleaved(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let frames = data.len() / channels;
    let mut out = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for ch in 0..channels {
            out.push(data[ch * frames + frame]);
        }
    }
    out
}

/// `[c0f0, c1f0, c0f1, c1f1, ...]` → `[c0f0, c0f1, ..., c1f0, c1f1, ...]`
pub fn interleaved_to_planar(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let frames = data.len() / channels;
    let mut out = vec![0.0f32; frames * channels];
    for frame in 0..frames {
        for ch in 0..channels {
            out[ch * frames + frame] = data[frame * channels + ch];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantizes_and_clamps() {
        let bytes = to_i16_le_bytes(&[0.0, 1.0, -1.0, 2.0]);
        let values: Vec<i16> = bytes.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect();
        assert_eq!(values, vec![0, i16::MAX, -i16::MAX, i16::MAX]);
    }

    #[test]
    fn sixteen_bit_round_trip_is_exact() {
        for value in [i16::MIN as i32, -12345, -1, 0, 1, 777, i16::MAX as i32] {
            assert_eq!(f32_to_int(int_to_f32(value, 16), 16), value);
        }
    }

    #[test]
    fn layout_conversions_are_inverse() {
        let planar = vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
        let interleaved = planar_to_interleaved(&planar, 2);
        assert_eq!(interleaved, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
        assert_eq!(interleaved_to_planar(&interleaved, 2), planar);
    }

    #[test]
    fn mono_layouts_pass_through() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(planar_to_interleaved(&samples, 1), samples);
        assert_eq!(interleaved_to_planar(&samples, 1), samples);
    }
}
