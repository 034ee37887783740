//! RIFF WAV header for the streaming sink file.
//!
//! The sink writes a placeholder header on open (data size 0) and rewrites
//! it in place with the final data size on close.

use crate::models::config::CaptureConfiguration;

/// Size of the canonical PCM WAV header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// PCM layout of a sink file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl SinkFormat {
    pub fn from_config(config: &CaptureConfiguration) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            bit_depth: config.bit_depth,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bit_depth / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    pub fn frames_in(&self, data_bytes: u64) -> u64 {
        data_bytes / self.block_align().max(1) as u64
    }

    /// Largest whole-frame data chunk whose RIFF size still fits in a `u32`.
    pub fn max_data_bytes(&self) -> u64 {
        let ceiling = (u32::MAX - 36) as u64;
        ceiling - ceiling % self.block_align().max(1) as u64
    }

    /// Encode the header for `data_size` bytes of sample data.
    ///
    /// ```text
    /// "RIFF" <36 + data_size> "WAVE"
    /// "fmt " <16> <1 = PCM> <channels> <rate> <byte rate> <block align> <bits>
    /// "data" <data_size>
    /// ```
    pub fn header(&self, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
        let mut header = [0u8; WAV_HEADER_SIZE];
        let fields: [&[u8]; 13] = [
            b"RIFF",
            &data_size.saturating_add(36).to_le_bytes(),
            b"WAVE",
            b"fmt ",
            &16u32.to_le_bytes(),
            &1u16.to_le_bytes(),
            &self.channels.to_le_bytes(),
            &self.sample_rate.to_le_bytes(),
            &self.byte_rate().to_le_bytes(),
            &self.block_align().to_le_bytes(),
            &self.bit_depth.to_le_bytes(),
            b"data",
            &data_size.to_le_bytes(),
        ];

        let mut offset = 0;
        for field in fields {
            header[offset..offset + field.len()].copy_from_slice(field);
            offset += field.len();
        }
        header
    }
}
