//! LSB-first bit cursor over a byte slice.
//!
//! Wwise packs its stripped Vorbis setup data and audio packet headers
//! exactly the way Vorbis does: the first bit of a field is the least
//! significant bit of the current byte, and multi-bit fields are
//! assembled low bit first across byte boundaries.

use crate::error::{WemError, WemResult};

/// Trait for reading bits from a source.
pub trait BitRead {
    /// Read a single bit.
    fn read_bit(&mut self) -> WemResult<bool>;

    /// Get the total number of bits read so far.
    fn total_bits_read(&self) -> u64;

    /// Read `width` bits (0..=32) and assemble them LSB-first.
    fn read_bits(&mut self, width: u8) -> WemResult<u32> {
        if width > 32 {
            return Err(WemError::format(format!(
                "cannot read {width} bits at once"
            )));
        }

        let mut result = 0u32;
        for i in 0..width {
            if self.read_bit()? {
                result |= 1u32 << i;
            }
        }

        Ok(result)
    }
}

/// Bit cursor over an in-memory slice (no I/O).
pub struct BitSliceReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitSliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    pub fn total_bits_read(&self) -> u64 {
        self.byte_pos as u64 * 8 + self.bit_pos as u64
    }

    pub fn read_bit(&mut self) -> WemResult<bool> {
        let byte = self
            .data
            .get(self.byte_pos)
            .ok_or_else(|| WemError::truncated("out of bits"))?;

        let bit = byte & (1 << self.bit_pos) != 0;
        self.bit_pos += 1;

        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(bit)
    }
}

impl BitRead for BitSliceReader<'_> {
    fn read_bit(&mut self) -> WemResult<bool> {
        BitSliceReader::read_bit(self)
    }

    fn total_bits_read(&self) -> u64 {
        BitSliceReader::total_bits_read(self)
    }
}
