//! LSB-first bit sinks.

use crate::error::WemResult;

/// Trait for writing bits LSB-first.
///
/// Implemented by the in-memory [`BitWriter`] and by
/// [`OggPacketWriter`](crate::ogg_writer::OggPacketWriter), whose page
/// buffer can run out of room, hence the fallible signatures.
pub trait BitWrite {
    /// Write a single bit.
    fn put_bit(&mut self, bit: bool) -> WemResult<()>;

    /// Write the low `width` bits of `value`, least significant first.
    fn write_bits(&mut self, value: u32, width: u8) -> WemResult<()> {
        for i in 0..width.min(32) {
            self.put_bit(value & (1 << i) != 0)?;
        }
        Ok(())
    }
}

/// Growable in-memory bit buffer.
///
/// Used to assemble Vorbis header packets before any of them reach the
/// page writer, so a corrupt setup never produces a partial page.
pub struct BitWriter {
    buffer: Vec<u8>,
    bit_buffer: u8,
    bits_stored: u8,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            bit_buffer: 0,
            bits_stored: 0,
        }
    }

    /// Write every byte of `bytes` as an 8-bit field.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bits_stored == 0 {
            self.buffer.extend_from_slice(bytes);
            return;
        }
        for &b in bytes {
            for i in 0..8 {
                self.push_bit(b & (1 << i) != 0);
            }
        }
    }

    /// Finish the buffer, zero-padding a trailing partial byte.
    pub fn into_inner(mut self) -> Vec<u8> {
        if self.bits_stored > 0 {
            self.buffer.push(self.bit_buffer);
        }
        self.buffer
    }

    fn push_bit(&mut self, bit: bool) {
        if bit {
            self.bit_buffer |= 1 << self.bits_stored;
        }
        self.bits_stored += 1;

        if self.bits_stored == 8 {
            self.buffer.push(self.bit_buffer);
            self.bit_buffer = 0;
            self.bits_stored = 0;
        }
    }
}

impl BitWrite for BitWriter {
    fn put_bit(&mut self, bit: bool) -> WemResult<()> {
        self.push_bit(bit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::{BitRead, BitSliceReader};

    #[test]
    fn test_write_bits_lsb_first() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b0100, 4).unwrap();
        writer.write_bits(0b1011, 4).unwrap();
        assert_eq!(writer.into_inner(), vec![0b10110100]);
    }

    #[test]
    fn test_partial_byte_padded() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3).unwrap();
        assert_eq!(writer.into_inner(), vec![0b101]);
    }

    #[test]
    fn test_unaligned_bytes_shift_through() {
        let mut writer = BitWriter::new();
        writer.put_bit(true).unwrap();
        writer.write_bytes(&[0xFF, 0x00]);
        let out = writer.into_inner();
        assert_eq!(out, vec![0xFF, 0x01, 0x00]);
    }

    #[test]
    fn test_reader_recovers_written_fields() {
        let mut writer = BitWriter::new();
        writer.write_bits(0x564342, 24).unwrap();
        writer.write_bits(5, 3).unwrap();
        writer.write_bits(0xDEADBEEF, 32).unwrap();
        let data = writer.into_inner();

        let mut reader = BitSliceReader::new(&data);
        assert_eq!(reader.read_bits(24).unwrap(), 0x564342);
        assert_eq!(reader.read_bits(3).unwrap(), 5);
        assert_eq!(reader.read_bits(32).unwrap(), 0xDEADBEEF);
    }
}
