//! Bit-level Ogg page writer.
//!
//! [`OggPacketWriter`] is deliberately lower level than a packet writer: the
//! reconstructors decide where each page ends, so every flush produces
//! exactly one page holding whatever bits were accumulated since the last
//! one.
//!
//! Page layout (27-byte header followed by the lacing table):
//!
//! | offset | size | field                                    |
//! |--------|------|------------------------------------------|
//! | 0      | 4    | `OggS`                                   |
//! | 4      | 1    | stream structure version (0)             |
//! | 5      | 1    | flags: continued=1, first=2, last=4      |
//! | 6      | 8    | granule position                         |
//! | 14     | 4    | serial number (always 1)                 |
//! | 18     | 4    | page sequence number                     |
//! | 22     | 4    | CRC-32 with this field zeroed            |
//! | 26     | 1    | segment count                            |
//! | 27     | n    | lacing values                            |

use crate::bit_writer::BitWrite;
use crate::error::{WemError, WemResult};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use tracing::trace;

/// Largest payload a single page can carry.
pub const MAX_PAGE_PAYLOAD: usize = 255 * 255;

const PAGE_HEADER_SIZE: usize = 27;
const STREAM_SERIAL: u32 = 1;

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_FIRST: u8 = 0x02;
const FLAG_LAST: u8 = 0x04;

static CRC_LOOKUP: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ 0x04C1_1DB7
            } else {
                r << 1
            };
            j += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

fn crc_update(crc: u32, data: &[u8]) -> u32 {
    data.iter().fold(crc, |crc, &b| {
        (crc << 8) ^ CRC_LOOKUP[(((crc >> 24) as u8) ^ b) as usize]
    })
}

/// Ogg page checksum: polynomial 0x04C11DB7, not reflected, zero initial
/// value, no final xor.
pub fn ogg_crc32(data: &[u8]) -> u32 {
    crc_update(0, data)
}

/// Accumulates bits into an Ogg page and writes finished pages to `W`.
pub struct OggPacketWriter<W: Write> {
    out: W,
    payload: Vec<u8>,
    bit_buffer: u8,
    bits_stored: u8,
    granule: u64,
    sequence: u32,
    first: bool,
    continued: bool,
}

impl<W: Write> OggPacketWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            payload: Vec::with_capacity(4096),
            bit_buffer: 0,
            bits_stored: 0,
            granule: 0,
            sequence: 0,
            first: true,
            continued: false,
        }
    }

    /// Append whole bytes to the page, sealing any partial byte first.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> WemResult<()> {
        self.flush_bits()?;
        let size = self.payload.len() + bytes.len();
        if size > MAX_PAGE_PAYLOAD {
            return Err(WemError::capacity_exceeded(size));
        }
        self.payload.extend_from_slice(bytes);
        Ok(())
    }

    /// Granule position stamped on the next flushed page.
    pub fn set_granule(&mut self, granule: u64) {
        self.granule = granule;
    }

    /// Payload bytes buffered for the current page, including a pending partial byte.
    pub fn payload_len(&self) -> usize {
        self.payload.len() + usize::from(self.bits_stored > 0)
    }

    /// Sequence number the next page will carry.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Write the buffered payload out as one page.
    ///
    /// `next_continued` becomes the continuation flag of the following page.
    pub fn flush_page(&mut self, next_continued: bool, is_last: bool) -> WemResult<()> {
        self.flush_bits()?;

        let len = self.payload.len();
        let segments = len.div_ceil(255);

        let mut flags = 0u8;
        if self.continued {
            flags |= FLAG_CONTINUED;
        }
        if self.first {
            flags |= FLAG_FIRST;
        }
        if is_last {
            flags |= FLAG_LAST;
        }

        let mut header = Vec::with_capacity(PAGE_HEADER_SIZE + segments);
        header.extend_from_slice(b"OggS");
        header.write_u8(0)?;
        header.write_u8(flags)?;
        header.write_u64::<LittleEndian>(self.granule)?;
        header.write_u32::<LittleEndian>(STREAM_SERIAL)?;
        header.write_u32::<LittleEndian>(self.sequence)?;
        header.write_u32::<LittleEndian>(0)?;
        header.write_u8(segments as u8)?;
        for i in 0..segments {
            let lacing = if i + 1 < segments {
                255
            } else {
                len - 255 * (segments - 1)
            };
            header.write_u8(lacing as u8)?;
        }

        let crc = crc_update(crc_update(0, &header), &self.payload);
        header[22..26].copy_from_slice(&crc.to_le_bytes());

        self.out.write_all(&header)?;
        self.out.write_all(&self.payload)?;

        trace!(
            sequence = self.sequence,
            granule = self.granule,
            bytes = len,
            last = is_last,
            "flushed ogg page"
        );

        self.sequence += 1;
        self.first = false;
        self.continued = next_continued;
        self.payload.clear();
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Give back the sink. Anything not yet flushed is discarded.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn flush_bits(&mut self) -> WemResult<()> {
        if self.bits_stored > 0 {
            self.push_byte(self.bit_buffer)?;
            self.bit_buffer = 0;
            self.bits_stored = 0;
        }
        Ok(())
    }

    fn push_byte(&mut self, byte: u8) -> WemResult<()> {
        if self.payload.len() >= MAX_PAGE_PAYLOAD {
            return Err(WemError::capacity_exceeded(self.payload.len() + 1));
        }
        self.payload.push(byte);
        Ok(())
    }
}

impl<W: Write> BitWrite for OggPacketWriter<W> {
    fn put_bit(&mut self, bit: bool) -> WemResult<()> {
        if bit {
            self.bit_buffer |= 1 << self.bits_stored;
        }
        self.bits_stored += 1;

        if self.bits_stored == 8 {
            let byte = self.bit_buffer;
            self.bit_buffer = 0;
            self.bits_stored = 0;
            self.push_byte(byte)?;
        }
        Ok(())
    }
}
