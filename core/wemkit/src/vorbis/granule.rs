//! Sample-accurate granule positions for a rebuilt Ogg Vorbis stream.
//!
//! Wwise keeps no usable granule for granule-less streams, so the pages
//! written by the reconstructor carry whatever the packet headers said.
//! This pass decodes just enough of each audio packet (its mode number)
//! to know the block size, then recomputes every granule as a running
//! sum of `(previous_blocksize + blocksize) / 4` and repages the stream.

use crate::error::{WemError, WemResult};

/// Audio pages are closed once they hold this many payload bytes.
const PAGE_TARGET_BYTES: usize = 4096;

/// Rewrites the granule positions of an Ogg Vorbis stream.
#[derive(Debug, Clone, Default)]
pub struct GranuleNormalizer {
    total_samples: Option<u64>,
}

impl GranuleNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamp the final granule to the declared stream length.
    pub fn with_total_samples(mut self, total_samples: u64) -> Self {
        self.total_samples = Some(total_samples);
        self
    }

    /// Whether the normalizer was compiled in.
    pub fn is_available() -> bool {
        cfg!(feature = "granule")
    }

    /// Produce a repaged copy of `ogg` with recomputed granules.
    pub fn normalize(&self, ogg: &[u8]) -> WemResult<Vec<u8>> {
        #[cfg(feature = "granule")]
        {
            imp::normalize(ogg, self.total_samples)
        }

        #[cfg(not(feature = "granule"))]
        {
            let _ = ogg;
            Err(WemError::missing_resource(
                "granule normalization requires the `granule` feature",
            ))
        }
    }
}

/// Per-mode blockflags recovered from a full Vorbis setup header.
///
/// The mode table sits right before the framing bit and is the only part
/// of the header that can be found without decoding the codebooks, so it
/// is located by walking backwards from the end of the packet.
pub fn mode_blockflags(setup: &[u8]) -> WemResult<Vec<bool>> {
    let mut reader = ReverseBitReader::new(setup);

    let mut framing_bits = None;
    while reader.bits_left() > 97 {
        if reader.read(1) == 1 {
            framing_bits = Some(reader.position());
            break;
        }
    }
    let framing_bits = framing_bits.ok_or_else(|| WemError::format("setup header has no framing bit"))?;

    let mut mode_count = 0u32;
    let mut last_mode_count = None;
    while reader.bits_left() >= 97 {
        if reader.read(8) > 63 || reader.read(16) != 0 || reader.read(16) != 0 {
            break;
        }
        reader.skip(1);
        mode_count += 1;
        if mode_count > 64 {
            break;
        }
        if reader.peek(6) + 1 == mode_count {
            last_mode_count = Some(mode_count);
        }
    }
    let mode_count = last_mode_count.ok_or_else(|| WemError::format("mode table not found in setup header"))?;

    let mut reader = ReverseBitReader::new(setup);
    reader.skip(framing_bits);
    let mut blockflags = vec![false; mode_count as usize];
    for flag in blockflags.iter_mut().rev() {
        reader.skip(40);
        *flag = reader.read(1) == 1;
    }

    Ok(blockflags)
}

/// Reads an LSB-first packed buffer from its last bit towards its first,
/// assembling values most significant bit first.
struct ReverseBitReader<'a> {
    data: &'a [u8],
    remaining: u64,
}

impl<'a> ReverseBitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            remaining: data.len() as u64 * 8,
        }
    }

    fn bits_left(&self) -> u64 {
        self.remaining
    }

    /// Bits consumed so far.
    fn position(&self) -> u64 {
        self.data.len() as u64 * 8 - self.remaining
    }

    fn skip(&mut self, bits: u64) {
        self.remaining = self.remaining.saturating_sub(bits);
    }

    /// Past the start of the buffer, reads yield zero bits.
    fn read(&mut self, width: u8) -> u32 {
        let mut value = 0u32;
        for _ in 0..width {
            let bit = if self.remaining == 0 {
                0
            } else {
                self.remaining -= 1;
                let byte = self.data[(self.remaining / 8) as usize];
                (byte >> (self.remaining % 8)) & 1
            };
            value = (value << 1) | bit as u32;
        }
        value
    }

    fn peek(&self, width: u8) -> u32 {
        let mut copy = ReverseBitReader {
            data: self.data,
            remaining: self.remaining,
        };
        copy.read(width)
    }
}

#[cfg(feature = "granule")]
mod imp {
    use super::{mode_blockflags, PAGE_TARGET_BYTES};
    use crate::bit_reader::{BitRead, BitSliceReader};
    use crate::error::{WemError, WemResult};
    use crate::vorbis::helpers::ilog;
    use ogg::writing::PacketWriteEndInfo;
    use ogg::{Packet, PacketReader, PacketWriter};
    use std::io::Cursor;
    use tracing::debug;

    struct BlockSizes {
        short: u64,
        long: u64,
        blockflags: Vec<bool>,
        mode_bits: u8,
    }

    impl BlockSizes {
        fn from_headers(ident: &[u8], setup: &[u8]) -> WemResult<Self> {
            if ident.len() < 30 || ident[0] != 1 || &ident[1..7] != b"vorbis" {
                return Err(WemError::format("first packet is not a Vorbis identification header"));
            }
            if setup.len() < 7 || setup[0] != 5 || &setup[1..7] != b"vorbis" {
                return Err(WemError::format("third packet is not a Vorbis setup header"));
            }

            let blockflags = mode_blockflags(setup)?;
            let mode_bits = ilog(blockflags.len() as u32 - 1);
            Ok(Self {
                short: 1 << (ident[28] & 0x0F),
                long: 1 << (ident[28] >> 4),
                blockflags,
                mode_bits,
            })
        }

        /// Block size of an audio packet, 0 for anything that is not one.
        fn of(&self, packet: &[u8]) -> WemResult<u64> {
            let mut reader = BitSliceReader::new(packet);
            match reader.read_bit() {
                Ok(false) => {}
                _ => return Ok(0),
            }

            let mode = reader.read_bits(self.mode_bits)? as usize;
            match self.blockflags.get(mode) {
                Some(true) => Ok(self.long),
                Some(false) => Ok(self.short),
                None => Err(WemError::format(format!("audio packet uses unknown mode {mode}"))),
            }
        }
    }

    pub(super) fn normalize(ogg: &[u8], total_samples: Option<u64>) -> WemResult<Vec<u8>> {
        let mut reader = PacketReader::new(Cursor::new(ogg));
        let mut packets: Vec<Packet> = Vec::new();
        while let Some(packet) = reader
            .read_packet()
            .map_err(|e| WemError::format(format!("invalid Ogg stream: {e}")))?
        {
            packets.push(packet);
        }

        if packets.len() < 3 {
            return Err(WemError::format("Ogg Vorbis stream is missing its headers"));
        }

        let sizes = BlockSizes::from_headers(&packets[0].data, &packets[2].data)?;
        let serial = packets[0].stream_serial();
        let audio_count = packets.len() - 3;

        let mut writer = PacketWriter::new(Vec::with_capacity(ogg.len()));
        let mut packets = packets.into_iter();
        let (ident, comment, setup) = match (packets.next(), packets.next(), packets.next()) {
            (Some(ident), Some(comment), Some(setup)) => (ident, comment, setup),
            _ => return Err(WemError::format("Ogg Vorbis stream is missing its headers")),
        };

        let setup_end = if audio_count == 0 {
            PacketWriteEndInfo::EndStream
        } else {
            PacketWriteEndInfo::EndPage
        };
        writer.write_packet(ident.data, serial, PacketWriteEndInfo::EndPage, 0)?;
        writer.write_packet(comment.data, serial, PacketWriteEndInfo::NormalPacket, 0)?;
        writer.write_packet(setup.data, serial, setup_end, 0)?;

        let mut granule = 0u64;
        let mut last_blocksize = 0u64;
        let mut page_bytes = 0usize;

        for (index, packet) in packets.enumerate() {
            let blocksize = sizes.of(&packet.data)?;
            if last_blocksize != 0 {
                granule += (last_blocksize + blocksize) / 4;
            }
            last_blocksize = blocksize;

            let is_last = index + 1 == audio_count;
            page_bytes += packet.data.len();

            let (end_info, position) = if is_last {
                let clamped = total_samples.map_or(granule, |total| granule.min(total));
                (PacketWriteEndInfo::EndStream, clamped)
            } else if page_bytes >= PAGE_TARGET_BYTES {
                page_bytes = 0;
                (PacketWriteEndInfo::EndPage, granule)
            } else {
                (PacketWriteEndInfo::NormalPacket, granule)
            };

            writer.write_packet(packet.data, serial, end_info, position)?;
        }

        debug!(packets = audio_count, granule, "normalized granule positions");
        Ok(writer.into_inner())
    }
}
