//! Wwise RIFF/Vorbis to Ogg Vorbis.
//!
//! Wwise strips the three Vorbis headers down to a `vorb` metadata block
//! plus a compressed setup packet, and frames audio packets with its own
//! small headers instead of Ogg pages. The reconstructor rebuilds the
//! headers, re-frames every audio packet onto its own Ogg page and, for
//! streams using packed mode bits, restores the window flags that Wwise
//! dropped from long-block packets.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use wemkit::{CodebookLibrary, ConversionOptions, VorbisReconstructor};
//!
//! # fn main() -> Result<(), wemkit::WemError> {
//! let codebooks = CodebookLibrary::from_file("packed_codebooks_aoTuV_603.bin")?;
//! let input = File::open("input.wem")?;
//! let options = ConversionOptions::default();
//!
//! let mut converter = VorbisReconstructor::open(input, Some(&codebooks), &options)?;
//! let mut ogg = Vec::new();
//! converter.generate_ogg(&mut ogg)?;
//! # Ok(())
//! # }
//! ```

use super::granule::GranuleNormalizer;
use super::packet::{PacketLayout, VorbisPacket};
use super::setup::{write_header_magic, RebuiltSetup, SetupRebuilder};
use crate::bit_reader::{BitRead, BitSliceReader};
use crate::bit_writer::BitWrite;
use crate::codebook::CodebookLibrary;
use crate::error::{WemError, WemResult};
use crate::ogg_writer::OggPacketWriter;
use crate::options::{ConversionOptions, ForcePacketFormat};
use crate::riff::RiffFile;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use tracing::{debug, trace, warn};

const VORB_TAG: &[u8; 4] = b"vorb";
const SMPL_TAG: &[u8; 4] = b"smpl";

/// `vorb` data embedded at the end of an extended `fmt ` chunk.
const EMBEDDED_VORB_OFFSET: u64 = 0x18;
const EMBEDDED_VORB_SIZE: u32 = 0x2A;

const SMPL_MIN_SIZE: u32 = 0x34;

/// Loop region from the `smpl` chunk, in samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopPoints {
    /// Number of loops declared; 0 means the stream does not loop.
    pub count: u32,
    pub start: u32,
    pub end: u32,
}

impl LoopPoints {
    /// Default and order the loop against the stream length.
    fn normalized(mut self, sample_count: u32) -> Self {
        if self.end == 0 {
            self.end = sample_count;
        } else if self.start > self.end {
            std::mem::swap(&mut self.start, &mut self.end);
        }
        self
    }

    pub fn is_looping(&self) -> bool {
        self.count != 0
    }
}

/// Stream parameters recovered from the `vorb` metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VorbisInfo {
    pub sample_count: u32,
    /// Raw mode-signal word, only present in the granule-less layout.
    pub mod_signal: Option<u32>,
    /// Audio packets carry packed mode bits instead of standard headers.
    pub mod_packets: bool,
    /// Audio packets have no per-packet granule.
    pub no_granule: bool,
    pub setup_packet_offset: u32,
    pub first_audio_packet_offset: u32,
    pub uid: u32,
    pub blocksize_0_pow: u8,
    pub blocksize_1_pow: u8,
}

impl VorbisInfo {
    pub fn packet_layout(&self) -> PacketLayout {
        if self.no_granule {
            PacketLayout::SizeOnly
        } else {
            PacketLayout::SizeAndGranule
        }
    }

    fn parse(vorb: &[u8], size: u32, force: ForcePacketFormat) -> WemResult<Self> {
        let mut cursor = Cursor::new(vorb);
        let sample_count = cursor.read_u32::<LittleEndian>()?;

        let no_granule = size == EMBEDDED_VORB_SIZE;
        let (mod_signal, packet_offsets_at, blocksizes_at) = if no_granule {
            cursor.set_position(0x04);
            (Some(cursor.read_u32::<LittleEndian>()?), 0x10, 0x28)
        } else {
            (None, 0x18, 0x30)
        };

        cursor.set_position(packet_offsets_at);
        let setup_packet_offset = cursor.read_u32::<LittleEndian>()?;
        let first_audio_packet_offset = cursor.read_u32::<LittleEndian>()?;

        cursor.set_position(blocksizes_at - 4);
        let uid = cursor.read_u32::<LittleEndian>()?;
        let blocksize_0_pow = cursor.read_u8()?;
        let blocksize_1_pow = cursor.read_u8()?;

        // The signal test is `(signal & 0x70) != 1`, which no masked value can fail,
        // so the granule-less layout always carries mod packets.
        let detected = mod_signal.is_some();
        let mod_packets = match force {
            ForcePacketFormat::NoForce => detected,
            ForcePacketFormat::ForceModPackets => true,
            ForcePacketFormat::ForceNoModPackets => false,
        };

        Ok(Self {
            sample_count,
            mod_signal,
            mod_packets,
            no_granule,
            setup_packet_offset,
            first_audio_packet_offset,
            uid,
            blocksize_0_pow,
            blocksize_1_pow,
        })
    }
}

/// Converts one Wwise Vorbis stream to Ogg Vorbis.
pub struct VorbisReconstructor<'a, R: Read + Seek> {
    input: R,
    riff: RiffFile,
    codebooks: Option<&'a CodebookLibrary>,
    options: ConversionOptions,
    info: VorbisInfo,
    loop_points: LoopPoints,
}

impl<'a, R: Read + Seek> VorbisReconstructor<'a, R> {
    /// Parse the container and the Vorbis metadata.
    pub fn open(
        mut input: R,
        codebooks: Option<&'a CodebookLibrary>,
        options: &ConversionOptions,
    ) -> WemResult<Self> {
        let riff = RiffFile::parse(&mut input)?;
        Self::from_riff(input, riff, codebooks, options)
    }

    /// Build on an already parsed container.
    pub fn from_riff(
        mut input: R,
        riff: RiffFile,
        codebooks: Option<&'a CodebookLibrary>,
        options: &ConversionOptions,
    ) -> WemResult<Self> {
        if codebooks.is_none() && options.needs_codebook_library() {
            return Err(WemError::missing_resource(
                "a codebook library is required for Wwise Vorbis",
            ));
        }

        let info = read_vorb(&mut input, &riff, options.force_packet_format)?;
        let loop_points = read_loop(&mut input, &riff)?.normalized(info.sample_count);

        debug!(
            samples = info.sample_count,
            mod_packets = info.mod_packets,
            no_granule = info.no_granule,
            blocksize_0 = 1u32 << info.blocksize_0_pow.min(31),
            blocksize_1 = 1u32 << info.blocksize_1_pow.min(31),
            looping = loop_points.is_looping(),
            "parsed Vorbis metadata"
        );

        Ok(Self {
            input,
            riff,
            codebooks,
            options: options.clone(),
            info,
            loop_points,
        })
    }

    pub fn info(&self) -> &VorbisInfo {
        &self.info
    }

    pub fn loop_points(&self) -> LoopPoints {
        self.loop_points
    }

    pub fn riff(&self) -> &RiffFile {
        &self.riff
    }

    /// Write the complete Ogg Vorbis stream to `output`.
    ///
    /// Nothing is written unless the whole conversion succeeds.
    pub fn generate_ogg<W: Write>(&mut self, mut output: W) -> WemResult<()> {
        let mut ogg = self.reconstruct()?;

        if self.options.normalize_granules && GranuleNormalizer::is_available() {
            let normalizer = GranuleNormalizer::new().with_total_samples(self.info.sample_count as u64);
            match normalizer.normalize(&ogg) {
                Ok(normalized) => ogg = normalized,
                Err(e) => warn!(error = %e, "granule normalization failed, keeping original granules"),
            }
        }

        output.write_all(&ogg)?;
        Ok(())
    }

    /// Rebuild the stream without the granule post-pass.
    pub fn reconstruct(&mut self) -> WemResult<Vec<u8>> {
        let mut ogg = OggPacketWriter::new(Vec::new());

        self.write_identification(&mut ogg)?;
        self.write_comment(&mut ogg)?;

        let setup = self.rebuild_setup()?;
        ogg.set_granule(0);
        ogg.write_bytes(&setup.packet)?;
        ogg.flush_page(false, false)?;

        let packets = self.write_audio(&mut ogg, &setup)?;
        debug!(packets, pages = ogg.sequence(), "rebuilt Ogg Vorbis stream");

        Ok(ogg.into_inner())
    }

    fn write_identification<W: Write>(&self, ogg: &mut OggPacketWriter<W>) -> WemResult<()> {
        let format = self.riff.format();

        ogg.set_granule(0);
        write_header_magic(ogg, 1)?;
        ogg.write_bits(0, 32)?; // version
        ogg.write_bits(format.channels as u32, 8)?;
        ogg.write_bits(format.sample_rate, 32)?;
        ogg.write_bits(0, 32)?; // bitrate max
        ogg.write_bits(format.byte_rate.wrapping_mul(8), 32)?; // bitrate nominal
        ogg.write_bits(0, 32)?; // bitrate min
        ogg.write_bits(self.info.blocksize_0_pow as u32, 4)?;
        ogg.write_bits(self.info.blocksize_1_pow as u32, 4)?;
        ogg.write_bits(1, 1)?; // framing
        ogg.flush_page(false, false)
    }

    fn write_comment<W: Write>(&self, ogg: &mut OggPacketWriter<W>) -> WemResult<()> {
        ogg.set_granule(0);
        write_header_magic(ogg, 3)?;

        let vendor = self.options.vendor.as_bytes();
        ogg.write_bits(vendor.len() as u32, 32)?;
        ogg.write_bytes(vendor)?;

        if self.loop_points.is_looping() {
            let comments = [
                format!("LoopStart={}", self.loop_points.start),
                format!("LoopEnd={}", self.loop_points.end),
            ];
            ogg.write_bits(comments.len() as u32, 32)?;
            for comment in &comments {
                ogg.write_bits(comment.len() as u32, 32)?;
                ogg.write_bytes(comment.as_bytes())?;
            }
        } else {
            ogg.write_bits(0, 32)?;
        }

        ogg.write_bits(1, 1)?; // framing
        ogg.flush_page(false, false)
    }

    fn rebuild_setup(&mut self) -> WemResult<RebuiltSetup> {
        let layout = self.info.packet_layout();
        let header_offset = self.riff.data_offset() + self.info.setup_packet_offset as u64;
        let packet = VorbisPacket::read(&mut self.input, header_offset, layout)?;

        if packet.granule != 0 {
            return Err(WemError::corrupt_setup("setup packet granule != 0"));
        }

        let mut payload = vec![0u8; packet.size as usize];
        self.input.seek(SeekFrom::Start(packet.offset))?;
        self.input.read_exact(&mut payload)?;

        let empty = CodebookLibrary::empty();
        let library = self.codebooks.unwrap_or(&empty);
        SetupRebuilder::new(library, self.riff.format().channels)
            .inline_codebooks(self.options.inline_codebooks)
            .full_setup(self.options.full_setup)
            .rebuild(&payload)
    }

    /// Re-frame every audio packet. Returns the number of packets.
    fn write_audio<W: Write>(&mut self, ogg: &mut OggPacketWriter<W>, setup: &RebuiltSetup) -> WemResult<u64> {
        let layout = self.info.packet_layout();
        let data_end = self.riff.data_end();
        let mode_bits = setup.mode_bits();
        let blockflags = &setup.mode_blockflags;

        if self.info.mod_packets && blockflags.is_empty() {
            return Err(WemError::format(
                "packed mode bits need the mode table of a stripped setup",
            ));
        }

        let mut offset = self.riff.data_offset() + self.info.first_audio_packet_offset as u64;
        let mut prev_blockflag = false;
        let mut packets = 0u64;

        while offset < data_end {
            if offset + layout.header_size() > data_end {
                return Err(WemError::truncated("packet header truncated"));
            }

            let packet = VorbisPacket::read(&mut self.input, offset, layout)?;
            let next_offset = packet.next_offset();

            let mut payload = vec![0u8; packet.size as usize];
            self.input.seek(SeekFrom::Start(packet.offset))?;
            self.input.read_exact(&mut payload)?;

            trace!(offset, size = packet.size, granule = packet.granule, "audio packet");
            ogg.set_granule(packet.page_granule());

            if self.info.mod_packets && !payload.is_empty() {
                let mut bits = BitSliceReader::new(&payload);

                // OUT: 1 bit packet type (0 == audio)
                ogg.write_bits(0, 1)?;

                // IN/OUT: N bit mode number
                let mode_number = bits.read_bits(mode_bits)?;
                ogg.write_bits(mode_number, mode_bits)?;

                // IN: remaining bits of the first byte
                let remainder = bits.read_bits(8 - mode_bits)?;

                let long_window = mode_blockflag(blockflags, mode_number)?;
                if long_window {
                    let next_blockflag = self.peek_blockflag(next_offset, layout, data_end, mode_bits, blockflags)?;
                    ogg.write_bits(prev_blockflag as u32, 1)?;
                    ogg.write_bits(next_blockflag as u32, 1)?;
                }
                prev_blockflag = long_window;

                ogg.write_bits(remainder, 8 - mode_bits)?;
                for &byte in &payload[1..] {
                    ogg.write_bits(byte as u32, 8)?;
                }
            } else {
                ogg.write_bytes(&payload)?;
            }

            offset = next_offset;
            ogg.flush_page(false, offset == data_end)?;
            packets += 1;
        }

        if offset > data_end {
            return Err(WemError::truncated("page truncated"));
        }

        Ok(packets)
    }

    /// Blockflag of the packet after the current one, false at the end.
    fn peek_blockflag(
        &mut self,
        next_offset: u64,
        layout: PacketLayout,
        data_end: u64,
        mode_bits: u8,
        blockflags: &[bool],
    ) -> WemResult<bool> {
        if next_offset + layout.header_size() > data_end {
            return Ok(false);
        }

        let next = VorbisPacket::read(&mut self.input, next_offset, layout)?;
        if next.size == 0 {
            return Ok(false);
        }

        self.input.seek(SeekFrom::Start(next.offset))?;
        let first_byte = self.input.read_u8()? as u32;
        let next_mode = first_byte & ((1u32 << mode_bits) - 1);
        mode_blockflag(blockflags, next_mode)
    }
}

fn mode_blockflag(blockflags: &[bool], mode_number: u32) -> WemResult<bool> {
    blockflags.get(mode_number as usize).copied().ok_or_else(|| {
        WemError::format(format!(
            "mode {mode_number} out of range for {} modes",
            blockflags.len()
        ))
    })
}

/// Locate and decode the Vorbis metadata block.
fn read_vorb<R: Read + Seek>(input: &mut R, riff: &RiffFile, force: ForcePacketFormat) -> WemResult<VorbisInfo> {
    let (offset, size) = match riff.find(VORB_TAG) {
        Some((offset, fragment)) => (offset, fragment.size),
        None if riff.fmt_size() as u64 >= EMBEDDED_VORB_OFFSET + EMBEDDED_VORB_SIZE as u64 => {
            (riff.fmt_offset() + EMBEDDED_VORB_OFFSET, EMBEDDED_VORB_SIZE)
        }
        None => return Err(WemError::missing_chunk(VORB_TAG)),
    };

    match size {
        0x28 | 0x2C => {
            return Err(WemError::unsupported(
                "Vorbis with a header triad is not supported",
            ));
        }
        0x2A | 0x32 | 0x34 => {}
        other => {
            return Err(WemError::format(format!("unexpected vorb size {other:#x}")));
        }
    }

    input.seek(SeekFrom::Start(offset))?;
    let mut vorb = vec![0u8; size as usize];
    input.read_exact(&mut vorb)?;

    VorbisInfo::parse(&vorb, size, force)
}

fn read_loop<R: Read + Seek>(input: &mut R, riff: &RiffFile) -> WemResult<LoopPoints> {
    let Some((offset, fragment)) = riff.find(SMPL_TAG) else {
        return Ok(LoopPoints::default());
    };

    if fragment.size < SMPL_MIN_SIZE {
        debug!(size = fragment.size, "smpl chunk too short for a loop, ignoring");
        return Ok(LoopPoints::default());
    }

    input.seek(SeekFrom::Start(offset + 0x1C))?;
    let count = input.read_u32::<LittleEndian>()?;
    input.seek(SeekFrom::Start(offset + 0x2C))?;
    let start = input.read_u32::<LittleEndian>()?;
    let end = input.read_u32::<LittleEndian>()?;

    Ok(LoopPoints { count, start, end })
}
