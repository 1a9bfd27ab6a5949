//! Wwise RIFF/Opus to Ogg Opus.
//!
//! Wwise stores raw Opus packets back to back in the `data` chunk and
//! keeps their sizes in a `seek` table of little-endian `u16` values. The
//! stream description (channel layout, sample count, pre-skip, mapping
//! family) lives in the `fmt ` extension. Conversion writes an `OpusHead`
//! and an `OpusTags` page, then gives every frame its own page.

use crate::error::{WemError, WemResult};
use crate::format::{Codec, FormatExtra, OpusExtra};
use crate::ogg_writer::OggPacketWriter;
use crate::options::ConversionOptions;
use crate::riff::RiffFile;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, trace};

const SEEK_TAG: &[u8; 4] = b"seek";

const DEFAULT_SAMPLE_RATE: u32 = 48000;
const MAX_FAMILY_1_CHANNELS: u16 = 8;

/// Vorbis channel order for mapping family 1, indexed by channel count.
const FAMILY_1_MAPPING: [&[u8]; 8] = [
    &[0],
    &[0, 1],
    &[0, 2, 1],
    &[0, 1, 2, 3],
    &[0, 4, 1, 2, 3],
    &[0, 4, 1, 2, 3, 5],
    &[0, 6, 1, 2, 3, 4, 5],
    &[0, 6, 1, 2, 3, 4, 5, 7],
];

/// WAVE channel masks that carry coupled pairs.
const MASK_STEREO: u32 = 0x3;
const MASK_2POINT1: u32 = 0xB;
const MASK_QUAD_SIDE: u32 = 0x603;
const MASK_5POINT1: u32 = 0x3F;
const MASK_7POINT1: u32 = 0x63F;

/// Samples per channel in one Opus frame, from the TOC byte.
pub fn samples_per_frame(toc: u8, sample_rate: u32) -> u32 {
    if toc & 0x80 != 0 {
        // CELT-only
        (sample_rate << ((toc >> 3) & 0x3)) / 400
    } else if toc & 0x60 == 0x60 {
        // hybrid
        if toc & 0x08 != 0 {
            sample_rate / 50
        } else {
            sample_rate / 100
        }
    } else {
        // SILK-only
        match (toc >> 3) & 0x3 {
            3 => sample_rate * 60 / 1000,
            size => (sample_rate << size) / 100,
        }
    }
}

/// Number of frames in an Opus packet.
pub fn frame_count(packet: &[u8]) -> u32 {
    let Some(&toc) = packet.first() else {
        return 0;
    };

    match toc & 0x3 {
        0 => 1,
        1 | 2 => 2,
        _ => packet.get(1).map_or(0, |&count| (count & 0x3F) as u32),
    }
}

/// Decoded samples per channel in an Opus packet.
pub fn packet_samples(packet: &[u8], sample_rate: u32) -> u64 {
    match packet.first() {
        Some(&toc) => frame_count(packet) as u64 * samples_per_frame(toc, sample_rate) as u64,
        None => 0,
    }
}

/// Values written into the `OpusHead` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpusHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub mapping_family: u8,
    pub stream_count: u8,
    pub coupled_count: u8,
    /// Empty for mapping family 0, which has no mapping table.
    pub channel_mapping: Vec<u8>,
}

impl OpusHeader {
    /// Derive the header from the Wwise stream description.
    pub fn derive(channels: u16, sample_rate: u32, extra: &OpusExtra, force_stereo: bool) -> WemResult<Self> {
        if channels == 0 {
            return Err(WemError::format("Opus stream with zero channels"));
        }
        if extra.mapping_family == 1 && channels > MAX_FAMILY_1_CHANNELS {
            return Err(WemError::unsupported(format!(
                "{channels} channels cannot be remapped with mapping family 1"
            )));
        }
        if extra.version != 1 {
            return Err(WemError::unsupported(format!(
                "Wwise Opus version {}",
                extra.version
            )));
        }

        let sample_rate = if sample_rate == 0 {
            DEFAULT_SAMPLE_RATE
        } else {
            sample_rate
        };

        let mut layout = extra.channel_layout;
        let mut channel_type = 0;
        if layout & 0xFF == channels as u32 {
            channel_type = (layout >> 8) & 0x0F;
            layout >>= 12;
        }

        if extra.mapping_family == 0 {
            return Ok(Self {
                channels,
                sample_rate,
                mapping_family: 0,
                stream_count: 1,
                coupled_count: channels.saturating_sub(1) as u8,
                channel_mapping: Vec::new(),
            });
        }

        let coupled_count: u8 = if channel_type == 1 {
            match layout {
                MASK_STEREO | MASK_2POINT1 => 1,
                MASK_QUAD_SIDE | MASK_5POINT1 | MASK_7POINT1 => 2,
                _ => 0,
            }
        } else {
            0
        };
        let mut stream_count = channels.saturating_sub(coupled_count as u16) as u8;
        let mut channels = channels;
        let mut mapping_family = extra.mapping_family;

        let channel_mapping = if mapping_family == 1 {
            FAMILY_1_MAPPING[channels as usize - 1].to_vec()
        } else {
            if force_stereo && channels > 2 {
                // Every original channel keeps its own stream; only the
                // header is collapsed.
                stream_count = channels as u8;
                channels = 2;
                mapping_family = 1;
            }

            if mapping_family == 1 || layout & 0x8 == 0 {
                (0..channels as u8).collect()
            } else {
                let lfe = (layout & 0x7).count_ones() as u8;
                (0..channels as u8)
                    .map(|i| match i {
                        i if i == lfe => lfe - 1,
                        i if i > lfe => i - 1,
                        i => i,
                    })
                    .collect()
            }
        };

        Ok(Self {
            channels,
            sample_rate,
            mapping_family,
            stream_count,
            coupled_count,
            channel_mapping,
        })
    }

    fn to_packet(&self) -> WemResult<Vec<u8>> {
        let mut packet = Vec::with_capacity(21 + self.channel_mapping.len());
        packet.extend_from_slice(b"OpusHead");
        packet.write_u8(1)?;
        packet.write_u8(self.channels as u8)?;
        // Wwise pre-skip is applied by dropping frames instead.
        packet.write_u16::<LittleEndian>(0)?;
        packet.write_u32::<LittleEndian>(self.sample_rate)?;
        packet.write_i16::<LittleEndian>(0)?;
        packet.write_u8(self.mapping_family)?;
        if self.mapping_family != 0 {
            packet.write_u8(self.stream_count)?;
            packet.write_u8(self.coupled_count)?;
            packet.extend_from_slice(&self.channel_mapping);
        }
        Ok(packet)
    }
}

fn tags_packet(vendor: &str) -> WemResult<Vec<u8>> {
    let mut packet = Vec::with_capacity(16 + vendor.len());
    packet.extend_from_slice(b"OpusTags");
    packet.write_u32::<LittleEndian>(vendor.len() as u32)?;
    packet.extend_from_slice(vendor.as_bytes());
    packet.write_u32::<LittleEndian>(0)?;
    Ok(packet)
}

/// Converts one Wwise Opus stream to Ogg Opus.
pub struct OpusReconstructor<R: Read + Seek> {
    input: R,
    riff: RiffFile,
    extra: OpusExtra,
    header: OpusHeader,
    frame_table: Vec<u16>,
    vendor: String,
}

impl<R: Read + Seek> OpusReconstructor<R> {
    pub fn open(mut input: R, options: &ConversionOptions) -> WemResult<Self> {
        let riff = RiffFile::parse(&mut input)?;
        Self::from_riff(input, riff, options)
    }

    pub fn from_riff(mut input: R, riff: RiffFile, options: &ConversionOptions) -> WemResult<Self> {
        let (table_offset, table) = riff.find(SEEK_TAG).ok_or_else(|| WemError::missing_chunk(SEEK_TAG))?;

        let format = riff.format();
        let extra = match (&format.codec, &format.extra) {
            (Codec::Opus, FormatExtra::Opus(extra)) => *extra,
            _ => return Err(WemError::format("not a Wwise Opus stream")),
        };

        let header = OpusHeader::derive(format.channels, format.sample_rate, &extra, options.opus_force_stereo)?;

        let count = extra.frame_table_count as u64;
        if count * 2 > table.size as u64 {
            return Err(WemError::truncated(format!(
                "seek table holds {} bytes, {count} frames declared",
                table.size
            )));
        }

        input.seek(SeekFrom::Start(table_offset))?;
        let mut frame_table = vec![0u16; count as usize];
        input.read_u16_into::<LittleEndian>(&mut frame_table)?;

        debug!(
            channels = header.channels,
            sample_rate = header.sample_rate,
            family = header.mapping_family,
            streams = header.stream_count,
            coupled = header.coupled_count,
            frames = frame_table.len(),
            pre_skip = extra.pre_skip,
            "parsed Opus metadata"
        );

        Ok(Self {
            input,
            riff,
            extra,
            header,
            frame_table,
            vendor: options.vendor.clone(),
        })
    }

    pub fn header(&self) -> &OpusHeader {
        &self.header
    }

    pub fn extra(&self) -> &OpusExtra {
        &self.extra
    }

    pub fn frame_table(&self) -> &[u16] {
        &self.frame_table
    }

    pub fn riff(&self) -> &RiffFile {
        &self.riff
    }

    /// Write the complete Ogg Opus stream to `output`.
    ///
    /// Nothing is written unless the whole conversion succeeds.
    pub fn generate_ogg<W: Write>(&mut self, mut output: W) -> WemResult<()> {
        let ogg = self.reconstruct()?;
        output.write_all(&ogg)?;
        Ok(())
    }

    /// Build the whole Ogg stream in memory.
    ///
    /// Table entries after the page flagged end-of-stream are discarded.
    pub fn reconstruct(&mut self) -> WemResult<Vec<u8>> {
        let mut ogg = OggPacketWriter::new(Vec::new());

        ogg.write_bytes(&self.header.to_packet()?)?;
        ogg.flush_page(false, false)?;

        ogg.write_bytes(&tags_packet(&self.vendor)?)?;
        ogg.flush_page(false, false)?;

        self.input.seek(SeekFrom::Start(self.riff.data_offset()))?;

        let total_samples = self.extra.sample_count as u64;
        let sample_rate = self.header.sample_rate;
        let mut skip = self.extra.pre_skip as i64;
        let mut granule = 0u64;
        let mut frame = Vec::with_capacity(u16::MAX as usize);
        let mut dropped = 0usize;

        for (index, &size) in self.frame_table.iter().enumerate() {
            frame.resize(size as usize, 0);
            self.input.read_exact(&mut frame)?;
            granule += packet_samples(&frame, sample_rate);

            if skip > 0 {
                skip -= size as i64 - 1;
                dropped += 1;
                continue;
            }

            trace!(index, size, granule, "opus frame");
            let is_last = granule > total_samples || index + 1 == self.frame_table.len();
            ogg.set_granule(granule);
            ogg.write_bytes(&frame)?;
            ogg.flush_page(false, is_last)?;

            if is_last {
                dropped += self.frame_table.len() - index - 1;
                break;
            }
        }

        debug!(
            frames = self.frame_table.len(),
            dropped,
            granule,
            "rebuilt Ogg Opus stream"
        );

        Ok(ogg.into_inner())
    }
}
