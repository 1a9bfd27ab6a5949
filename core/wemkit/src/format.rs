//! The `fmt ` chunk and its codec-specific extensions.
//!
//! Base layout (little-endian):
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0x00   | 2    | codec tag        |
//! | 0x02   | 2    | channels         |
//! | 0x04   | 4    | sample rate      |
//! | 0x08   | 4    | byte rate        |
//! | 0x0C   | 2    | block size       |
//! | 0x0E   | 2    | bits per sample  |
//! | 0x10   | 2    | extension size   |
//!
//! Wwise Opus appends its stream description at 0x14:
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0x14   | 4    | channel layout   |
//! | 0x18   | 4    | sample count     |
//! | 0x1C   | 4    | frame-table size |
//! | 0x20   | 2    | pre-skip         |
//! | 0x22   | 1    | version          |
//! | 0x23   | 1    | mapping family   |

use crate::error::{WemError, WemResult};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::io::Cursor;

/// Smallest `fmt ` chunk the parser accepts.
pub const MIN_FORMAT_SIZE: u32 = 0x10;

const OPUS_EXTRA_OFFSET: u64 = 0x14;
const OPUS_EXTRA_END: usize = 0x24;

/// Codec selected by the `fmt ` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Codec {
    /// Wwise Vorbis (0xFFFF).
    Vorbis,
    /// Wwise Opus (0x3041).
    Opus,
    /// Platinum-style ADPCM (0x8311).
    PtAdpcm,
    /// Anything else; copied through untouched.
    Other(u16),
}

impl Codec {
    pub const VORBIS_TAG: u16 = 0xFFFF;
    pub const OPUS_TAG: u16 = 0x3041;
    pub const PTADPCM_TAG: u16 = 0x8311;

    pub fn from_tag(tag: u16) -> Self {
        match tag {
            Self::VORBIS_TAG => Codec::Vorbis,
            Self::OPUS_TAG => Codec::Opus,
            Self::PTADPCM_TAG => Codec::PtAdpcm,
            other => Codec::Other(other),
        }
    }

    pub fn tag(self) -> u16 {
        match self {
            Codec::Vorbis => Self::VORBIS_TAG,
            Codec::Opus => Self::OPUS_TAG,
            Codec::PtAdpcm => Self::PTADPCM_TAG,
            Codec::Other(tag) => tag,
        }
    }
}

/// Wwise Opus stream description carried in the format extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpusExtra {
    pub channel_layout: u32,
    pub sample_count: u32,
    pub frame_table_count: u32,
    pub pre_skip: u16,
    pub version: u8,
    pub mapping_family: u8,
}

/// Frame geometry for interleaved PTADPCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdpcmLayout {
    /// Bytes per channel per frame.
    pub interleaved_frame_size: u32,
    /// Samples decoded from one channel's frame.
    pub samples_per_frame: u32,
}

impl AdpcmLayout {
    /// Derive the layout from the block size and channel count.
    ///
    /// Each channel frame is two 16-bit history samples, a step index
    /// byte, then packed nibbles.
    pub fn new(block_size: u16, channels: u16) -> WemResult<Self> {
        if channels == 0 {
            return Err(WemError::format("ADPCM stream with zero channels"));
        }
        if block_size % channels != 0 {
            return Err(WemError::format(format!(
                "ADPCM block size {block_size} not divisible by {channels} channels"
            )));
        }

        let interleaved_frame_size = (block_size / channels) as u32;
        if interleaved_frame_size < 5 {
            return Err(WemError::format(format!(
                "ADPCM frame of {interleaved_frame_size} bytes is too small"
            )));
        }

        Ok(Self {
            interleaved_frame_size,
            samples_per_frame: 2 + (interleaved_frame_size - 5) * 2,
        })
    }
}

/// Codec-specific part of the format descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FormatExtra {
    None,
    Opus(OpusExtra),
    Adpcm(AdpcmLayout),
}

/// Decoded `fmt ` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    pub codec: Codec,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_size: u16,
    pub bits_per_sample: u16,
    /// Declared size of the extension following the base record.
    pub extension_size: u16,
    pub extra: FormatExtra,
}

impl FormatDescriptor {
    /// Parse the payload of a `fmt ` chunk.
    pub fn parse(chunk: &[u8]) -> WemResult<Self> {
        if chunk.len() < MIN_FORMAT_SIZE as usize {
            return Err(WemError::format(format!(
                "fmt chunk is {} bytes, expected at least {MIN_FORMAT_SIZE}",
                chunk.len()
            )));
        }

        let mut cursor = Cursor::new(chunk);
        let codec = Codec::from_tag(cursor.read_u16::<LittleEndian>()?);
        let channels = cursor.read_u16::<LittleEndian>()?;
        let sample_rate = cursor.read_u32::<LittleEndian>()?;
        let byte_rate = cursor.read_u32::<LittleEndian>()?;
        let block_size = cursor.read_u16::<LittleEndian>()?;
        let bits_per_sample = cursor.read_u16::<LittleEndian>()?;
        let extension_size = if chunk.len() >= 0x12 {
            cursor.read_u16::<LittleEndian>()?
        } else {
            0
        };

        let extra = match codec {
            Codec::Opus => FormatExtra::Opus(Self::parse_opus_extra(chunk)?),
            Codec::PtAdpcm => FormatExtra::Adpcm(AdpcmLayout::new(block_size, channels)?),
            _ => FormatExtra::None,
        };

        Ok(Self {
            codec,
            channels,
            sample_rate,
            byte_rate,
            block_size,
            bits_per_sample,
            extension_size,
            extra,
        })
    }

    fn parse_opus_extra(chunk: &[u8]) -> WemResult<OpusExtra> {
        if chunk.len() < OPUS_EXTRA_END {
            return Err(WemError::format(format!(
                "Opus fmt chunk is {} bytes, expected at least {OPUS_EXTRA_END}",
                chunk.len()
            )));
        }

        let mut cursor = Cursor::new(chunk);
        cursor.set_position(OPUS_EXTRA_OFFSET);
        Ok(OpusExtra {
            channel_layout: cursor.read_u32::<LittleEndian>()?,
            sample_count: cursor.read_u32::<LittleEndian>()?,
            frame_table_count: cursor.read_u32::<LittleEndian>()?,
            pre_skip: cursor.read_u16::<LittleEndian>()?,
            version: cursor.read_u8()?,
            mapping_family: cursor.read_u8()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn base_fmt(tag: u16, channels: u16, block_size: u16) -> Vec<u8> {
        let mut fmt = Vec::new();
        fmt.write_u16::<LittleEndian>(tag).unwrap();
        fmt.write_u16::<LittleEndian>(channels).unwrap();
        fmt.write_u32::<LittleEndian>(44100).unwrap();
        fmt.write_u32::<LittleEndian>(16000).unwrap();
        fmt.write_u16::<LittleEndian>(block_size).unwrap();
        fmt.write_u16::<LittleEndian>(0).unwrap();
        fmt
    }

    #[test]
    fn test_codec_tags() {
        assert_eq!(Codec::from_tag(0xFFFF), Codec::Vorbis);
        assert_eq!(Codec::from_tag(0x3041), Codec::Opus);
        assert_eq!(Codec::from_tag(0x8311), Codec::PtAdpcm);
        assert_eq!(Codec::from_tag(0x0001), Codec::Other(1));
        assert_eq!(Codec::Other(0x0002).tag(), 0x0002);
    }

    #[test]
    fn test_short_fmt_rejected() {
        let fmt = vec![0u8; 14];
        assert!(matches!(
            FormatDescriptor::parse(&fmt),
            Err(WemError::Format { .. })
        ));
    }

    #[test]
    fn test_parse_plain() {
        let fmt = base_fmt(0xFFFF, 2, 0);
        let desc = FormatDescriptor::parse(&fmt).unwrap();
        assert_eq!(desc.codec, Codec::Vorbis);
        assert_eq!(desc.channels, 2);
        assert_eq!(desc.sample_rate, 44100);
        assert_eq!(desc.byte_rate, 16000);
        assert_eq!(desc.extension_size, 0);
        assert_eq!(desc.extra, FormatExtra::None);
    }

    #[test]
    fn test_parse_opus_extra() {
        let mut fmt = base_fmt(0x3041, 2, 0);
        fmt.write_u16::<LittleEndian>(0x12).unwrap();
        fmt.write_u16::<LittleEndian>(0).unwrap();
        fmt.write_u32::<LittleEndian>(0x3102).unwrap();
        fmt.write_u32::<LittleEndian>(96000).unwrap();
        fmt.write_u32::<LittleEndian>(50).unwrap();
        fmt.write_u16::<LittleEndian>(312).unwrap();
        fmt.write_u8(1).unwrap();
        fmt.write_u8(0).unwrap();

        let desc = FormatDescriptor::parse(&fmt).unwrap();
        let FormatExtra::Opus(extra) = desc.extra else {
            panic!("expected Opus extension");
        };
        assert_eq!(extra.channel_layout, 0x3102);
        assert_eq!(extra.sample_count, 96000);
        assert_eq!(extra.frame_table_count, 50);
        assert_eq!(extra.pre_skip, 312);
        assert_eq!(extra.version, 1);
        assert_eq!(extra.mapping_family, 0);
    }

    #[test]
    fn test_opus_extension_too_short() {
        let mut fmt = base_fmt(0x3041, 2, 0);
        fmt.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            FormatDescriptor::parse(&fmt),
            Err(WemError::Format { .. })
        ));
    }

    #[test]
    fn test_adpcm_layout() {
        let layout = AdpcmLayout::new(0x48, 2).unwrap();
        assert_eq!(layout.interleaved_frame_size, 0x24);
        assert_eq!(layout.samples_per_frame, 2 + (0x24 - 5) * 2);

        assert!(AdpcmLayout::new(0x49, 2).is_err());
        assert!(AdpcmLayout::new(8, 0).is_err());
        assert!(AdpcmLayout::new(8, 2).is_err());
    }
}
