//! Wwise Vorbis packet headers.
//!
//! Every packet in the `data` chunk is prefixed by a little-endian 16-bit
//! payload size, followed by a 32-bit granule position unless the stream
//! uses the granule-less layout.

use crate::error::WemResult;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

/// Granule value Wwise uses for "no granule recorded".
pub const NO_GRANULE: u32 = 0xFFFF_FFFF;

/// Header layout of the packets in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLayout {
    /// 2-byte size only.
    SizeOnly,
    /// 2-byte size then 4-byte granule.
    SizeAndGranule,
}

impl PacketLayout {
    pub fn header_size(self) -> u64 {
        match self {
            PacketLayout::SizeOnly => 2,
            PacketLayout::SizeAndGranule => 6,
        }
    }
}

/// A packet header located in the source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VorbisPacket {
    /// Offset of the payload.
    pub offset: u64,
    /// Payload size in bytes.
    pub size: u16,
    /// Granule recorded in the header, 0 in the size-only layout.
    pub granule: u32,
}

impl VorbisPacket {
    /// Read the header that starts at `header_offset`.
    pub fn read<R: Read + Seek>(
        stream: &mut R,
        header_offset: u64,
        layout: PacketLayout,
    ) -> WemResult<Self> {
        stream.seek(SeekFrom::Start(header_offset))?;

        let size = stream.read_u16::<LittleEndian>()?;
        let granule = match layout {
            PacketLayout::SizeOnly => 0,
            PacketLayout::SizeAndGranule => stream.read_u32::<LittleEndian>()?,
        };

        Ok(Self {
            offset: header_offset + layout.header_size(),
            size,
            granule,
        })
    }

    /// Offset of the header of the packet that follows.
    pub fn next_offset(&self) -> u64 {
        self.offset + self.size as u64
    }

    /// Granule to stamp on the page carrying this packet.
    pub fn page_granule(&self) -> u64 {
        if self.granule == NO_GRANULE {
            u64::MAX
        } else {
            self.granule as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WemError;
    use std::io::Cursor;

    #[test]
    fn test_size_only_packet() {
        let mut cursor = Cursor::new(vec![0x02, 0x01]);
        let packet = VorbisPacket::read(&mut cursor, 0, PacketLayout::SizeOnly).unwrap();

        assert_eq!(packet.offset, 2);
        assert_eq!(packet.size, 258);
        assert_eq!(packet.granule, 0);
        assert_eq!(packet.next_offset(), 2 + 258);
    }

    #[test]
    fn test_packet_with_granule() {
        let mut cursor = Cursor::new(vec![0x00, 0x01, 0x01, 0x02, 0x03, 0x04]);
        let packet = VorbisPacket::read(&mut cursor, 0, PacketLayout::SizeAndGranule).unwrap();

        assert_eq!(packet.offset, 6);
        assert_eq!(packet.size, 256);
        assert_eq!(packet.granule, 0x04030201);
        assert_eq!(packet.page_granule(), 0x04030201);
        assert_eq!(packet.next_offset(), 6 + 256);
    }

    #[test]
    fn test_sentinel_granule() {
        let mut cursor = Cursor::new(vec![0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
        let packet = VorbisPacket::read(&mut cursor, 0, PacketLayout::SizeAndGranule).unwrap();
        assert_eq!(packet.page_granule(), u64::MAX);
    }

    #[test]
    fn test_packet_at_offset() {
        let mut cursor = Cursor::new(vec![0xAA, 0xBB, 0xCC, 0x10, 0x00]);
        let packet = VorbisPacket::read(&mut cursor, 3, PacketLayout::SizeOnly).unwrap();
        assert_eq!(packet.offset, 5);
        assert_eq!(packet.size, 16);
    }

    #[test]
    fn test_short_header_is_truncated() {
        let mut cursor = Cursor::new(vec![0x01, 0x00, 0x02]);
        let result = VorbisPacket::read(&mut cursor, 0, PacketLayout::SizeAndGranule);
        assert!(matches!(result, Err(WemError::TruncatedInput { .. })));
    }
}
