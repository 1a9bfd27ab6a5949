//! RIFF/WAVE chunk walking.
//!
//! A `.wem` file is a little-endian RIFF container. [`RiffFile::parse`]
//! walks the top-level chunks once, keeps every fragment header keyed by
//! the offset of its payload, decodes the `fmt ` chunk and remembers where
//! the `data` payload starts. `LIST` chunks are walked with the same
//! algorithm; they only matter for recovering a display label.

use crate::error::{WemError, WemResult};
use crate::format::FormatDescriptor;
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, trace};

pub type FourCC = [u8; 4];

pub const RIFF_MAGIC: &FourCC = b"RIFF";
pub const WAVE_TYPE: &FourCC = b"WAVE";
pub const FMT_TAG: &FourCC = b"fmt ";
pub const DATA_TAG: &FourCC = b"data";
pub const LIST_TAG: &FourCC = b"LIST";

const ADTL_TYPE: &FourCC = b"adtl";
const LABEL_TAG: &FourCC = b"labl";
const PROM_ID: &FourCC = b"proM";

/// Render a tag for logs and errors.
pub fn fourcc_str(tag: &FourCC) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// A chunk header: tag plus declared payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFragment {
    pub tag: FourCC,
    pub size: u32,
}

/// Offset of a chunk payload to its header.
pub type FragmentMap = BTreeMap<u64, ChunkFragment>;

/// A parsed `LIST` chunk with its own fragment map.
#[derive(Debug, Clone)]
pub struct ListChunk {
    pub list_type: FourCC,
    pub fragments: FragmentMap,
    /// Raw `labl` payloads (cue id or record id, then text) in file order.
    pub labels: Vec<(FourCC, Vec<u8>)>,
}

impl ListChunk {
    fn read<R: Read + Seek>(reader: &mut R, offset: u64, size: u32) -> WemResult<Self> {
        if size < 4 {
            return Err(WemError::format("LIST chunk shorter than its type tag"));
        }

        reader.seek(SeekFrom::Start(offset))?;
        let mut list_type = [0u8; 4];
        reader.read_exact(&mut list_type)?;

        let fragments = read_fragments(reader, offset + 4, offset + size as u64)?;

        let mut labels = Vec::new();
        if &list_type == ADTL_TYPE {
            for (&at, fragment) in fragments.iter().filter(|(_, f)| &f.tag == LABEL_TAG) {
                if fragment.size < 4 {
                    continue;
                }
                reader.seek(SeekFrom::Start(at))?;
                let mut id = [0u8; 4];
                reader.read_exact(&mut id)?;
                let text = read_payload(reader, fragment.size - 4)?;
                labels.push((id, text));
            }
        }

        Ok(Self {
            list_type,
            fragments,
            labels,
        })
    }

    /// Best display name this list carries, if any.
    ///
    /// A ProM export record wins; otherwise the first label made only of
    /// printable ASCII is used.
    pub fn name_label(&self) -> Option<String> {
        if let Some(name) = self
            .labels
            .iter()
            .filter(|(id, _)| id == PROM_ID)
            .find_map(|(_, text)| prom_friendly_name(text))
        {
            return Some(name);
        }

        self.labels.iter().find_map(|(_, text)| {
            let end = text.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
            let text = &text[..end];
            (!text.is_empty() && text.iter().all(|b| (0x20..=0x7A).contains(b)))
                .then(|| String::from_utf8_lossy(text).into_owned())
        })
    }
}

/// `FriendlyName=` value from the header half of a ProM export record.
fn prom_friendly_name(text: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(text);
    let header = text.split("--").next()?;
    let key = header.to_ascii_lowercase().find("friendlyname")?;
    let eq = header[key..].find('=')? + key;
    let name = header[eq + 1..].trim().trim_end_matches('\0');
    let name = name
        .strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .unwrap_or(name);
    (!name.is_empty()).then(|| name.to_string())
}

fn read_fragments<R: Read + Seek>(reader: &mut R, mut pos: u64, end: u64) -> WemResult<FragmentMap> {
    let mut fragments = FragmentMap::new();

    while pos < end {
        reader.seek(SeekFrom::Start(pos))?;
        let mut tag = [0u8; 4];
        reader.read_exact(&mut tag)?;
        let size = reader.read_u32::<LittleEndian>()?;
        pos += 8;

        trace!(tag = %fourcc_str(&tag), offset = pos, size, "chunk");
        fragments.insert(pos, ChunkFragment { tag, size });
        pos += size as u64;
    }

    Ok(fragments)
}

/// Read a declared payload without trusting the size for the allocation.
fn read_payload<R: Read>(reader: &mut R, size: u32) -> WemResult<Vec<u8>> {
    let mut payload = Vec::new();
    reader.by_ref().take(size as u64).read_to_end(&mut payload)?;
    if payload.len() < size as usize {
        return Err(WemError::truncated(format!(
            "chunk declares {size} bytes, only {} available",
            payload.len()
        )));
    }
    Ok(payload)
}

/// A parsed RIFF/WAVE container.
///
/// Offsets are absolute positions in the source stream.
#[derive(Debug, Clone)]
pub struct RiffFile {
    start: u64,
    file_size: u64,
    fragments: FragmentMap,
    format: FormatDescriptor,
    fmt_offset: u64,
    data_offset: u64,
    lists: Vec<ListChunk>,
}

impl RiffFile {
    /// Walk the container starting at the reader's current position.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> WemResult<Self> {
        let start = reader.stream_position()?;

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != RIFF_MAGIC {
            return Err(WemError::format(format!(
                "expected RIFF magic, found {:?}",
                fourcc_str(&magic)
            )));
        }

        let file_size = reader.read_u32::<LittleEndian>()? as u64 + 8;

        let mut form = [0u8; 4];
        reader.read_exact(&mut form)?;
        if &form != WAVE_TYPE {
            return Err(WemError::format(format!(
                "expected WAVE form type, found {:?}",
                fourcc_str(&form)
            )));
        }

        let fragments = read_fragments(reader, start + 12, start + file_size)?;

        let (fmt_offset, fmt) = find_in(&fragments, FMT_TAG).ok_or_else(|| WemError::missing_chunk(FMT_TAG))?;
        reader.seek(SeekFrom::Start(fmt_offset))?;
        let fmt_bytes = read_payload(reader, fmt.size)?;
        let format = FormatDescriptor::parse(&fmt_bytes)?;

        let (data_offset, _) = find_in(&fragments, DATA_TAG).ok_or_else(|| WemError::missing_chunk(DATA_TAG))?;

        let mut lists = Vec::new();
        for (&offset, fragment) in fragments.iter().filter(|(_, f)| &f.tag == LIST_TAG) {
            match ListChunk::read(reader, offset, fragment.size) {
                Ok(list) => lists.push(list),
                Err(e) => debug!(offset, error = %e, "ignoring unreadable LIST chunk"),
            }
        }

        debug!(
            codec = ?format.codec,
            channels = format.channels,
            sample_rate = format.sample_rate,
            chunks = fragments.len(),
            "parsed RIFF container"
        );

        Ok(Self {
            start,
            file_size,
            fragments,
            format,
            fmt_offset,
            data_offset,
            lists,
        })
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Position of the RIFF magic in the source.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Declared container size including the 8-byte RIFF header.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn fragments(&self) -> &FragmentMap {
        &self.fragments
    }

    pub fn fmt_offset(&self) -> u64 {
        self.fmt_offset
    }

    pub fn fmt_size(&self) -> u32 {
        self.fragments
            .get(&self.fmt_offset)
            .map_or(0, |f| f.size)
    }

    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Declared size of the `data` payload.
    pub fn data_size(&self) -> u32 {
        self.fragments
            .get(&self.data_offset)
            .map_or(0, |f| f.size)
    }

    pub fn data_end(&self) -> u64 {
        self.data_offset + self.data_size() as u64
    }

    /// First top-level chunk with the given tag.
    pub fn find(&self, tag: &FourCC) -> Option<(u64, ChunkFragment)> {
        find_in(&self.fragments, tag)
    }

    pub fn lists(&self) -> &[ListChunk] {
        &self.lists
    }

    /// Display name recovered from `LIST`/`adtl` labels.
    pub fn label(&self) -> Option<String> {
        self.lists.iter().find_map(ListChunk::name_label)
    }
}

fn find_in(fragments: &FragmentMap, tag: &FourCC) -> Option<(u64, ChunkFragment)> {
    fragments
        .iter()
        .find(|(_, f)| &f.tag == tag)
        .map(|(&offset, &f)| (offset, f))
}
