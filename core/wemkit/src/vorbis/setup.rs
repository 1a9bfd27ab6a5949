//! Rebuilding the Vorbis setup header from its Wwise-stripped form.
//!
//! Wwise drops every field of the setup header whose value is implied
//! (floor and mapping types, time-domain placeholders, window and
//! transform types) and replaces codebooks with 10-bit library ids.
//! Everything that survives is replayed here in order, with the missing
//! fields put back and every cross reference bounds-checked.

use super::helpers::ilog;
use crate::bit_reader::{BitRead, BitSliceReader};
use crate::bit_writer::{BitWrite, BitWriter};
use crate::codebook::CodebookLibrary;
use crate::error::{WemError, WemResult};
use tracing::{debug, trace};

/// Packet type and magic shared by the three Vorbis headers.
pub(crate) fn write_header_magic<W: BitWrite>(writer: &mut W, packet_type: u8) -> WemResult<()> {
    writer.write_bits(packet_type as u32, 8)?;
    for byte in b"vorbis" {
        writer.write_bits(*byte as u32, 8)?;
    }
    Ok(())
}

/// Codebook id that, when missing from the library, usually means the
/// setup packet is a full (non-stripped) one.
const FULL_SETUP_HINT_ID: u32 = 0x342;
const FULL_SETUP_HINT_IDENTIFIER: u32 = 0x1590;

/// Rebuilt setup header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuiltSetup {
    /// The full Vorbis setup packet, framing bit included.
    pub packet: Vec<u8>,
    /// Blockflag of every mode, in mode order. Empty for full setups,
    /// which are copied without being parsed.
    pub mode_blockflags: Vec<bool>,
}

impl RebuiltSetup {
    /// Width of the mode number at the start of each audio packet.
    pub fn mode_bits(&self) -> u8 {
        match self.mode_blockflags.len() {
            0 => 0,
            count => ilog(count as u32 - 1),
        }
    }
}

/// Replays a stripped setup packet.
pub struct SetupRebuilder<'a> {
    codebooks: &'a CodebookLibrary,
    channels: u16,
    inline_codebooks: bool,
    full_setup: bool,
}

impl<'a> SetupRebuilder<'a> {
    pub fn new(codebooks: &'a CodebookLibrary, channels: u16) -> Self {
        Self {
            codebooks,
            channels,
            inline_codebooks: false,
            full_setup: false,
        }
    }

    pub fn inline_codebooks(mut self, value: bool) -> Self {
        self.inline_codebooks = value;
        self
    }

    pub fn full_setup(mut self, value: bool) -> Self {
        self.full_setup = value;
        self
    }

    /// Rebuild the setup header from the payload of the Wwise setup packet.
    pub fn rebuild(&self, payload: &[u8]) -> WemResult<RebuiltSetup> {
        let mut reader = BitSliceReader::new(payload);
        let mut writer = BitWriter::new();
        write_header_magic(&mut writer, 5)?;

        let codebook_count_less1 = reader.read_bits(8)?;
        let codebook_count = codebook_count_less1 + 1;
        writer.write_bits(codebook_count_less1, 8)?;

        for _ in 0..codebook_count {
            self.rebuild_codebook(&mut reader, &mut writer)?;
        }
        debug!(codebook_count, "rebuilt setup codebooks");

        // Time domain transforms, placeholders only
        writer.write_bits(0, 6)?;
        writer.write_bits(0, 16)?;

        let mode_blockflags = if self.full_setup {
            let total_bits = payload.len() as u64 * 8;
            while reader.total_bits_read() < total_bits {
                writer.write_bits(reader.read_bits(1)?, 1)?;
            }
            Vec::new()
        } else {
            let flags = rebuild_configuration(self.channels, &mut reader, &mut writer, codebook_count)?;
            writer.write_bits(1, 1)?;
            flags
        };

        Ok(RebuiltSetup {
            packet: writer.into_inner(),
            mode_blockflags,
        })
    }

    fn rebuild_codebook(&self, reader: &mut BitSliceReader<'_>, writer: &mut BitWriter) -> WemResult<()> {
        if self.inline_codebooks {
            return if self.full_setup {
                CodebookLibrary::copy(reader, writer)
            } else {
                CodebookLibrary::rebuild_from_reader(reader, writer)
            };
        }

        let codebook_id = reader.read_bits(10)?;
        trace!(codebook_id, "rebuilding codebook from library");
        match self.codebooks.rebuild(codebook_id as usize, writer) {
            Err(WemError::Lookup { index, count }) => {
                if codebook_id == FULL_SETUP_HINT_ID
                    && reader.read_bits(14)? == FULL_SETUP_HINT_IDENTIFIER
                {
                    return Err(WemError::corrupt_setup(
                        "invalid codebook id 0x342, setup looks like a full setup",
                    ));
                }
                Err(WemError::Lookup { index, count })
            }
            other => other,
        }
    }
}

/// Floors, residues, mappings, then modes. Returns the mode blockflags.
fn rebuild_configuration<B: BitRead, W: BitWrite>(
    channels: u16,
    reader: &mut B,
    writer: &mut W,
    codebook_count: u32,
) -> WemResult<Vec<bool>> {
    let floor_count_less1 = reader.read_bits(6)?;
    let floor_count = floor_count_less1 + 1;
    writer.write_bits(floor_count_less1, 6)?;

    for _ in 0..floor_count {
        // Wwise only uses floor type 1
        writer.write_bits(1, 16)?;
        rebuild_floor(reader, writer, codebook_count)?;
    }

    let residue_count_less1 = reader.read_bits(6)?;
    let residue_count = residue_count_less1 + 1;
    writer.write_bits(residue_count_less1, 6)?;

    for _ in 0..residue_count {
        rebuild_residue(reader, writer, codebook_count)?;
    }

    let mapping_count_less1 = reader.read_bits(6)?;
    let mapping_count = mapping_count_less1 + 1;
    writer.write_bits(mapping_count_less1, 6)?;

    for _ in 0..mapping_count {
        rebuild_mapping(channels, reader, writer, floor_count, residue_count)?;
    }

    let mode_count_less1 = reader.read_bits(6)?;
    let mode_count = mode_count_less1 + 1;
    writer.write_bits(mode_count_less1, 6)?;

    let mut mode_blockflags = Vec::with_capacity(mode_count as usize);
    for _ in 0..mode_count {
        let block_flag = reader.read_bits(1)?;
        writer.write_bits(block_flag, 1)?;
        mode_blockflags.push(block_flag != 0);

        // window type and transform type, only 0 is valid
        writer.write_bits(0, 16)?;
        writer.write_bits(0, 16)?;

        let mapping = reader.read_bits(8)?;
        writer.write_bits(mapping, 8)?;
        if mapping >= mapping_count {
            return Err(WemError::corrupt_setup("invalid mode mapping"));
        }
    }

    debug!(
        floor_count,
        residue_count, mapping_count, mode_count, "rebuilt setup configuration"
    );

    Ok(mode_blockflags)
}

fn rebuild_floor<B: BitRead, W: BitWrite>(reader: &mut B, writer: &mut W, codebook_count: u32) -> WemResult<()> {
    let partitions = reader.read_bits(5)?;
    writer.write_bits(partitions, 5)?;

    let mut partition_classes = Vec::with_capacity(partitions as usize);
    for _ in 0..partitions {
        let class = reader.read_bits(4)?;
        writer.write_bits(class, 4)?;
        partition_classes.push(class);
    }

    let maximum_class = partition_classes.iter().copied().max().unwrap_or(0);
    let mut class_dimensions = Vec::with_capacity(maximum_class as usize + 1);

    for _ in 0..=maximum_class {
        let dimensions_less1 = reader.read_bits(3)?;
        writer.write_bits(dimensions_less1, 3)?;
        class_dimensions.push(dimensions_less1 + 1);

        let subclasses = reader.read_bits(2)?;
        writer.write_bits(subclasses, 2)?;

        if subclasses != 0 {
            let masterbook = reader.read_bits(8)?;
            writer.write_bits(masterbook, 8)?;
            if masterbook >= codebook_count {
                return Err(WemError::corrupt_setup("invalid floor1 masterbook"));
            }
        }

        for _ in 0..(1u32 << subclasses) {
            let subclass_book_plus1 = reader.read_bits(8)?;
            writer.write_bits(subclass_book_plus1, 8)?;
            if subclass_book_plus1 > 0 && subclass_book_plus1 - 1 >= codebook_count {
                return Err(WemError::corrupt_setup("invalid floor1 subclass book"));
            }
        }
    }

    let multiplier_less1 = reader.read_bits(2)?;
    writer.write_bits(multiplier_less1, 2)?;

    let rangebits = reader.read_bits(4)? as u8;
    writer.write_bits(rangebits as u32, 4)?;

    for &class in &partition_classes {
        for _ in 0..class_dimensions[class as usize] {
            let x = reader.read_bits(rangebits)?;
            writer.write_bits(x, rangebits)?;
        }
    }

    Ok(())
}

fn rebuild_residue<B: BitRead, W: BitWrite>(reader: &mut B, writer: &mut W, codebook_count: u32) -> WemResult<()> {
    let residue_type = reader.read_bits(2)?;
    writer.write_bits(residue_type, 16)?;
    if residue_type > 2 {
        return Err(WemError::corrupt_setup("invalid residue type"));
    }

    let begin = reader.read_bits(24)?;
    let end = reader.read_bits(24)?;
    let partition_size_less1 = reader.read_bits(24)?;
    let classifications_less1 = reader.read_bits(6)?;
    let classbook = reader.read_bits(8)?;

    writer.write_bits(begin, 24)?;
    writer.write_bits(end, 24)?;
    writer.write_bits(partition_size_less1, 24)?;
    writer.write_bits(classifications_less1, 6)?;
    writer.write_bits(classbook, 8)?;

    if classbook >= codebook_count {
        return Err(WemError::corrupt_setup("invalid residue classbook"));
    }

    let classifications = classifications_less1 + 1;
    let mut cascade = Vec::with_capacity(classifications as usize);

    for _ in 0..classifications {
        let low_bits = reader.read_bits(3)?;
        writer.write_bits(low_bits, 3)?;

        let bitflag = reader.read_bits(1)?;
        writer.write_bits(bitflag, 1)?;

        let high_bits = if bitflag != 0 {
            let high_bits = reader.read_bits(5)?;
            writer.write_bits(high_bits, 5)?;
            high_bits
        } else {
            0
        };

        cascade.push(high_bits * 8 + low_bits);
    }

    for &books in &cascade {
        for k in 0..8 {
            if books & (1 << k) != 0 {
                let book = reader.read_bits(8)?;
                writer.write_bits(book, 8)?;
                if book >= codebook_count {
                    return Err(WemError::corrupt_setup("invalid residue book"));
                }
            }
        }
    }

    Ok(())
}

fn rebuild_mapping<B: BitRead, W: BitWrite>(
    channels: u16,
    reader: &mut B,
    writer: &mut W,
    floor_count: u32,
    residue_count: u32,
) -> WemResult<()> {
    // mapping type 0
    writer.write_bits(0, 16)?;

    let submaps_flag = reader.read_bits(1)?;
    writer.write_bits(submaps_flag, 1)?;

    let submaps = if submaps_flag != 0 {
        let submaps_less1 = reader.read_bits(4)?;
        writer.write_bits(submaps_less1, 4)?;
        submaps_less1 + 1
    } else {
        1
    };

    let square_polar_flag = reader.read_bits(1)?;
    writer.write_bits(square_polar_flag, 1)?;

    if square_polar_flag != 0 {
        let coupling_steps_less1 = reader.read_bits(8)?;
        writer.write_bits(coupling_steps_less1, 8)?;

        let coupling_bits = ilog((channels as u32).saturating_sub(1));
        for _ in 0..=coupling_steps_less1 {
            let magnitude = reader.read_bits(coupling_bits)?;
            let angle = reader.read_bits(coupling_bits)?;
            writer.write_bits(magnitude, coupling_bits)?;
            writer.write_bits(angle, coupling_bits)?;

            if angle == magnitude || magnitude >= channels as u32 || angle >= channels as u32 {
                return Err(WemError::corrupt_setup("invalid coupling"));
            }
        }
    }

    // a rare reserved field not removed by Wwise
    let reserved = reader.read_bits(2)?;
    writer.write_bits(reserved, 2)?;
    if reserved != 0 {
        return Err(WemError::corrupt_setup("mapping reserved field nonzero"));
    }

    if submaps > 1 {
        for _ in 0..channels {
            let mux = reader.read_bits(4)?;
            writer.write_bits(mux, 4)?;
            if mux >= submaps {
                return Err(WemError::corrupt_setup("mapping mux >= submaps"));
            }
        }
    }

    for _ in 0..submaps {
        let time_config = reader.read_bits(8)?;
        writer.write_bits(time_config, 8)?;

        let floor_number = reader.read_bits(8)?;
        writer.write_bits(floor_number, 8)?;
        if floor_number >= floor_count {
            return Err(WemError::corrupt_setup("invalid floor mapping"));
        }

        let residue_number = reader.read_bits(8)?;
        writer.write_bits(residue_number, 8)?;
        if residue_number >= residue_count {
            return Err(WemError::corrupt_setup("invalid residue mapping"));
        }
    }

    Ok(())
}
