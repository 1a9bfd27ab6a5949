//! Shared Vorbis codebook library.
//!
//! Wwise setup packets reference codebooks by a 10-bit index into an
//! external library instead of embedding them. The library blob is
//! laid out as:
//!
//! ```text
//! [codebook 0][codebook 1]...[codebook n-1][offset table: n x u32][table offset: u32]
//! ```
//!
//! The trailing word is the size of the codebook data, which is also where
//! the offset table starts. Each codebook is stored in the same stripped
//! form that inline codebooks use.
//!
//! # Example
//!
//! ```no_run
//! use wemkit::CodebookLibrary;
//!
//! let codebooks = CodebookLibrary::from_file("packed_codebooks_aoTuV_603.bin")?;
//! assert!(codebooks.codebook_count() > 0);
//! # Ok::<(), wemkit::WemError>(())
//! ```

use crate::bit_reader::{BitRead, BitSliceReader};
use crate::bit_writer::BitWrite;
use crate::error::{WemError, WemResult};
use crate::vorbis::helpers::{book_map_type1_quantvals, ilog};
use byteorder::{ByteOrder, LittleEndian};
use std::path::Path;
use tracing::debug;

/// Sync pattern opening every full codebook ("BCV").
pub const CODEBOOK_SYNC: u32 = 0x564342;

/// Immutable after load; share it by reference across conversions.
#[derive(Debug, Clone)]
pub struct CodebookLibrary {
    data: Vec<u8>,
    /// Start of each codebook, followed by the end of the data as a sentinel.
    offsets: Vec<usize>,
}

impl CodebookLibrary {
    /// Create an empty codebook library.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            offsets: Vec::new(),
        }
    }

    /// Load codebooks from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> WemResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            WemError::missing_resource(format!("codebook library {}: {e}", path.display()))
        })?;
        let library = Self::from_bytes(&data)?;
        debug!(path = %path.display(), codebooks = library.codebook_count(), "loaded codebook library");
        Ok(library)
    }

    /// Load codebooks from a byte slice.
    pub fn from_bytes(data: &[u8]) -> WemResult<Self> {
        if data.len() < 4 {
            return Err(WemError::format("codebook library too short"));
        }

        let len = data.len();
        let table_offset = LittleEndian::read_u32(&data[len - 4..]) as usize;
        if table_offset > len - 4 {
            return Err(WemError::format("invalid codebook library offset table"));
        }

        let table = &data[table_offset..len - 4];
        if table.len() % 4 != 0 {
            return Err(WemError::format("invalid codebook library table size"));
        }

        let mut offsets = Vec::with_capacity(table.len() / 4 + 1);
        for entry in table.chunks_exact(4) {
            let offset = LittleEndian::read_u32(entry) as usize;
            if offset > table_offset || offsets.last().is_some_and(|&prev| offset < prev) {
                return Err(WemError::format("invalid codebook offset"));
            }
            offsets.push(offset);
        }
        offsets.push(table_offset);

        Ok(Self {
            data: data[..table_offset].to_vec(),
            offsets,
        })
    }

    /// Get the number of codebooks in the library.
    pub fn codebook_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Get a codebook by index.
    pub fn get_codebook(&self, index: usize) -> WemResult<&[u8]> {
        if index >= self.codebook_count() {
            return Err(WemError::lookup(index, self.codebook_count()));
        }
        Ok(&self.data[self.offsets[index]..self.offsets[index + 1]])
    }

    /// Re-emit codebook `index` in full Vorbis layout.
    pub fn rebuild<W: BitWrite>(&self, index: usize, output: &mut W) -> WemResult<()> {
        let codebook = self.get_codebook(index)?;
        let mut reader = BitSliceReader::new(codebook);
        rebuild_stripped(&mut reader, output)
    }

    /// Rebuild a stripped codebook stored inline in the setup packet.
    pub fn rebuild_from_reader<B: BitRead, W: BitWrite>(input: &mut B, output: &mut W) -> WemResult<()> {
        rebuild_stripped(input, output)
    }

    /// Copy a codebook that is already in full Vorbis layout.
    pub fn copy<B: BitRead, W: BitWrite>(input: &mut B, output: &mut W) -> WemResult<()> {
        // IN/OUT: 24 bit identifier, 16 bit dimensions, 24 bit entry count
        let id = input.read_bits(24)?;
        let dimensions = input.read_bits(16)?;
        let entries = input.read_bits(24)?;

        if id != CODEBOOK_SYNC {
            return Err(WemError::corrupt_setup("invalid codebook identifier"));
        }

        output.write_bits(id, 24)?;
        output.write_bits(dimensions, 16)?;
        output.write_bits(entries, 24)?;

        // IN/OUT: 1 bit ordered flag
        let ordered = input.read_bits(1)?;
        output.write_bits(ordered, 1)?;

        if ordered != 0 {
            copy_ordered_lengths(input, output, entries)?;
        } else {
            let sparse = input.read_bits(1)?;
            output.write_bits(sparse, 1)?;

            for _ in 0..entries {
                let present = if sparse != 0 {
                    let present = input.read_bits(1)?;
                    output.write_bits(present, 1)?;
                    present != 0
                } else {
                    true
                };

                if present {
                    let codeword_length = input.read_bits(5)?;
                    output.write_bits(codeword_length, 5)?;
                }
            }
        }

        let lookup_type = input.read_bits(4)?;
        output.write_bits(lookup_type, 4)?;
        match lookup_type {
            0 => Ok(()),
            1 => copy_lookup(input, output, entries, dimensions),
            2 => Err(WemError::corrupt_setup("didn't expect lookup type 2")),
            _ => Err(WemError::corrupt_setup("invalid lookup type")),
        }
    }
}

fn rebuild_stripped<B: BitRead, W: BitWrite>(input: &mut B, output: &mut W) -> WemResult<()> {
    // IN: 4 bit dimensions, 14 bit entry count
    let dimensions = input.read_bits(4)?;
    let entries = input.read_bits(14)?;

    // OUT: 24 bit identifier, 16 bit dimensions, 24 bit entry count
    output.write_bits(CODEBOOK_SYNC, 24)?;
    output.write_bits(dimensions, 16)?;
    output.write_bits(entries, 24)?;

    // IN/OUT: 1 bit ordered flag
    let ordered = input.read_bits(1)?;
    output.write_bits(ordered, 1)?;

    if ordered != 0 {
        copy_ordered_lengths(input, output, entries)?;
    } else {
        // IN: 3 bit codeword length length, 1 bit sparse flag
        let codeword_length_length = input.read_bits(3)?;
        let sparse = input.read_bits(1)?;

        if codeword_length_length == 0 || codeword_length_length > 5 {
            return Err(WemError::corrupt_setup("nonsense codeword length"));
        }

        // OUT: 1 bit sparse flag
        output.write_bits(sparse, 1)?;

        for _ in 0..entries {
            let present = if sparse != 0 {
                let present = input.read_bits(1)?;
                output.write_bits(present, 1)?;
                present != 0
            } else {
                true
            };

            if present {
                // IN: n bit codeword length-1, OUT: 5 bit codeword length-1
                let codeword_length = input.read_bits(codeword_length_length as u8)?;
                output.write_bits(codeword_length, 5)?;
            }
        }
    }

    // IN: 1 bit lookup type, OUT: 4 bit lookup type
    let lookup_type = input.read_bits(1)?;
    output.write_bits(lookup_type, 4)?;

    if lookup_type == 1 {
        copy_lookup(input, output, entries, dimensions)?;
    }
    Ok(())
}

fn copy_ordered_lengths<B: BitRead, W: BitWrite>(input: &mut B, output: &mut W, entries: u32) -> WemResult<()> {
    let initial_length = input.read_bits(5)?;
    output.write_bits(initial_length, 5)?;

    let mut current_entry = 0u32;
    while current_entry < entries {
        let num_bits = ilog(entries - current_entry);
        let number = input.read_bits(num_bits)?;
        output.write_bits(number, num_bits)?;
        current_entry += number;
    }

    if current_entry > entries {
        return Err(WemError::corrupt_setup("current_entry out of range"));
    }
    Ok(())
}

fn copy_lookup<B: BitRead, W: BitWrite>(
    input: &mut B,
    output: &mut W,
    entries: u32,
    dimensions: u32,
) -> WemResult<()> {
    let min = input.read_bits(32)?;
    let max = input.read_bits(32)?;
    let value_length = input.read_bits(4)?;
    let sequence_flag = input.read_bits(1)?;
    output.write_bits(min, 32)?;
    output.write_bits(max, 32)?;
    output.write_bits(value_length, 4)?;
    output.write_bits(sequence_flag, 1)?;

    let width = (value_length + 1) as u8;
    for _ in 0..book_map_type1_quantvals(entries, dimensions) {
        let val = input.read_bits(width)?;
        output.write_bits(val, width)?;
    }
    Ok(())
}
