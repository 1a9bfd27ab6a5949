//! wemkit: repackage Wwise `.wem` audio into standard containers.
//!
//! Wwise Vorbis streams are rebuilt into Ogg Vorbis, Wwise Opus into Ogg
//! Opus, and PTADPCM is decoded to 16-bit PCM WAVE. Everything else is
//! copied through unchanged. [`WemDecoder`] picks the right converter from
//! the `fmt ` codec tag.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//! use wemkit::{CodebookLibrary, ConversionOptions, WemDecoder};
//!
//! # fn main() -> wemkit::WemResult<()> {
//! let options = ConversionOptions::default();
//! let codebooks = CodebookLibrary::from_file(options.resolved_codebooks_path())?;
//! let input = BufReader::new(File::open("music.wem")?);
//! let mut decoder = WemDecoder::open(input, &options, Some(&codebooks))?;
//! let output = File::create(format!("music.{}", decoder.output_format().extension()))?;
//! decoder.decode(output)?;
//! # Ok(())
//! # }
//! ```

pub mod adpcm;
pub mod bit_reader;
pub mod bit_writer;
pub mod codebook;
pub mod decoder;
pub mod error;
pub mod format;
pub mod ogg_writer;
pub mod options;
pub mod opus;
pub mod process;
pub mod riff;
pub mod vorbis;

pub use adpcm::AdpcmDecoder;
pub use bit_reader::{BitRead, BitSliceReader};
pub use bit_writer::{BitWrite, BitWriter};
pub use codebook::CodebookLibrary;
pub use decoder::{OutputFormat, WemDecoder};
pub use error::{WemError, WemResult};
pub use format::{AdpcmLayout, Codec, FormatDescriptor, FormatExtra, OpusExtra};
pub use ogg_writer::{ogg_crc32, OggPacketWriter, MAX_PAGE_PAYLOAD};
pub use options::{ConversionOptions, ForcePacketFormat};
pub use opus::{frame_count, samples_per_frame, OpusHeader, OpusReconstructor};
pub use process::{convert_all, convert_entry, BatchReport, EntryReader, EntrySource, NameResolver};
pub use riff::{ChunkFragment, FourCC, ListChunk, RiffFile};
pub use vorbis::{
    book_map_type1_quantvals, ilog, GranuleNormalizer, LoopPoints, VorbisPacket, VorbisReconstructor,
};
