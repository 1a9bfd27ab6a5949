//! Codec dispatch.
//!
//! [`WemDecoder::open`] parses the container once and hands the parsed
//! [`RiffFile`] to the converter selected by the `fmt ` codec tag.

use crate::adpcm::AdpcmDecoder;
use crate::codebook::CodebookLibrary;
use crate::error::WemResult;
use crate::format::Codec;
use crate::opus::OpusReconstructor;
use crate::options::ConversionOptions;
use crate::riff::RiffFile;
use crate::vorbis::VorbisReconstructor;
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::debug;

/// Container produced by [`WemDecoder::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputFormat {
    Ogg,
    Wav,
    /// Input copied unchanged.
    Wem,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Ogg => "ogg",
            OutputFormat::Wav => "wav",
            OutputFormat::Wem => "wem",
        }
    }
}

/// One converter per supported codec.
pub enum WemDecoder<'a, R: Read + Seek> {
    Vorbis(VorbisReconstructor<'a, R>),
    Opus(OpusReconstructor<R>),
    Adpcm(AdpcmDecoder<R>),
    Passthrough { input: R, riff: RiffFile },
}

impl<'a, R: Read + Seek> WemDecoder<'a, R> {
    pub fn open(
        mut input: R,
        options: &ConversionOptions,
        codebooks: Option<&'a CodebookLibrary>,
    ) -> WemResult<Self> {
        let riff = RiffFile::parse(&mut input)?;
        let codec = riff.format().codec;
        debug!(?codec, "selected converter");

        Ok(match codec {
            Codec::Vorbis => Self::Vorbis(VorbisReconstructor::from_riff(input, riff, codebooks, options)?),
            Codec::Opus => Self::Opus(OpusReconstructor::from_riff(input, riff, options)?),
            Codec::PtAdpcm => Self::Adpcm(AdpcmDecoder::from_riff(input, riff)?),
            Codec::Other(_) => Self::Passthrough { input, riff },
        })
    }

    pub fn codec(&self) -> Codec {
        self.riff().format().codec
    }

    pub fn riff(&self) -> &RiffFile {
        match self {
            Self::Vorbis(v) => v.riff(),
            Self::Opus(o) => o.riff(),
            Self::Adpcm(a) => a.riff(),
            Self::Passthrough { riff, .. } => riff,
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        match self {
            Self::Vorbis(_) | Self::Opus(_) => OutputFormat::Ogg,
            Self::Adpcm(_) => OutputFormat::Wav,
            Self::Passthrough { .. } => OutputFormat::Wem,
        }
    }

    /// Convert the whole stream into `output`.
    pub fn decode<W: Write>(&mut self, mut output: W) -> WemResult<()> {
        match self {
            Self::Vorbis(v) => v.generate_ogg(output),
            Self::Opus(o) => o.generate_ogg(output),
            Self::Adpcm(a) => a.write_wav(output),
            Self::Passthrough { input, riff } => {
                input.seek(SeekFrom::Start(riff.start()))?;
                let mut bytes = Vec::new();
                input.read_to_end(&mut bytes)?;
                output.write_all(&bytes)?;
                Ok(())
            }
        }
    }
}
