use crate::error::{WemError, WemResult};
use crate::format::{AdpcmLayout, Codec, FormatExtra};
use crate::riff::RiffFile;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::debug;

/// Size of the canonical PCM WAVE header written in front of the samples.
pub const WAV_HEADER_SIZE: usize = 44;

const MAX_STEP_INDEX: u8 = 12;

/// `(delta, next step index)` per step index and nibble.
///
/// The last row only exists so a step index byte of 12 stays in range; it
/// continues the doubling of the rows before it.
#[rustfmt::skip]
pub(crate) const PTADPCM_TABLE: [[(i32, u8); 16]; 13] = [
    [
        (-14, 2), (-10, 2), (-7, 1), (-5, 1), (-3, 0), (-2, 0), (-1, 0), (0, 0),
        (0, 0), (1, 0), (2, 0), (3, 0), (5, 1), (7, 1), (10, 2), (14, 2),
    ],
    [
        (-28, 3), (-20, 3), (-14, 2), (-10, 2), (-7, 1), (-5, 1), (-3, 1), (-1, 0),
        (1, 0), (3, 1), (5, 1), (7, 1), (10, 2), (14, 2), (20, 3), (28, 3),
    ],
    [
        (-56, 4), (-40, 4), (-28, 3), (-20, 3), (-14, 2), (-10, 2), (-6, 2), (-2, 1),
        (2, 1), (6, 2), (10, 2), (14, 2), (20, 3), (28, 3), (40, 4), (56, 4),
    ],
    [
        (-112, 5), (-80, 5), (-56, 4), (-40, 4), (-28, 3), (-20, 3), (-12, 3), (-4, 2),
        (4, 2), (12, 3), (20, 3), (28, 3), (40, 4), (56, 4), (80, 5), (112, 5),
    ],
    [
        (-224, 6), (-160, 6), (-112, 5), (-80, 5), (-56, 4), (-40, 4), (-24, 4), (-8, 3),
        (8, 3), (24, 4), (40, 4), (56, 4), (80, 5), (112, 5), (160, 6), (224, 6),
    ],
    [
        (-448, 7), (-320, 7), (-224, 6), (-160, 6), (-112, 5), (-80, 5), (-48, 5), (-16, 4),
        (16, 4), (48, 5), (80, 5), (112, 5), (160, 6), (224, 6), (320, 7), (448, 7),
    ],
    [
        (-896, 8), (-640, 8), (-448, 7), (-320, 7), (-224, 6), (-160, 6), (-96, 6), (-32, 5),
        (32, 5), (96, 6), (160, 6), (224, 6), (320, 7), (448, 7), (640, 8), (896, 8),
    ],
    [
        (-1792, 9), (-1280, 9), (-896, 8), (-640, 8), (-448, 7), (-320, 7), (-192, 7), (-64, 6),
        (64, 6), (192, 7), (320, 7), (448, 7), (640, 8), (896, 8), (1280, 9), (1792, 9),
    ],
    [
        (-3584, 10), (-2560, 10), (-1792, 9), (-1280, 9), (-896, 8), (-640, 8), (-384, 8), (-128, 7),
        (128, 7), (384, 8), (640, 8), (896, 8), (1280, 9), (1792, 9), (2560, 10), (3584, 10),
    ],
    [
        (-7168, 11), (-5120, 11), (-3584, 10), (-2560, 10), (-1792, 9), (-1280, 9), (-768, 9), (-256, 8),
        (256, 8), (768, 9), (1280, 9), (1792, 9), (2560, 10), (3584, 10), (5120, 11), (7168, 11),
    ],
    [
        (-14336, 11), (-10240, 11), (-7168, 11), (-5120, 11), (-3584, 10), (-2560, 10), (-1536, 10), (-512, 9),
        (512, 9), (1536, 10), (2560, 10), (3584, 10), (5120, 11), (7168, 11), (10240, 11), (14336, 11),
    ],
    [
        (-28672, 11), (-20480, 11), (-14336, 11), (-10240, 11), (-7168, 11), (-5120, 11), (-3072, 11), (-1024, 10),
        (1024, 10), (3072, 11), (5120, 11), (7168, 11), (10240, 11), (14336, 11), (20480, 11), (28672, 11),
    ],
    [
        (-57344, 11), (-40960, 11), (-28672, 11), (-20480, 11), (-14336, 11), (-10240, 11), (-6144, 11), (-2048, 11),
        (2048, 11), (6144, 11), (10240, 11), (14336, 11), (20480, 11), (28672, 11), (40960, 11), (57344, 11),
    ],
];

fn clamp_s16(val: i32) -> i16 {
    val.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Decode one channel's frame into `out`.
///
/// The frame starts with two history samples and a step index; every
/// following nibble (low nibble first) predicts the next sample from the
/// two before it.
pub fn decode_frame(frame: &[u8], samples_per_frame: usize, out: &mut Vec<i16>) {
    let mut hist2 = i16::from_le_bytes([frame[0], frame[1]]);
    let mut hist1 = i16::from_le_bytes([frame[2], frame[3]]);
    let mut step_index = frame[4].min(MAX_STEP_INDEX);

    out.push(hist2);
    out.push(hist1);

    for i in 0..samples_per_frame.saturating_sub(2) {
        let byte = frame[5 + i / 2];
        let nibble = if i & 1 == 0 { byte & 0x0F } else { byte >> 4 };

        let (delta, next) = PTADPCM_TABLE[step_index as usize][nibble as usize];
        step_index = next;

        let sample = clamp_s16(delta + 2 * hist1 as i32 - hist2 as i32);
        out.push(sample);

        hist2 = hist1;
        hist1 = sample;
    }
}

/// Write the 44-byte PCM WAVE header for `sample_frames` interleaved frames.
pub fn write_wav_header<W: Write>(
    out: &mut W,
    channels: u16,
    sample_rate: u32,
    sample_frames: u64,
) -> WemResult<()> {
    let block_align = channels as u32 * 2;
    let data_len = u32::try_from(sample_frames * block_align as u64)
        .map_err(|_| WemError::format("decoded PCM does not fit in a WAVE file"))?;

    out.write_all(b"RIFF")?;
    out.write_u32::<LittleEndian>(data_len + (WAV_HEADER_SIZE as u32 - 8))?;
    out.write_all(b"WAVE")?;
    out.write_all(b"fmt ")?;
    out.write_u32::<LittleEndian>(16)?;
    out.write_u16::<LittleEndian>(1)?; // PCM
    out.write_u16::<LittleEndian>(channels)?;
    out.write_u32::<LittleEndian>(sample_rate)?;
    out.write_u32::<LittleEndian>(sample_rate.wrapping_mul(block_align))?;
    out.write_u16::<LittleEndian>(block_align as u16)?;
    out.write_u16::<LittleEndian>(16)?;
    out.write_all(b"data")?;
    out.write_u32::<LittleEndian>(data_len)?;
    Ok(())
}

/// Decodes Wwise PTADPCM to 16-bit PCM WAVE.
pub struct AdpcmDecoder<R: Read + Seek> {
    input: R,
    riff: RiffFile,
    layout: AdpcmLayout,
}

impl<R: Read + Seek> AdpcmDecoder<R> {
    pub fn open(mut input: R) -> WemResult<Self> {
        let riff = RiffFile::parse(&mut input)?;
        Self::from_riff(input, riff)
    }

    pub fn from_riff(input: R, riff: RiffFile) -> WemResult<Self> {
        let format = riff.format();
        let layout = match (&format.codec, &format.extra) {
            (Codec::PtAdpcm, FormatExtra::Adpcm(layout)) => *layout,
            _ => return Err(WemError::format("not a Wwise PTADPCM stream")),
        };

        Ok(Self { input, riff, layout })
    }

    pub fn layout(&self) -> &AdpcmLayout {
        &self.layout
    }

    pub fn riff(&self) -> &RiffFile {
        &self.riff
    }

    /// Whole frames held by the `data` chunk, per channel.
    pub fn frame_count(&self) -> u64 {
        let channels = self.riff.format().channels as u64;
        self.riff.data_size() as u64 / (channels * self.layout.interleaved_frame_size as u64)
    }

    /// Samples per channel.
    pub fn sample_count(&self) -> u64 {
        self.frame_count() * self.layout.samples_per_frame as u64
    }

    /// Decode to planar samples, one vector per channel.
    pub fn decode_channels(&mut self) -> WemResult<Vec<Vec<i16>>> {
        let channels = self.riff.format().channels as usize;
        let frame_size = self.layout.interleaved_frame_size as usize;
        let samples_per_frame = self.layout.samples_per_frame as usize;
        let frames = self.frame_count() as usize;

        let mut data = vec![0u8; self.riff.data_size() as usize];
        self.input.seek(SeekFrom::Start(self.riff.data_offset()))?;
        self.input.read_exact(&mut data)?;

        let mut planar = vec![Vec::with_capacity(frames * samples_per_frame); channels];
        for (index, frame) in data.chunks_exact(frame_size).take(frames * channels).enumerate() {
            decode_frame(frame, samples_per_frame, &mut planar[index % channels]);
        }

        Ok(planar)
    }

    /// Write the decoded stream as a PCM WAVE file.
    ///
    /// Nothing is written unless decoding succeeds.
    pub fn write_wav<W: Write>(&mut self, mut output: W) -> WemResult<()> {
        let format = self.riff.format();
        let (channels, sample_rate) = (format.channels, format.sample_rate);
        let planar = self.decode_channels()?;
        let sample_frames = self.sample_count();

        let mut wav = Vec::with_capacity(WAV_HEADER_SIZE + sample_frames as usize * channels as usize * 2);
        write_wav_header(&mut wav, channels, sample_rate, sample_frames)?;
        for i in 0..sample_frames as usize {
            for channel in &planar {
                wav.write_i16::<LittleEndian>(channel[i])?;
            }
        }

        debug!(channels, sample_rate, samples = sample_frames, "decoded PTADPCM");
        output.write_all(&wav)?;
        Ok(())
    }
}
