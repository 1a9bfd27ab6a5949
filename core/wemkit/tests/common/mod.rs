//! Synthetic `.wem` builders shared by the integration tests.
#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Cursor;
use wemkit::{BitWrite, BitWriter, CodebookLibrary};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
    out.extend_from_slice(payload);
    out
}

/// `RIFF`/`WAVE` around the given chunks.
pub fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut body = b"WAVE".to_vec();
    for c in chunks {
        body.extend_from_slice(c);
    }
    chunk(b"RIFF", &body)
}

fn base_fmt(tag: u16, channels: u16, sample_rate: u32, byte_rate: u32, block_size: u16) -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.write_u16::<LittleEndian>(tag).unwrap();
    fmt.write_u16::<LittleEndian>(channels).unwrap();
    fmt.write_u32::<LittleEndian>(sample_rate).unwrap();
    fmt.write_u32::<LittleEndian>(byte_rate).unwrap();
    fmt.write_u16::<LittleEndian>(block_size).unwrap();
    fmt.write_u16::<LittleEndian>(0).unwrap();
    fmt.write_u16::<LittleEndian>(0).unwrap();
    fmt.write_u16::<LittleEndian>(0).unwrap();
    fmt
}

// ---------------------------------------------------------------------------
// Vorbis
// ---------------------------------------------------------------------------

/// Stripped codebook: 1 dimension, 2 entries, 1-bit lengths, no lookup.
pub fn tiny_codebook() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(1, 4).unwrap();
    w.write_bits(2, 14).unwrap();
    w.write_bits(0, 1).unwrap();
    w.write_bits(1, 3).unwrap();
    w.write_bits(0, 1).unwrap();
    w.write_bits(0, 1).unwrap();
    w.write_bits(0, 1).unwrap();
    w.write_bits(0, 1).unwrap();
    w.into_inner()
}

/// Packed library bytes holding `count` copies of [`tiny_codebook`].
pub fn library_bytes(count: usize) -> Vec<u8> {
    let book = tiny_codebook();
    let mut data = Vec::new();
    let mut offsets = Vec::new();
    for _ in 0..count {
        offsets.push(data.len() as u32);
        data.extend_from_slice(&book);
    }
    let table_offset = data.len() as u32;
    for offset in offsets {
        data.write_u32::<LittleEndian>(offset).unwrap();
    }
    data.write_u32::<LittleEndian>(table_offset).unwrap();
    data
}

pub fn tiny_library() -> CodebookLibrary {
    CodebookLibrary::from_bytes(&library_bytes(1)).unwrap()
}

/// One-channel stripped setup with a short and a long mode. The floor's
/// masterbook is `floor_book`.
pub fn stripped_setup(floor_book: u32) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 8).unwrap();
    w.write_bits(0, 10).unwrap();

    // one type-1 floor
    w.write_bits(0, 6).unwrap();
    w.write_bits(1, 5).unwrap();
    w.write_bits(0, 4).unwrap();
    w.write_bits(0, 3).unwrap();
    w.write_bits(1, 2).unwrap();
    w.write_bits(floor_book, 8).unwrap();
    w.write_bits(0, 8).unwrap();
    w.write_bits(1, 8).unwrap();
    w.write_bits(0, 2).unwrap();
    w.write_bits(4, 4).unwrap();
    w.write_bits(5, 4).unwrap();

    // one type-1 residue
    w.write_bits(0, 6).unwrap();
    w.write_bits(1, 2).unwrap();
    w.write_bits(0, 24).unwrap();
    w.write_bits(64, 24).unwrap();
    w.write_bits(15, 24).unwrap();
    w.write_bits(0, 6).unwrap();
    w.write_bits(0, 8).unwrap();
    w.write_bits(1, 3).unwrap();
    w.write_bits(0, 1).unwrap();
    w.write_bits(0, 8).unwrap();

    // one mapping
    w.write_bits(0, 6).unwrap();
    w.write_bits(0, 1).unwrap();
    w.write_bits(0, 1).unwrap();
    w.write_bits(0, 2).unwrap();
    w.write_bits(0, 8).unwrap();
    w.write_bits(0, 8).unwrap();
    w.write_bits(0, 8).unwrap();

    // two modes: short, long
    w.write_bits(1, 6).unwrap();
    w.write_bits(0, 1).unwrap();
    w.write_bits(0, 8).unwrap();
    w.write_bits(1, 1).unwrap();
    w.write_bits(0, 8).unwrap();
    w.into_inner()
}

pub struct VorbisWem {
    pub sample_count: u32,
    pub mod_signal: u32,
    pub floor_book: u32,
    pub audio: Vec<Vec<u8>>,
    pub smpl: Option<(u32, u32, u32)>,
}

impl Default for VorbisWem {
    fn default() -> Self {
        Self {
            sample_count: 4096,
            // plain Vorbis packets
            mod_signal: 0x4A,
            floor_book: 0,
            // long window, then short window
            audio: vec![vec![0xAA, 0xBB], vec![0xCC]],
            smpl: None,
        }
    }
}

impl VorbisWem {
    /// Mono 48 kHz stream in the granule-less 0x2A `vorb` layout.
    pub fn build(&self) -> Vec<u8> {
        let setup = stripped_setup(self.floor_book);
        let mut data = Vec::new();
        data.write_u16::<LittleEndian>(setup.len() as u16).unwrap();
        data.extend_from_slice(&setup);
        let first_audio = data.len() as u32;
        for packet in &self.audio {
            data.write_u16::<LittleEndian>(packet.len() as u16).unwrap();
            data.extend_from_slice(packet);
        }

        let mut vorb = vec![0u8; 0x2A];
        vorb[0..4].copy_from_slice(&self.sample_count.to_le_bytes());
        vorb[4..8].copy_from_slice(&self.mod_signal.to_le_bytes());
        vorb[0x14..0x18].copy_from_slice(&first_audio.to_le_bytes());
        vorb[0x28] = 8;
        vorb[0x29] = 11;

        let mut chunks = vec![
            chunk(b"fmt ", &base_fmt(0xFFFF, 1, 48000, 8000, 0)),
            chunk(b"vorb", &vorb),
        ];
        if let Some((count, start, end)) = self.smpl {
            let mut smpl = vec![0u8; 0x3C];
            smpl[0x1C..0x20].copy_from_slice(&count.to_le_bytes());
            smpl[0x2C..0x30].copy_from_slice(&start.to_le_bytes());
            smpl[0x30..0x34].copy_from_slice(&end.to_le_bytes());
            chunks.push(chunk(b"smpl", &smpl));
        }
        chunks.push(chunk(b"data", &data));
        riff(&chunks)
    }
}

// ---------------------------------------------------------------------------
// Opus
// ---------------------------------------------------------------------------

/// 20 ms CELT frame, one frame per packet: 960 samples at 48 kHz.
pub fn celt_frame(tag: u8) -> Vec<u8> {
    vec![0xF8, tag, tag]
}

pub struct OpusWem {
    pub channels: u16,
    pub channel_layout: u32,
    pub sample_count: u32,
    pub pre_skip: u16,
    pub mapping_family: u8,
    pub frames: Vec<Vec<u8>>,
}

impl Default for OpusWem {
    fn default() -> Self {
        Self {
            channels: 2,
            channel_layout: (0x3 << 12) | (1 << 8) | 2,
            sample_count: 2500,
            pre_skip: 0,
            mapping_family: 1,
            frames: (0..4).map(celt_frame).collect(),
        }
    }
}

impl OpusWem {
    pub fn build(&self) -> Vec<u8> {
        let mut fmt = base_fmt(0x3041, self.channels, 48000, 0, 0);
        fmt.write_u32::<LittleEndian>(self.channel_layout).unwrap();
        fmt.write_u32::<LittleEndian>(self.sample_count).unwrap();
        fmt.write_u32::<LittleEndian>(self.frames.len() as u32).unwrap();
        fmt.write_u16::<LittleEndian>(self.pre_skip).unwrap();
        fmt.write_u8(1).unwrap();
        fmt.write_u8(self.mapping_family).unwrap();

        let mut seek = Vec::new();
        let mut data = Vec::new();
        for frame in &self.frames {
            seek.write_u16::<LittleEndian>(frame.len() as u16).unwrap();
            data.extend_from_slice(frame);
        }

        riff(&[chunk(b"fmt ", &fmt), chunk(b"seek", &seek), chunk(b"data", &data)])
    }
}

// ---------------------------------------------------------------------------
// PTADPCM
// ---------------------------------------------------------------------------

/// Bytes per channel frame used by [`adpcm_wem`]: 10 samples each.
pub const ADPCM_FRAME_SIZE: u16 = 9;

/// Channel frame with the given history and a constant nibble.
pub fn adpcm_frame(hist2: i16, hist1: i16, step: u8, nibbles: u8) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.write_i16::<LittleEndian>(hist2).unwrap();
    frame.write_i16::<LittleEndian>(hist1).unwrap();
    frame.push(step);
    frame.extend_from_slice(&[nibbles; (ADPCM_FRAME_SIZE - 5) as usize]);
    frame
}

/// Stereo 22050 Hz stream; `frames` holds interleaved channel frames.
pub fn adpcm_wem(frames: &[Vec<u8>]) -> Vec<u8> {
    let channels = 2u16;
    let fmt = base_fmt(0x8311, channels, 22050, 0, ADPCM_FRAME_SIZE * channels);
    let data: Vec<u8> = frames.concat();
    riff(&[chunk(b"fmt ", &fmt), chunk(b"data", &data)])
}

/// Channel 0 ramps by 100 per sample; channel 1 holds -5.
pub fn ramp_adpcm_wem() -> Vec<u8> {
    adpcm_wem(&[
        adpcm_frame(100, 200, 0, 0x77),
        adpcm_frame(-5, -5, 0, 0x87),
        adpcm_frame(1100, 1200, 0, 0x77),
        adpcm_frame(-5, -5, 0, 0x87),
    ])
}

// ---------------------------------------------------------------------------
// Ogg inspection
// ---------------------------------------------------------------------------

/// Every packet of an Ogg stream with its page granule and end-of-stream
/// flag. Reading through `ogg` also checks page CRCs.
pub fn ogg_packets(data: &[u8]) -> Vec<(Vec<u8>, u64, bool)> {
    let mut reader = ogg::PacketReader::new(Cursor::new(data));
    let mut packets = Vec::new();
    while let Some(packet) = reader.read_packet().unwrap() {
        let granule = packet.absgp_page();
        let eos = packet.last_in_stream();
        packets.push((packet.data, granule, eos));
    }
    packets
}
