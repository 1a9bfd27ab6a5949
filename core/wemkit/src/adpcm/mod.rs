//! Wwise PTADPCM to PCM WAVE.
//!
//! Each channel's frame holds two verbatim 16-bit history samples, a step
//! index byte and packed 4-bit deltas. Frames of all channels are
//! interleaved in the `data` chunk.

pub mod decoder;

pub use decoder::{decode_frame, write_wav_header, AdpcmDecoder, WAV_HEADER_SIZE};
