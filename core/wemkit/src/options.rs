//! Conversion settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name the codebook library is usually shipped under.
pub const DEFAULT_CODEBOOKS_FILE: &str = "packed_codebooks_aoTuV_603.bin";

/// Vendor string written into Vorbis comment and OpusTags headers.
pub const DEFAULT_VENDOR: &str = concat!("wemkit ", env!("CARGO_PKG_VERSION"));

/// Specifies how to handle Wwise modified Vorbis packet format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForcePacketFormat {
    /// Detect from the mode-signal word of the `vorb` data.
    #[default]
    NoForce,
    /// Force interpretation as packed-mode-bits packets.
    ForceModPackets,
    /// Force interpretation as standard Vorbis packets.
    ForceNoModPackets,
}

/// Configuration options for a conversion.
///
/// # Example
///
/// ```
/// use wemkit::{ConversionOptions, ForcePacketFormat};
///
/// let options = ConversionOptions::default()
///     .with_opus_force_stereo(true)
///     .with_force_packet_format(ForcePacketFormat::ForceModPackets);
/// assert!(options.normalize_granules);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Where to load the Vorbis codebook library from.
    pub codebooks_path: Option<PathBuf>,

    /// Codebooks are stored (stripped) inside the setup packet instead of
    /// being referenced from the library.
    pub inline_codebooks: bool,

    /// The setup packet already holds a full Vorbis setup.
    pub full_setup: bool,

    pub force_packet_format: ForcePacketFormat,

    /// Collapse multichannel Opus to a stereo header. Lossy.
    pub opus_force_stereo: bool,

    /// Rewrite Vorbis granule positions after conversion when the
    /// normalizer is compiled in.
    pub normalize_granules: bool,

    pub vendor: String,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            codebooks_path: None,
            inline_codebooks: false,
            full_setup: false,
            force_packet_format: ForcePacketFormat::NoForce,
            opus_force_stereo: false,
            normalize_granules: true,
            vendor: DEFAULT_VENDOR.to_string(),
        }
    }
}

impl ConversionOptions {
    /// Create new default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codebooks_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.codebooks_path = Some(path.into());
        self
    }

    pub fn with_inline_codebooks(mut self, value: bool) -> Self {
        self.inline_codebooks = value;
        self
    }

    pub fn with_full_setup(mut self, value: bool) -> Self {
        self.full_setup = value;
        self
    }

    pub fn with_force_packet_format(mut self, format: ForcePacketFormat) -> Self {
        self.force_packet_format = format;
        self
    }

    pub fn with_opus_force_stereo(mut self, value: bool) -> Self {
        self.opus_force_stereo = value;
        self
    }

    pub fn with_normalize_granules(mut self, value: bool) -> Self {
        self.normalize_granules = value;
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    /// Codebook library path, falling back to the conventional file name.
    pub fn resolved_codebooks_path(&self) -> PathBuf {
        self.codebooks_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CODEBOOKS_FILE))
    }

    /// Whether a Vorbis conversion needs the external codebook library.
    pub fn needs_codebook_library(&self) -> bool {
        !self.inline_codebooks
    }
}
