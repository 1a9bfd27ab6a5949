//! Wwise Vorbis to Ogg Vorbis.

pub mod granule;
pub mod helpers;
pub mod packet;
pub mod reconstructor;
pub mod setup;

pub use granule::GranuleNormalizer;
pub use helpers::{book_map_type1_quantvals, ilog};
pub use packet::{PacketLayout, VorbisPacket};
pub use reconstructor::{LoopPoints, VorbisInfo, VorbisReconstructor};
pub use setup::{RebuiltSetup, SetupRebuilder};
