//! File codecs: bitmaps, raw and PNG heightmaps, and the tiled map pair.

pub mod binary;
pub mod bitmap;
pub mod compressor;
pub mod features;
pub mod naming;
pub mod png;
pub mod raw;
pub mod smf;
pub mod tiles;

pub use compressor::{Dxt1Compressor, RawTileCodec, TileCompressor};
pub use naming::{LayerFile, trim_layer_suffix};
pub use smf::HeightBounds;
