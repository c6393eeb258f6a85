pub mod brush;
pub mod codec;
pub mod config;
pub mod errors;
pub mod features;
pub mod logging;
pub mod map;
pub mod quicksave;
pub mod raster;
pub mod terrain;

// Selective re-exports for external consumers

// Errors - every fallible operation returns these
pub use errors::{MapEditError, MapEditResult};

// Map - the aggregate most callers start from
pub use map::{MapDimensions, MapLayer, SpringMap};

// Editing entry points
pub use brush::{Brush, BrushAssets, BrushOperation};
pub use quicksave::QuickSave;
pub use raster::{Raster, Rgb};
