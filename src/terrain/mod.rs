//! Whole-layer terrain operations: erosion, smoothing, quantization,
//! auto-texturing and noise generation.

pub mod autotexture;
pub mod erosion;
pub mod smooth;
pub mod terragen;

pub use autotexture::{AutoTexturer, BandTextures};
pub use erosion::{ErosionKind, ErosionStats, erode};
pub use smooth::{SmoothingAlgorithm, smooth, ttdize};
pub use terragen::TerrainGenerator;

use crate::raster::Raster;

/// Rectangle of cells an operation is limited to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    pub fn full<T>(raster: &Raster<T>) -> Self
    where
        T: Copy,
    {
        Self::new(0, 0, raster.width(), raster.height())
    }

    /// Intersect with a `width × height` raster; `None` when nothing is left
    pub fn clip(self, width: usize, height: usize) -> Option<Self> {
        let x_end = (self.x + self.width).min(width);
        let y_end = (self.y + self.height).min(height);
        if self.x >= x_end || self.y >= y_end {
            return None;
        }
        Some(Self::new(self.x, self.y, x_end - self.x, y_end - self.y))
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Resolve an optional region against a raster
pub(crate) fn resolve_region<T: Copy>(raster: &Raster<T>, region: Option<Region>) -> Option<Region> {
    region
        .unwrap_or_else(|| Region::full(raster))
        .clip(raster.width(), raster.height())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_clip() {
        let region = Region::new(10, 10, 20, 20);
        assert_eq!(region.clip(25, 100), Some(Region::new(10, 10, 15, 20)));
        assert_eq!(region.clip(5, 5), None);
        assert!(region.contains(10, 29));
        assert!(!region.contains(30, 10));
    }

    #[test]
    fn test_resolve_region_defaults_to_full() {
        let raster = Raster::new(4, 3, 0.0f32);
        assert_eq!(resolve_region(&raster, None), Some(Region::new(0, 0, 4, 3)));
        assert_eq!(resolve_region(&raster, Some(Region::new(5, 0, 1, 1))), None);
    }
}
