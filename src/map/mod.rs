//! The `SpringMap` aggregate: every raster layer of a map at its fixed size
//! factor, the feature store, height bounds and the map id.

mod io;

pub use io::HeightmapFormat;

use crate::codec::HeightBounds;
use crate::errors::{MapEditError, MapEditResult};
use crate::features::FeatureStore;
use crate::raster::coordinates::elevation;
use crate::raster::{Raster, Rgb, compute_slope_map};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Heightmap squares per engine size unit
pub const HEIGHTMAP_FACTOR: usize = 64;
/// Texels per engine size unit
pub const TEXTURE_FACTOR: usize = 512;
pub const METAL_FACTOR: usize = 32;
pub const TYPE_FACTOR: usize = 32;
pub const VEGETATION_FACTOR: usize = 16;
/// Texels per heightmap square
pub const TEXELS_PER_SQUARE: usize = TEXTURE_FACTOR / HEIGHTMAP_FACTOR;

/// Map size in engine units; a 1×1 map is 64×64 heightmap squares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct MapDimensions {
    #[validate(range(min = 1, max = 64))]
    pub width: usize,
    #[validate(range(min = 1, max = 64))]
    pub height: usize,
}

impl MapDimensions {
    pub fn new(width: usize, height: usize) -> MapEditResult<Self> {
        let dimensions = Self { width, height };
        dimensions.validate().map_err(|_| MapEditError::InvalidMapData {
            reason: format!("Map size {width}x{height} outside 1..=64"),
        })?;
        Ok(dimensions)
    }

    /// Heightmap vertices: one more than the squares in each direction
    pub fn heightmap(&self) -> (usize, usize) {
        (self.width * HEIGHTMAP_FACTOR + 1, self.height * HEIGHTMAP_FACTOR + 1)
    }

    /// Heightmap squares
    pub fn squares(&self) -> (usize, usize) {
        (self.width * HEIGHTMAP_FACTOR, self.height * HEIGHTMAP_FACTOR)
    }

    pub fn texture(&self) -> (usize, usize) {
        (self.width * TEXTURE_FACTOR, self.height * TEXTURE_FACTOR)
    }

    pub fn metalmap(&self) -> (usize, usize) {
        (self.width * METAL_FACTOR, self.height * METAL_FACTOR)
    }

    pub fn typemap(&self) -> (usize, usize) {
        (self.width * TYPE_FACTOR, self.height * TYPE_FACTOR)
    }

    pub fn vegetation(&self) -> (usize, usize) {
        (self.width * VEGETATION_FACTOR, self.height * VEGETATION_FACTOR)
    }

    pub fn layer(&self, layer: MapLayer) -> (usize, usize) {
        match layer {
            MapLayer::Height => self.heightmap(),
            MapLayer::Texture => self.texture(),
            MapLayer::Metal => self.metalmap(),
            MapLayer::Type => self.typemap(),
            MapLayer::Vegetation => self.vegetation(),
            MapLayer::Features => self.squares(),
        }
    }
}

/// Editable layers of a map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapLayer {
    Height,
    Texture,
    Metal,
    Type,
    Vegetation,
    Features,
}

impl MapLayer {
    /// Layer cells per heightmap square
    pub fn ratio(self) -> f32 {
        match self {
            MapLayer::Height | MapLayer::Features => 1.0,
            MapLayer::Texture => TEXELS_PER_SQUARE as f32,
            MapLayer::Metal | MapLayer::Type => 0.5,
            MapLayer::Vegetation => 0.25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpringMap {
    dimensions: MapDimensions,
    heightmap: Raster<f32>,
    texture: Raster<Rgb>,
    metalmap: Raster<u8>,
    typemap: Raster<u8>,
    vegetation: Raster<u8>,
    features: FeatureStore,
    bounds: HeightBounds,
    map_id: i32,
}

impl SpringMap {
    /// A flat, empty map of `width`×`height` engine units
    pub fn new(width: usize, height: usize) -> MapEditResult<Self> {
        let dimensions = MapDimensions::new(width, height)?;
        let mut map = Self {
            dimensions,
            heightmap: Raster::new(0, 0, 0.0),
            texture: Raster::new(0, 0, [0; 3]),
            metalmap: Raster::new(0, 0, 0),
            typemap: Raster::new(0, 0, 0),
            vegetation: Raster::new(0, 0, 0),
            features: FeatureStore::new(0, 0),
            bounds: HeightBounds::default(),
            map_id: rand::random(),
        };
        map.allocate();
        Ok(map)
    }

    fn allocate(&mut self) {
        let d = self.dimensions;
        let (w, h) = d.heightmap();
        self.heightmap = Raster::new(w, h, 0.0);
        let (w, h) = d.texture();
        self.texture = Raster::new(w, h, [0; 3]);
        let (w, h) = d.metalmap();
        self.metalmap = Raster::new(w, h, 0);
        let (w, h) = d.typemap();
        self.typemap = Raster::new(w, h, 0);
        let (w, h) = d.vegetation();
        self.vegetation = Raster::new(w, h, 0);
        let (w, h) = d.squares();
        self.features = FeatureStore::new(w, h);
    }

    /// Reallocate every layer at a new size; all content is discarded
    pub fn recreate(&mut self, width: usize, height: usize) -> MapEditResult<()> {
        self.dimensions = MapDimensions::new(width, height)?;
        self.allocate();
        info!("Recreated map at {width}x{height}");
        Ok(())
    }

    pub fn dimensions(&self) -> MapDimensions {
        self.dimensions
    }

    pub fn heightmap(&self) -> &Raster<f32> {
        &self.heightmap
    }

    pub fn heightmap_mut(&mut self) -> &mut Raster<f32> {
        &mut self.heightmap
    }

    pub fn texture(&self) -> &Raster<Rgb> {
        &self.texture
    }

    pub fn texture_mut(&mut self) -> &mut Raster<Rgb> {
        &mut self.texture
    }

    pub fn metalmap(&self) -> &Raster<u8> {
        &self.metalmap
    }

    pub fn metalmap_mut(&mut self) -> &mut Raster<u8> {
        &mut self.metalmap
    }

    pub fn typemap(&self) -> &Raster<u8> {
        &self.typemap
    }

    pub fn typemap_mut(&mut self) -> &mut Raster<u8> {
        &mut self.typemap
    }

    /// Vegetation flags, 0 or 1 per cell
    pub fn vegetation(&self) -> &Raster<u8> {
        &self.vegetation
    }

    pub fn vegetation_mut(&mut self) -> &mut Raster<u8> {
        &mut self.vegetation
    }

    pub fn features(&self) -> &FeatureStore {
        &self.features
    }

    pub fn features_mut(&mut self) -> &mut FeatureStore {
        &mut self.features
    }

    /// Heightmap and feature store together, for edits that place features
    /// on the terrain
    pub fn heightmap_and_features_mut(&mut self) -> (&Raster<f32>, &mut FeatureStore) {
        (&self.heightmap, &mut self.features)
    }

    pub fn bounds(&self) -> HeightBounds {
        self.bounds
    }

    /// World elevation of normalized heights 0 and 1. Negative minimums
    /// put part of the map under water.
    pub fn set_height_bounds(&mut self, min_height: f32, max_height: f32) -> MapEditResult<()> {
        if !min_height.is_finite() || !max_height.is_finite() || min_height >= max_height {
            return Err(MapEditError::invalid(format!(
                "Height bounds {min_height}..{max_height} are not an increasing range"
            )));
        }
        self.bounds = HeightBounds {
            min_height,
            max_height,
            has_water: min_height < 0.0,
        };
        Ok(())
    }

    pub fn map_id(&self) -> i32 {
        self.map_id
    }

    pub fn set_map_id(&mut self, map_id: i32) {
        self.map_id = map_id;
    }

    /// World elevation at a normalized heightmap value
    pub fn elevation(&self, normalized: f32) -> f32 {
        elevation(normalized, self.bounds.min_height, self.bounds.max_height)
    }

    /// World elevation under a point in heightmap squares
    pub fn elevation_at(&self, x: f32, z: f32) -> f32 {
        self.elevation(self.heightmap.sample_bilinear(x, z))
    }

    /// Slope classes per heightmap square, recomputed from the heightmap
    pub fn slope_map(&self) -> Raster<u8> {
        compute_slope_map(&self.heightmap, self.bounds.range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_map_layer_sizes() {
        let map = SpringMap::new(4, 4).unwrap();
        assert_eq!(map.heightmap().dimensions(), (257, 257));
        assert_eq!(map.texture().dimensions(), (2048, 2048));
        assert_eq!(map.metalmap().dimensions(), (128, 128));
        assert_eq!(map.typemap().dimensions(), (128, 128));
        assert_eq!(map.vegetation().dimensions(), (64, 64));
        assert_eq!(map.features().block_grid(), (8, 8));
        assert_eq!(map.slope_map().dimensions(), (256, 256));
    }

    #[test]
    fn test_recreate_resizes_and_clears() {
        let mut map = SpringMap::new(2, 2).unwrap();
        map.heightmap_mut().fill(0.5);
        map.features_mut().insert(3.0, 0.0, 3.0, 0.0, 0);

        map.recreate(2, 4).unwrap();
        assert_eq!(map.heightmap().dimensions(), (129, 257));
        assert_eq!(map.texture().dimensions(), (1024, 2048));
        assert!(map.heightmap().data().iter().all(|&h| h == 0.0));
        assert!(map.features().is_empty());
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        assert!(matches!(SpringMap::new(0, 4), Err(MapEditError::InvalidMapData { .. })));
        let mut map = SpringMap::new(1, 1).unwrap();
        assert!(map.recreate(65, 1).is_err());
        // A failed recreate keeps the old map
        assert_eq!(map.dimensions(), MapDimensions { width: 1, height: 1 });
    }

    #[test]
    fn test_height_bounds() {
        let mut map = SpringMap::new(1, 1).unwrap();
        map.set_height_bounds(10.0, 210.0).unwrap();
        assert!(!map.bounds().has_water);
        assert_eq!(map.elevation(0.5), 110.0);

        map.set_height_bounds(-20.0, 180.0).unwrap();
        assert!(map.bounds().has_water);
        assert!(map.set_height_bounds(5.0, 5.0).is_err());
    }

    #[test]
    fn test_layer_ratios_match_dimensions() {
        let dimensions = MapDimensions::new(2, 3).unwrap();
        let (squares_x, squares_y) = dimensions.squares();
        for layer in [MapLayer::Texture, MapLayer::Metal, MapLayer::Type, MapLayer::Vegetation] {
            let (w, h) = dimensions.layer(layer);
            assert_eq!(w as f32, squares_x as f32 * layer.ratio());
            assert_eq!(h as f32, squares_y as f32 * layer.ratio());
        }
    }
}
