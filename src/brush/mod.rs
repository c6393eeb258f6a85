//! Brushes: a weight pattern, an operation and a strength, applied to one
//! map layer around a position.
//!
//! Brush sizes and positions are in heightmap squares. Each layer scales the
//! footprint by its resolution ratio, so a 16-square brush covers 128
//! texels but only 8 metal map cells.

pub mod data_manager;
pub mod pattern;

pub use data_manager::{BrushDataManager, BrushSlot};
pub use pattern::{PatternShape, pattern};

use crate::config::range_types::{BrushSize, BrushStrength, RaiseStrength};
use crate::errors::{MapEditError, MapEditResult};
use crate::features::FEATURE_ROTATE_STEP;
use crate::map::{MapLayer, SpringMap};
use crate::raster::coordinates::to_layer_cell;
use crate::raster::{Lerp, Raster, Rgb};
use rand::Rng;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightMode {
    /// Add the pattern, strength in world elevation units
    Raise,
    /// Add the pattern, strength in normalized units
    Stamp,
    /// Overwrite with the pattern
    Set,
    /// Pull toward the neighbourhood average
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureMode {
    Blend,
    Add,
    Multiply,
    Stamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetalMode {
    Add,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMode {
    Add { type_id: usize },
    Rotate,
    RotateSameRandom,
}

/// What a brush does to its layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushOperation {
    Height(HeightMode),
    Texture(TextureMode),
    Metal(MetalMode),
    Type { value: u8 },
    Vegetation,
    Feature(FeatureMode),
}

impl BrushOperation {
    pub fn layer(self) -> MapLayer {
        match self {
            BrushOperation::Height(_) => MapLayer::Height,
            BrushOperation::Texture(_) => MapLayer::Texture,
            BrushOperation::Metal(_) => MapLayer::Metal,
            BrushOperation::Type { .. } => MapLayer::Type,
            BrushOperation::Vegetation => MapLayer::Vegetation,
            BrushOperation::Feature(_) => MapLayer::Features,
        }
    }

    /// Clamp a raw strength into the range of this operation
    pub fn clamp_strength(self, strength: f32) -> f32 {
        match self {
            BrushOperation::Height(HeightMode::Raise) => RaiseStrength::new(strength).get(),
            _ => BrushStrength::new(strength).get(),
        }
    }
}

/// New height for the additive and overwrite height modes.
///
/// `weight` is the pattern value, `scale` the world span normalizing raise
/// strengths.
pub fn combine_height(mode: HeightMode, current: f32, weight: f32, strength: f32, scale: f32, invert: bool) -> f32 {
    let sign = if invert { -1.0 } else { 1.0 };
    let value = match mode {
        HeightMode::Raise => current + sign * weight * strength / scale.max(1.0),
        HeightMode::Stamp => current + sign * weight * strength,
        HeightMode::Set if weight > 0.0 => weight * strength,
        HeightMode::Set | HeightMode::Smooth => current,
    };
    value.clamp(0.0, 1.0)
}

/// Move `current` toward `average` by the pattern weighted strength
pub fn combine_smooth(current: f32, average: f32, weight: f32, strength: f32) -> f32 {
    let t = (weight * strength).clamp(0.0, 1.0);
    (current + (average - current) * t).clamp(0.0, 1.0)
}

/// New texel colour; `color` is the brush texture at this texel
pub fn combine_texture(mode: TextureMode, current: Rgb, color: Rgb, weight: f32, strength: f32, invert: bool) -> Rgb {
    let w = (weight * strength).clamp(0.0, 1.0);
    match mode {
        TextureMode::Blend => {
            let target = if invert {
                [255 - color[0], 255 - color[1], 255 - color[2]]
            } else {
                color
            };
            Rgb::lerp(current, target, w)
        }
        TextureMode::Add => {
            let sign = if invert { -1.0 } else { 1.0 };
            let mut out = current;
            for (channel, &t) in out.iter_mut().zip(&color) {
                *channel = (*channel as f32 + sign * t as f32 * w).round().clamp(0.0, 255.0) as u8;
            }
            out
        }
        TextureMode::Multiply => {
            let mut out = current;
            for (channel, &t) in out.iter_mut().zip(&color) {
                let factor = 1.0 + (t as f32 / 255.0 - 1.0) * w;
                let value = if invert {
                    if factor > 0.0 { *channel as f32 / factor } else { 255.0 }
                } else {
                    *channel as f32 * factor
                };
                *channel = value.round().clamp(0.0, 255.0) as u8;
            }
            out
        }
        TextureMode::Stamp => {
            if weight > 0.5 {
                color
            } else {
                current
            }
        }
    }
}

/// New metal map value
pub fn combine_metal(mode: MetalMode, current: u8, weight: f32, strength: f32, invert: bool) -> u8 {
    let amount = weight * strength * 255.0;
    let value = match mode {
        MetalMode::Add if invert => current as f32 - amount,
        MetalMode::Add => current as f32 + amount,
        MetalMode::Set if weight > 0.0 => amount,
        MetalMode::Set => current as f32,
    };
    value.round().clamp(0.0, 255.0) as u8
}

pub fn combine_type(current: u8, value: u8, weight: f32, invert: bool) -> u8 {
    match (weight > 0.5, invert) {
        (true, false) => value,
        (true, true) => 0,
        (false, _) => current,
    }
}

pub fn combine_vegetation(current: u8, weight: f32, invert: bool) -> u8 {
    match (weight >= 0.5, invert) {
        (true, false) => 1,
        (true, true) => 0,
        (false, _) => current,
    }
}

/// Layer cell covered by footprint cell `(i, j)`, `None` when it falls off
/// a non-repeating layer
fn layer_cell(origin: (i64, i64), (i, j): (usize, usize), (width, height): (usize, usize), repeat: bool) -> Option<(usize, usize)> {
    let x = origin.0 + i as i64;
    let y = origin.1 + j as i64;
    if repeat {
        return Some((x.rem_euclid(width as i64) as usize, y.rem_euclid(height as i64) as usize));
    }
    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
        return None;
    }
    Some((x as usize, y as usize))
}

/// Brush patterns and textures shared by all brushes
#[derive(Debug, Clone, Default)]
pub struct BrushAssets {
    pub patterns: BrushDataManager<f32>,
    pub textures: BrushDataManager<Rgb>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Brush {
    pub operation: BrushOperation,
    pub size: BrushSize,
    /// Raw strength, clamped per operation when applied
    pub strength: f32,
    pub pattern: BrushSlot,
    /// Texture for texture operations, tiled across the layer
    pub texture: Option<BrushSlot>,
    /// Snap placement to multiples of this many squares
    pub align: Option<u32>,
    /// Wrap around layer edges instead of clipping
    pub repeat: bool,
}

impl Brush {
    pub fn new(operation: BrushOperation, pattern: BrushSlot) -> Self {
        Self {
            operation,
            size: BrushSize::default(),
            strength: BrushStrength::default().get(),
            pattern,
            texture: None,
            align: None,
            repeat: false,
        }
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = BrushSize::new(size);
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_texture(mut self, texture: BrushSlot) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_align(mut self, align: u32) -> Self {
        self.align = (align > 0).then_some(align);
        self
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn strength(&self) -> f32 {
        self.operation.clamp_strength(self.strength)
    }

    /// Footprint edge in cells of `layer`
    pub fn footprint(&self, layer: MapLayer) -> usize {
        ((self.size.get() * layer.ratio()).round() as usize).max(1)
    }

    /// Placement after alignment snapping
    pub fn aligned(&self, px: i64, py: i64) -> (i64, i64) {
        match self.align {
            Some(step) => {
                let step = step as i64;
                (px.div_euclid(step) * step, py.div_euclid(step) * step)
            }
            None => (px, py),
        }
    }

    /// Apply the brush centred on `(px, py)` heightmap squares. Returns the
    /// number of cells or features changed.
    pub fn apply<R: Rng>(
        &self,
        map: &mut SpringMap,
        assets: &mut BrushAssets,
        px: i64,
        py: i64,
        invert: bool,
        rng: &mut R,
    ) -> MapEditResult<usize> {
        let (px, py) = self.aligned(px, py);
        let layer = self.operation.layer();
        let size = self.footprint(layer);
        let (cx, cy) = to_layer_cell(px as f32, py as f32, layer.ratio());
        let centre = (cx.round() as i64, cy.round() as i64);
        let origin = (centre.0 - (size / 2) as i64, centre.1 - (size / 2) as i64);
        let strength = self.strength();
        let weights = assets.patterns.scaled(self.pattern, size, size)?.clone();

        let changed = match self.operation {
            BrushOperation::Height(HeightMode::Smooth) => {
                self.smooth(map.heightmap_mut(), &weights, origin, strength)
            }
            BrushOperation::Height(mode) => {
                let scale = map.bounds().max_height.abs();
                let heightmap = map.heightmap_mut();
                self.for_each_cell(heightmap, &weights, origin, |current, w| {
                    combine_height(mode, current, w, strength, scale, invert)
                })
            }
            BrushOperation::Texture(mode) => {
                let slot = self
                    .texture
                    .ok_or_else(|| MapEditError::invalid("Texture brush has no texture"))?;
                let texture = assets
                    .textures
                    .get(slot)
                    .ok_or_else(|| MapEditError::invalid(format!("Brush texture {slot} is not loaded")))?;
                self.paint_texture(map.texture_mut(), texture, &weights, origin, mode, strength, invert)
            }
            BrushOperation::Metal(mode) => self.for_each_cell(map.metalmap_mut(), &weights, origin, |current, w| {
                combine_metal(mode, current, w, strength, invert)
            }),
            BrushOperation::Type { value } => self.for_each_cell(map.typemap_mut(), &weights, origin, |current, w| {
                combine_type(current, value, w, invert)
            }),
            BrushOperation::Vegetation => self.for_each_cell(map.vegetation_mut(), &weights, origin, |current, w| {
                combine_vegetation(current, w, invert)
            }),
            BrushOperation::Feature(mode) => {
                self.apply_features(map, &weights, (px, py), mode, strength, invert, rng)
            }
        };
        debug!("{:?} brush at ({px}, {py}) changed {changed} cells", self.operation);
        Ok(changed)
    }

    fn for_each_cell<T: Copy + PartialEq>(
        &self,
        layer: &mut Raster<T>,
        weights: &Raster<f32>,
        origin: (i64, i64),
        combine: impl Fn(T, f32) -> T,
    ) -> usize {
        let dimensions = layer.dimensions();
        let mut changed = 0;
        for (i, j, weight) in weights.iter() {
            let Some((x, y)) = layer_cell(origin, (i, j), dimensions, self.repeat) else {
                continue;
            };
            let current = layer.at(x, y);
            let value = combine(current, weight);
            if value != current {
                layer.set(x, y, value);
                changed += 1;
            }
        }
        changed
    }

    fn smooth(&self, heightmap: &mut Raster<f32>, weights: &Raster<f32>, origin: (i64, i64), strength: f32) -> usize {
        let dimensions = heightmap.dimensions();
        let size = weights.width();
        // Unmodified copy of the footprint plus a one cell margin
        let mut source = Raster::new(size + 2, size + 2, 0.0f32);
        for j in 0..size + 2 {
            for i in 0..size + 2 {
                let x = origin.0 + i as i64 - 1;
                let y = origin.1 + j as i64 - 1;
                let value = if self.repeat {
                    heightmap.at(
                        x.rem_euclid(dimensions.0 as i64) as usize,
                        y.rem_euclid(dimensions.1 as i64) as usize,
                    )
                } else {
                    heightmap.at_clamped(x, y)
                };
                source.set(i, j, value);
            }
        }

        let mut changed = 0;
        for (i, j, weight) in weights.iter() {
            let Some((x, y)) = layer_cell(origin, (i, j), dimensions, self.repeat) else {
                continue;
            };
            let mut sum = 0.0;
            for dy in 0..3 {
                for dx in 0..3 {
                    sum += source.at(i + dx, j + dy);
                }
            }
            let current = source.at(i + 1, j + 1);
            let value = combine_smooth(current, sum / 9.0, weight, strength);
            if value != heightmap.at(x, y) {
                heightmap.set(x, y, value);
                changed += 1;
            }
        }
        changed
    }

    #[allow(clippy::too_many_arguments)]
    fn paint_texture(
        &self,
        layer: &mut Raster<Rgb>,
        texture: &Raster<Rgb>,
        weights: &Raster<f32>,
        origin: (i64, i64),
        mode: TextureMode,
        strength: f32,
        invert: bool,
    ) -> usize {
        let dimensions = layer.dimensions();
        let mut changed = 0;
        for (i, j, weight) in weights.iter() {
            let Some((x, y)) = layer_cell(origin, (i, j), dimensions, self.repeat) else {
                continue;
            };
            let color = texture.at(x % texture.width(), y % texture.height());
            let current = layer.at(x, y);
            let value = combine_texture(mode, current, color, weight, strength, invert);
            if value != current {
                layer.set(x, y, value);
                changed += 1;
            }
        }
        changed
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_features<R: Rng>(
        &self,
        map: &mut SpringMap,
        weights: &Raster<f32>,
        (px, py): (i64, i64),
        mode: FeatureMode,
        strength: f32,
        invert: bool,
        rng: &mut R,
    ) -> usize {
        let (x, z) = (px as f32, py as f32);
        let radius = self.size.get() / 2.0;

        match mode {
            FeatureMode::Add { type_id } if !invert => {
                let y = map.elevation_at(x, z);
                usize::from(map.features_mut().insert(x, y, z, 0.0, type_id).is_some())
            }
            FeatureMode::Add { .. } => usize::from(map.features_mut().remove_nearest(x, z, radius).is_some()),
            FeatureMode::Rotate => {
                let sign = if invert { -1.0 } else { 1.0 };
                let size = weights.width();
                let store = map.features_mut();
                let found = store.features_in_radius(x, z, radius);
                let mut changed = 0;
                for (id, _) in found {
                    let Some(feature) = store.get(id) else {
                        continue;
                    };
                    // Pattern weight under the feature
                    let fx = (feature.x - x + radius) / (2.0 * radius) * (size - 1) as f32;
                    let fz = (feature.z - z + radius) / (2.0 * radius) * (size - 1) as f32;
                    let weight = weights.sample_bilinear(fx, fz);
                    let degrees = sign * strength * FEATURE_ROTATE_STEP * weight;
                    if degrees != 0.0 && store.rotate(id, degrees) {
                        changed += 1;
                    }
                }
                changed
            }
            FeatureMode::RotateSameRandom => {
                let store = map.features_mut();
                let found = store.features_in_radius(x, z, radius);
                let mut changed = 0;
                for (id, _) in found {
                    if store.set_rotation(id, rng.gen_range(0.0..360.0)) {
                        changed += 1;
                    }
                }
                changed
            }
        }
    }
}
