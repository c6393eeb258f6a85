use crate::raster::coordinates::SQUARE_SIZE;
use crate::raster::{Raster, Rgb};

/// Slope buckets used by the slope overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlopeClass {
    Flat,
    Slight,
    Moderate,
    Steep,
}

impl SlopeClass {
    pub const ALL: [SlopeClass; 4] = [
        SlopeClass::Flat,
        SlopeClass::Slight,
        SlopeClass::Moderate,
        SlopeClass::Steep,
    ];

    /// Upper bound of the bucket as a fraction of 255
    pub fn upper_bound(self) -> f32 {
        match self {
            SlopeClass::Flat => 0.08,
            SlopeClass::Slight => 0.22,
            SlopeClass::Moderate => 0.56,
            SlopeClass::Steep => 1.0,
        }
    }

    pub fn color(self) -> Rgb {
        match self {
            SlopeClass::Flat => [0, 160, 0],
            SlopeClass::Slight => [200, 200, 0],
            SlopeClass::Moderate => [230, 120, 0],
            SlopeClass::Steep => [200, 0, 0],
        }
    }

    /// Classify a slope byte
    pub fn classify(slope: u8) -> SlopeClass {
        let fraction = slope as f32 / 255.0;
        Self::ALL
            .into_iter()
            .find(|class| fraction <= class.upper_bound())
            .unwrap_or(SlopeClass::Steep)
    }
}

/// Compute the per-square slope map from a heightmap.
///
/// Slope is `1 - normal.y` of each square, scaled to a byte. `height_range`
/// is the world elevation span covered by normalized heights 0..1.
pub fn compute_slope_map(heightmap: &Raster<f32>, height_range: f32) -> Raster<u8> {
    let width = heightmap.width().saturating_sub(1).max(1);
    let height = heightmap.height().saturating_sub(1).max(1);
    let mut slope = Raster::new(width, height, 0u8);

    for z in 0..height {
        for x in 0..width {
            let h00 = heightmap.at_clamped(x as i64, z as i64);
            let h10 = heightmap.at_clamped(x as i64 + 1, z as i64);
            let h01 = heightmap.at_clamped(x as i64, z as i64 + 1);
            let h11 = heightmap.at_clamped(x as i64 + 1, z as i64 + 1);

            let dx = ((h10 - h00) + (h11 - h01)) * 0.5 * height_range / SQUARE_SIZE;
            let dz = ((h01 - h00) + (h11 - h10)) * 0.5 * height_range / SQUARE_SIZE;
            let normal_y = 1.0 / (dx * dx + dz * dz + 1.0).sqrt();

            let value = ((1.0 - normal_y) * 255.0).round().clamp(0.0, 255.0) as u8;
            slope.set(x, z, value);
        }
    }

    slope
}

/// Render a slope map with the bucket colours
pub fn slope_overlay(slope: &Raster<u8>) -> Raster<Rgb> {
    slope.map(|value| SlopeClass::classify(value).color())
}
