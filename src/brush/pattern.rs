//! Built-in brush weight patterns.

use crate::errors::MapEditError;
use crate::raster::Raster;
use std::f32::consts::PI;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternShape {
    /// Weight 1 everywhere
    Uniform,
    /// Weight 1 inside the inscribed circle
    Circle,
    /// Cosine falloff from 1 at the centre to 0 at the rim
    Falloff,
}

impl FromStr for PatternShape {
    type Err = MapEditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uniform" | "square" => Ok(Self::Uniform),
            "circle" => Ok(Self::Circle),
            "falloff" | "soft" => Ok(Self::Falloff),
            _ => Err(MapEditError::InvalidSettings {
                reason: format!("Unknown brush pattern '{s}'. Available: uniform, circle, falloff"),
            }),
        }
    }
}

/// Distance of cell `(x, y)` from the centre, relative to the radius
fn relative_distance(x: usize, y: usize, size: usize) -> f32 {
    let radius = size as f32 / 2.0;
    let dx = x as f32 + 0.5 - radius;
    let dy = y as f32 + 0.5 - radius;
    (dx * dx + dy * dy).sqrt() / radius
}

/// Render a `size`×`size` pattern
pub fn pattern(shape: PatternShape, size: usize) -> Raster<f32> {
    let size = size.max(1);
    let mut raster = Raster::new(size, size, 0.0);
    for y in 0..size {
        for x in 0..size {
            let d = relative_distance(x, y, size);
            let weight = match shape {
                PatternShape::Uniform => 1.0,
                PatternShape::Circle => {
                    if d <= 1.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
                PatternShape::Falloff => {
                    if d < 1.0 {
                        0.5 * (1.0 + (d * PI).cos())
                    } else {
                        0.0
                    }
                }
            };
            raster.set(x, y, weight);
        }
    }
    raster
}
