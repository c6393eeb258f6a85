//! Whole-map smoothing filters and height quantization.

use super::{Region, resolve_region};
use crate::config::range_types::SmoothingStrength;
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::Raster;
use std::str::FromStr;
use tracing::debug;

const BOX_KERNEL: [[f32; 3]; 3] = [[1.0 / 9.0; 3]; 3];
const GAUSSIAN_KERNEL: [[f32; 3]; 3] = [
    [0.0625, 0.125, 0.0625],
    [0.125, 0.25, 0.125],
    [0.0625, 0.125, 0.0625],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingAlgorithm {
    Box,
    Gaussian,
}

impl SmoothingAlgorithm {
    fn kernel(self) -> &'static [[f32; 3]; 3] {
        match self {
            Self::Box => &BOX_KERNEL,
            Self::Gaussian => &GAUSSIAN_KERNEL,
        }
    }
}

impl FromStr for SmoothingAlgorithm {
    type Err = MapEditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "box" => Ok(Self::Box),
            "gaussian" => Ok(Self::Gaussian),
            _ => Err(MapEditError::InvalidSettings {
                reason: format!("Unknown smoothing algorithm '{s}'. Available: box, gaussian"),
            }),
        }
    }
}

/// Run `passes` 3×3 filter passes, blending each result in by `strength`.
/// Edge cells use the clamped neighbourhood.
pub fn smooth(
    heightmap: &mut Raster<f32>,
    algorithm: SmoothingAlgorithm,
    passes: u32,
    strength: SmoothingStrength,
    region: Option<Region>,
) -> MapEditResult<()> {
    let Some(region) = resolve_region(heightmap, region) else {
        return Err(MapEditError::DimensionMismatch {
            reason: "Smoothing region lies outside the heightmap".to_string(),
        });
    };
    let strength = strength.get();
    let kernel = algorithm.kernel();

    for pass in 0..passes {
        let source = heightmap.clone();
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let mut filtered = 0.0;
                for (dy, kernel_row) in kernel.iter().enumerate() {
                    for (dx, &weight) in kernel_row.iter().enumerate() {
                        let sample = source.at_clamped(x as i64 + dx as i64 - 1, y as i64 + dy as i64 - 1);
                        filtered += sample * weight;
                    }
                }
                let current = source.at(x, y);
                heightmap.set(x, y, current * (1.0 - strength) + filtered * strength);
            }
        }
        debug!("Smoothing pass {} of {} done", pass + 1, passes);
    }
    Ok(())
}

/// Quantize heights into `levels` evenly spaced plateaus
pub fn ttdize(heightmap: &mut Raster<f32>, levels: u32) -> MapEditResult<()> {
    if levels < 2 {
        return Err(MapEditError::invalid(format!(
            "Quantization needs at least 2 levels, got {levels}"
        )));
    }
    let steps = (levels - 1) as f32;
    for value in heightmap.data_mut() {
        *value = ((value.clamp(0.0, 1.0) * steps).round() / steps).clamp(0.0, 1.0);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spike() -> Raster<f32> {
        let mut heightmap = Raster::new(5, 5, 0.0);
        heightmap.set(2, 2, 0.9);
        heightmap
    }

    #[test]
    fn test_box_smoothing_spreads_spike() {
        let mut heightmap = spike();
        smooth(&mut heightmap, SmoothingAlgorithm::Box, 1, SmoothingStrength::new(1.0), None).unwrap();
        assert!((heightmap.at(2, 2) - 0.1).abs() < 1e-6);
        assert!((heightmap.at(1, 1) - 0.1).abs() < 1e-6);
        assert_eq!(heightmap.at(0, 0), 0.0);
    }

    #[test]
    fn test_gaussian_strength_blend() {
        let mut heightmap = spike();
        smooth(&mut heightmap, SmoothingAlgorithm::Gaussian, 1, SmoothingStrength::new(0.5), None).unwrap();
        // 0.5 * 0.9 + 0.5 * 0.9 * 0.25
        assert!((heightmap.at(2, 2) - 0.5625).abs() < 1e-6);
    }

    #[test]
    fn test_zero_strength_is_identity() {
        let mut heightmap = spike();
        smooth(&mut heightmap, SmoothingAlgorithm::Box, 3, SmoothingStrength::new(0.0), None).unwrap();
        assert_eq!(heightmap, spike());
    }

    #[test]
    fn test_ttdize_levels() {
        let mut heightmap = Raster::from_vec(4, 1, vec![0.0, 0.2, 0.6, 1.0]).unwrap();
        ttdize(&mut heightmap, 3).unwrap();
        assert_eq!(heightmap.data(), &[0.0, 0.0, 0.5, 1.0]);
        assert!(ttdize(&mut heightmap, 1).is_err());
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("Gaussian".parse::<SmoothingAlgorithm>().unwrap(), SmoothingAlgorithm::Gaussian);
        assert!("median".parse::<SmoothingAlgorithm>().is_err());
    }
}
