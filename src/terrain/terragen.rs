//! Noise based terrain randomization.

use super::{Region, resolve_region};
use crate::config::{TerraGenAlgorithm, TerraGenSetup};
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::Raster;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin, RidgedMulti};
use tracing::info;

/// Generates heightmaps from a [`TerraGenSetup`]
pub struct TerrainGenerator {
    setup: TerraGenSetup,
}

impl TerrainGenerator {
    pub fn new(setup: TerraGenSetup) -> Self {
        Self { setup }
    }

    pub fn setup(&self) -> &TerraGenSetup {
        &self.setup
    }

    fn noise_field(&self, width: usize, height: usize) -> Vec<f64> {
        let setup = &self.setup;
        let mut values = Vec::with_capacity(width * height);

        match setup.algorithm {
            TerraGenAlgorithm::Perlin => {
                let fbm = Fbm::<Perlin>::new(setup.seed)
                    .set_octaves(setup.octaves)
                    .set_frequency(setup.frequency)
                    .set_persistence(setup.persistence)
                    .set_lacunarity(setup.lacunarity);
                for y in 0..height {
                    for x in 0..width {
                        values.push(fbm.get([x as f64, y as f64]));
                    }
                }
            }
            TerraGenAlgorithm::Ridged => {
                let ridged = RidgedMulti::<Perlin>::new(setup.seed)
                    .set_octaves(setup.octaves)
                    .set_frequency(setup.frequency)
                    .set_persistence(setup.persistence)
                    .set_lacunarity(setup.lacunarity);
                for y in 0..height {
                    for x in 0..width {
                        values.push(ridged.get([x as f64, y as f64]));
                    }
                }
            }
        }
        values
    }

    /// Replace the heightmap, or a region of it, with fresh noise normalized
    /// into the setup's output range
    pub fn generate(&self, heightmap: &mut Raster<f32>, region: Option<Region>) -> MapEditResult<()> {
        let Some(region) = resolve_region(heightmap, region) else {
            return Err(MapEditError::DimensionMismatch {
                reason: "Terragen region lies outside the heightmap".to_string(),
            });
        };

        // Sample the whole map so a region matches what a full run would give
        let values = self.noise_field(heightmap.width(), heightmap.height());
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let span = max - min;
        let out_min = self.setup.min_height;
        let out_span = self.setup.max_height - self.setup.min_height;

        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let normalized = if span > f64::EPSILON {
                    ((values[heightmap.index(x, y)] - min) / span) as f32
                } else {
                    0.5
                };
                heightmap.set(x, y, (out_min + normalized * out_span).clamp(0.0, 1.0));
            }
        }
        info!(
            "Generated {:?} terrain with seed {} over {}x{} cells",
            self.setup.algorithm, self.setup.seed, region.width, region.height
        );
        Ok(())
    }
}

/// Named presets for the command line
pub fn terrain_preset(name: &str, seed: Option<u32>) -> Option<TerraGenSetup> {
    let seed = seed.unwrap_or_else(rand::random);
    let base = TerraGenSetup {
        seed,
        ..TerraGenSetup::default()
    };

    match name {
        "hills" => Some(TerraGenSetup {
            frequency: 0.01,
            octaves: 4,
            min_height: 0.2,
            max_height: 0.6,
            ..base
        }),
        "mountains" => Some(TerraGenSetup {
            algorithm: TerraGenAlgorithm::Ridged,
            frequency: 0.005,
            octaves: 5,
            ..base
        }),
        "plains" => Some(TerraGenSetup {
            frequency: 0.004,
            octaves: 3,
            min_height: 0.3,
            max_height: 0.4,
            ..base
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_heights_fill_output_range() {
        let generator = TerrainGenerator::new(TerraGenSetup {
            frequency: 0.1,
            min_height: 0.2,
            max_height: 0.8,
            ..TerraGenSetup::default()
        });
        let mut heightmap = Raster::new(65, 65, 0.0);
        generator.generate(&mut heightmap, None).unwrap();

        let min = heightmap.data().iter().copied().fold(f32::INFINITY, f32::min);
        let max = heightmap.data().iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!((min - 0.2).abs() < 1e-5);
        assert!((max - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_same_seed_same_terrain() {
        let setup = terrain_preset("mountains", Some(7)).unwrap();
        let mut a = Raster::new(33, 33, 0.0);
        let mut b = Raster::new(33, 33, 0.0);
        TerrainGenerator::new(setup.clone()).generate(&mut a, None).unwrap();
        TerrainGenerator::new(setup).generate(&mut b, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_region_only_changes_region() {
        let generator = TerrainGenerator::new(TerraGenSetup {
            frequency: 0.1,
            ..TerraGenSetup::default()
        });
        let mut heightmap = Raster::new(33, 33, 0.0);
        let region = Region::new(4, 4, 8, 8);
        generator.generate(&mut heightmap, Some(region)).unwrap();
        for (x, y, value) in heightmap.iter() {
            if !region.contains(x, y) {
                assert_eq!(value, 0.0);
            }
        }
    }

    #[test]
    fn test_unknown_preset() {
        assert!(terrain_preset("volcano", None).is_none());
    }
}
