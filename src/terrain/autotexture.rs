//! Texture generation from height and slope bands.
//!
//! Each texel picks the band containing its height and mixes the band's flat
//! and steep textures by a smoothstep over the band's slope range. Around the
//! boundary between two bands the two band colours are mixed linearly across
//! `2 * blend_width`, so the result is continuous in height.

use super::{Region, resolve_region};
use crate::codec::bitmap::load_bitmap;
use crate::config::{TextureGeneratorSetup, TextureSource};
use crate::errors::{MapEditError, MapEditResult};
use crate::map::TEXELS_PER_SQUARE;
use crate::raster::{Raster, Rgb, compute_slope_map};
use std::path::Path;
use tracing::{debug, info};

/// Flat and steep textures of one band, tiled across the layer
#[derive(Debug, Clone, PartialEq)]
pub struct BandTextures {
    pub flat: Raster<Rgb>,
    pub steep: Raster<Rgb>,
}

fn resolve_source(source: &TextureSource, base_dir: &Path) -> MapEditResult<Raster<Rgb>> {
    match source {
        TextureSource::Color(rgb) => Ok(Raster::new(1, 1, *rgb)),
        TextureSource::File(path) => {
            let path = base_dir.join(path);
            debug!("Loading band texture {}", path.display());
            let bitmap = load_bitmap(&path)?;
            if bitmap.pixels.is_empty() {
                return Err(MapEditError::format(format!("{} has no pixels", path.display())));
            }
            Ok(bitmap.pixels)
        }
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn mix(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t, a[2] + (b[2] - a[2]) * t]
}

fn to_float(rgb: Rgb) -> [f32; 3] {
    [rgb[0] as f32, rgb[1] as f32, rgb[2] as f32]
}

fn tiled(texture: &Raster<Rgb>, x: usize, y: usize) -> Rgb {
    texture.at(x % texture.width(), y % texture.height())
}

pub struct AutoTexturer {
    setup: TextureGeneratorSetup,
    textures: Vec<BandTextures>,
    /// Height where band `i` hands over to band `i + 1`
    boundaries: Vec<f32>,
}

impl AutoTexturer {
    /// Resolve band textures; relative file paths are taken from `base_dir`
    pub fn new(setup: TextureGeneratorSetup, base_dir: &Path) -> MapEditResult<Self> {
        setup.check_bands()?;
        let textures = setup
            .bands
            .iter()
            .map(|band| {
                Ok(BandTextures {
                    flat: resolve_source(&band.flat, base_dir)?,
                    steep: resolve_source(&band.steep, base_dir)?,
                })
            })
            .collect::<MapEditResult<Vec<_>>>()?;
        let boundaries = setup
            .bands
            .windows(2)
            .map(|pair| (pair[0].end + pair[1].start) / 2.0)
            .collect();
        Ok(Self {
            setup,
            textures,
            boundaries,
        })
    }

    fn band_color(&self, band: usize, slope: f32, x: usize, y: usize) -> [f32; 3] {
        let setup = &self.setup.bands[band];
        let textures = &self.textures[band];
        let steep = smoothstep(setup.slope_start, setup.slope_end, slope);
        mix(
            to_float(tiled(&textures.flat, x, y)),
            to_float(tiled(&textures.steep, x, y)),
            steep,
        )
    }

    /// Colour of texel `(x, y)` for a normalized height and slope
    pub fn color_at(&self, height: f32, slope: f32, x: usize, y: usize) -> Rgb {
        let band = self.boundaries.iter().filter(|&&b| height >= b).count();
        let width = self.setup.blend_width;

        let mut color = self.band_color(band, slope, x, y);
        if width > 0.0 {
            // Boundary below this band
            if band > 0 {
                let boundary = self.boundaries[band - 1];
                if height < boundary + width {
                    let t = (height - (boundary - width)) / (2.0 * width);
                    color = mix(self.band_color(band - 1, slope, x, y), color, t);
                }
            }
            // Boundary above this band
            if band < self.boundaries.len() {
                let boundary = self.boundaries[band];
                if height > boundary - width {
                    let t = (height - (boundary - width)) / (2.0 * width);
                    color = mix(color, self.band_color(band + 1, slope, x, y), t);
                }
            }
        }
        [
            color[0].round().clamp(0.0, 255.0) as u8,
            color[1].round().clamp(0.0, 255.0) as u8,
            color[2].round().clamp(0.0, 255.0) as u8,
        ]
    }

    /// Paint the texture layer, or a texel region of it, from the heightmap.
    ///
    /// `height_range` is the world elevation span, used for the slope.
    pub fn generate(
        &self,
        heightmap: &Raster<f32>,
        height_range: f32,
        texture: &mut Raster<Rgb>,
        region: Option<Region>,
    ) -> MapEditResult<()> {
        let squares = (heightmap.width().saturating_sub(1), heightmap.height().saturating_sub(1));
        let expected = (squares.0 * TEXELS_PER_SQUARE, squares.1 * TEXELS_PER_SQUARE);
        if texture.dimensions() != expected {
            return Err(MapEditError::DimensionMismatch {
                reason: format!(
                    "Texture is {:?}, heightmap {:?} needs {:?}",
                    texture.dimensions(),
                    heightmap.dimensions(),
                    expected
                ),
            });
        }
        let Some(region) = resolve_region(texture, region) else {
            return Ok(());
        };

        let slope = compute_slope_map(heightmap, height_range).map(|s| s as f32 / 255.0);
        let scale = 1.0 / TEXELS_PER_SQUARE as f32;
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let hx = (x as f32 + 0.5) * scale;
                let hy = (y as f32 + 0.5) * scale;
                let height = heightmap.sample_bilinear(hx, hy);
                let slope_value = slope.sample_bilinear(hx - 0.5, hy - 0.5);
                texture.set(x, y, self.color_at(height, slope_value, x, y));
            }
        }
        info!(
            "Generated texture for {}x{} texels with {} bands",
            region.width,
            region.height,
            self.textures.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextureBand;

    fn band(start: f32, end: f32, flat: Rgb, steep: Rgb) -> TextureBand {
        TextureBand {
            start,
            end,
            flat: TextureSource::Color(flat),
            steep: TextureSource::Color(steep),
            slope_start: 0.2,
            slope_end: 0.6,
        }
    }

    fn texturer(blend_width: f32) -> AutoTexturer {
        let setup = TextureGeneratorSetup {
            bands: vec![
                band(0.0, 0.5, [0, 100, 0], [100, 100, 100]),
                band(0.5, 1.0, [200, 200, 200], [50, 50, 50]),
            ],
            blend_width,
        };
        AutoTexturer::new(setup, Path::new(".")).unwrap()
    }

    #[test]
    fn test_flat_and_steep_inside_band() {
        let texturer = texturer(0.05);
        assert_eq!(texturer.color_at(0.2, 0.0, 0, 0), [0, 100, 0]);
        assert_eq!(texturer.color_at(0.2, 1.0, 0, 0), [100, 100, 100]);
        assert_eq!(texturer.color_at(0.9, 0.1, 0, 0), [200, 200, 200]);
        // Midway through the slope range
        assert_eq!(texturer.color_at(0.2, 0.4, 0, 0), [50, 100, 50]);
    }

    #[test]
    fn test_band_boundary_is_continuous() {
        let texturer = texturer(0.05);
        let mut previous = texturer.color_at(0.40, 0.0, 0, 0);
        let mut h = 0.40;
        while h < 0.60 {
            h += 0.001;
            let color = texturer.color_at(h, 0.0, 0, 0);
            for channel in 0..3 {
                let jump = (color[channel] as i32 - previous[channel] as i32).abs();
                assert!(jump <= 3, "seam at height {h}: {previous:?} -> {color:?}");
            }
            previous = color;
        }
        // Halfway across the boundary
        assert_eq!(texturer.color_at(0.5, 0.0, 0, 0), [100, 150, 100]);
    }

    #[test]
    fn test_zero_blend_width_gives_hard_edge() {
        let texturer = texturer(0.0);
        assert_eq!(texturer.color_at(0.4999, 0.0, 0, 0), [0, 100, 0]);
        assert_eq!(texturer.color_at(0.5, 0.0, 0, 0), [200, 200, 200]);
    }

    #[test]
    fn test_generate_checks_dimensions_and_paints() {
        let texturer = texturer(0.05);
        let heightmap = Raster::new(3, 3, 0.9f32);
        let mut texture = Raster::new(16, 16, [0u8; 3]);
        texturer.generate(&heightmap, 100.0, &mut texture, None).unwrap();
        assert!(texture.data().iter().all(|&c| c == [200, 200, 200]));

        let mut wrong = Raster::new(8, 8, [0u8; 3]);
        assert!(matches!(
            texturer.generate(&heightmap, 100.0, &mut wrong, None),
            Err(MapEditError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_file_band_texture_is_tiled() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = Raster::from_vec(2, 1, vec![[10u8, 0, 0], [0, 10, 0]]).unwrap();
        let mut bytes = Vec::new();
        crate::codec::bitmap::write_bitmap_24(&mut bytes, &pattern).unwrap();
        std::fs::write(dir.path().join("grass.bmp"), bytes).unwrap();

        let mut flat = band(0.0, 1.0, [0, 0, 0], [0, 0, 0]);
        flat.flat = TextureSource::File("grass.bmp".into());
        let setup = TextureGeneratorSetup {
            bands: vec![flat],
            blend_width: 0.0,
        };
        let texturer = AutoTexturer::new(setup, dir.path()).unwrap();
        assert_eq!(texturer.color_at(0.3, 0.0, 0, 0), [10, 0, 0]);
        assert_eq!(texturer.color_at(0.3, 0.0, 3, 5), [0, 10, 0]);
    }
}
