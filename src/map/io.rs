//! Loading and saving map layers, the "all maps" bundle and the `.smf`/`.smt`
//! pair.

use super::{HEIGHTMAP_FACTOR, SpringMap};
use crate::codec::binary::write_atomically;
use crate::codec::bitmap::{load_bitmap, read_bitmap, write_bitmap_8, write_bitmap_24};
use crate::codec::features::{load_feature_file, save_feature_file};
use crate::codec::png::{read_png_heightmap, write_png16};
use crate::codec::raw::{read_raw16, write_raw16, write_sraw};
use crate::codec::smf::{SmfSource, read_dds_minimap, read_smf, write_smf};
use crate::codec::tiles::{paint_tiles, read_tile_file_header, save_tile_file};
use crate::codec::{LayerFile, TileCompressor};
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::{Lerp, Raster};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// On-disk encodings of a heightmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightmapFormat {
    /// 16-bit grayscale PNG
    Png16,
    /// 8 bpp grayscale bitmap
    Bitmap8,
    /// Headerless little-endian u16 samples
    Raw16,
    /// u16 samples behind an `SRAW` header
    Sraw,
}

impl HeightmapFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> MapEditResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "png" => Ok(Self::Png16),
            "bmp" => Ok(Self::Bitmap8),
            "raw" => Ok(Self::Raw16),
            "sraw" => Ok(Self::Sraw),
            _ => Err(MapEditError::format(format!(
                "Unknown heightmap format for {}",
                path.display()
            ))),
        }
    }
}

/// Fit a loaded raster to the layer size, interpolating
fn fit_bilinear<T: Lerp>(name: &str, raster: Raster<T>, (width, height): (usize, usize)) -> Raster<T> {
    if raster.dimensions() == (width, height) {
        return raster;
    }
    info!(
        "Resampling {name} from {}x{} to {width}x{height}",
        raster.width(),
        raster.height()
    );
    raster.resample_bilinear(width, height)
}

/// Fit a loaded raster to the layer size, keeping exact values
fn fit_nearest<T: Copy>(name: &str, raster: Raster<T>, (width, height): (usize, usize)) -> Raster<T> {
    if raster.dimensions() == (width, height) {
        return raster;
    }
    info!(
        "Resampling {name} from {}x{} to {width}x{height}",
        raster.width(),
        raster.height()
    );
    raster.resample_nearest(width, height)
}

fn non_empty<T: Copy>(name: &str, path: &Path, raster: &Raster<T>) -> MapEditResult<()> {
    if raster.is_empty() {
        return Err(MapEditError::format(format!(
            "{name} file {} holds no pixels",
            path.display()
        )));
    }
    Ok(())
}

impl SpringMap {
    /// Load the heightmap from PNG, bitmap or raw. Files of another size are
    /// resampled to the current map.
    pub fn load_heightmap(&mut self, path: &Path) -> MapEditResult<()> {
        let format = HeightmapFormat::from_path(path)?;
        let mut reader = BufReader::new(File::open(path)?);
        let loaded = match format {
            HeightmapFormat::Png16 => read_png_heightmap(&mut reader)?,
            HeightmapFormat::Bitmap8 => read_bitmap(&mut reader)?.to_intensity(),
            HeightmapFormat::Raw16 | HeightmapFormat::Sraw => {
                let raw = read_raw16(&mut reader, self.heightmap.width())?;
                if let Some(warning) = raw.warning {
                    warn!("{}: {warning}", path.display());
                }
                raw.heightmap
            }
        };
        non_empty("Heightmap", path, &loaded)?;
        self.heightmap = fit_bilinear("heightmap", loaded, self.dimensions.heightmap());
        info!("Loaded heightmap from {}", path.display());
        Ok(())
    }

    pub fn save_heightmap(&self, path: &Path) -> MapEditResult<()> {
        let format = HeightmapFormat::from_path(path)?;
        write_atomically(path, |writer| match format {
            HeightmapFormat::Png16 => write_png16(writer, &self.heightmap),
            HeightmapFormat::Bitmap8 => {
                let bytes = self.heightmap.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
                write_bitmap_8(writer, &bytes)
            }
            HeightmapFormat::Raw16 => write_raw16(writer, &self.heightmap),
            HeightmapFormat::Sraw => write_sraw(writer, &self.heightmap),
        })?;
        info!("Saved heightmap to {}", path.display());
        Ok(())
    }

    pub fn load_texture(&mut self, path: &Path) -> MapEditResult<()> {
        let bitmap = load_bitmap(path)?;
        non_empty("Texture", path, &bitmap.pixels)?;
        self.texture = fit_bilinear("texture", bitmap.pixels, self.dimensions.texture());
        info!("Loaded texture from {}", path.display());
        Ok(())
    }

    pub fn save_texture(&self, path: &Path) -> MapEditResult<()> {
        write_atomically(path, |writer| write_bitmap_24(writer, &self.texture))?;
        info!("Saved texture to {}", path.display());
        Ok(())
    }

    pub fn load_metalmap(&mut self, path: &Path) -> MapEditResult<()> {
        let bytes = load_bitmap(path)?.to_bytes();
        non_empty("Metal map", path, &bytes)?;
        self.metalmap = fit_nearest("metal map", bytes, self.dimensions.metalmap());
        info!("Loaded metal map from {}", path.display());
        Ok(())
    }

    pub fn save_metalmap(&self, path: &Path) -> MapEditResult<()> {
        write_atomically(path, |writer| write_bitmap_8(writer, &self.metalmap))
    }

    pub fn load_typemap(&mut self, path: &Path) -> MapEditResult<()> {
        let bytes = load_bitmap(path)?.to_bytes();
        non_empty("Type map", path, &bytes)?;
        self.typemap = fit_nearest("type map", bytes, self.dimensions.typemap());
        info!("Loaded type map from {}", path.display());
        Ok(())
    }

    pub fn save_typemap(&self, path: &Path) -> MapEditResult<()> {
        write_atomically(path, |writer| write_bitmap_8(writer, &self.typemap))
    }

    /// Bright pixels (128 and up) mark vegetation
    pub fn load_vegetation(&mut self, path: &Path) -> MapEditResult<()> {
        let flags = load_bitmap(path)?.to_bytes().map(|v| u8::from(v >= 128));
        non_empty("Vegetation map", path, &flags)?;
        self.vegetation = fit_nearest("vegetation map", flags, self.dimensions.vegetation());
        info!("Loaded vegetation map from {}", path.display());
        Ok(())
    }

    pub fn save_vegetation(&self, path: &Path) -> MapEditResult<()> {
        let pixels = self.vegetation.map(|v| if v != 0 { 255u8 } else { 0 });
        write_atomically(path, |writer| write_bitmap_8(writer, &pixels))
    }

    /// Replace all features with those of an `.fmf` file
    pub fn load_features(&mut self, path: &Path) -> MapEditResult<usize> {
        load_feature_file(path, &mut self.features)
    }

    pub fn save_features(&self, path: &Path) -> MapEditResult<()> {
        save_feature_file(path, &self.features)
    }

    fn load_layer(&mut self, layer: LayerFile, path: &Path) -> MapEditResult<()> {
        match layer {
            LayerFile::Height => self.load_heightmap(path),
            LayerFile::Metal => self.load_metalmap(path),
            LayerFile::Feature => self.load_features(path).map(|_| ()),
            LayerFile::Type => self.load_typemap(path),
            LayerFile::Vegetation => self.load_vegetation(path),
            LayerFile::Texture => self.load_texture(path),
        }
    }

    fn save_layer(&self, layer: LayerFile, path: &Path) -> MapEditResult<()> {
        match layer {
            LayerFile::Height => self.save_heightmap(path),
            LayerFile::Metal => self.save_metalmap(path),
            LayerFile::Feature => self.save_features(path),
            LayerFile::Type => self.save_typemap(path),
            LayerFile::Vegetation => self.save_vegetation(path),
            LayerFile::Texture => self.save_texture(path),
        }
    }

    /// Save every layer as `<base><suffix>`
    pub fn save_all(&self, base: &Path) -> MapEditResult<()> {
        for layer in LayerFile::ALL {
            self.save_layer(layer, &layer.path_for(base))?;
        }
        info!("Saved all layers to {}_*", base.display());
        Ok(())
    }

    /// Load every `<base><suffix>` layer file that exists and return how
    /// many were found
    pub fn load_all(&mut self, base: &Path) -> MapEditResult<usize> {
        let mut loaded = 0;
        for layer in LayerFile::ALL {
            let path = layer.path_for(base);
            if !path.exists() {
                warn!("Layer file {} not found, skipping", path.display());
                continue;
            }
            self.load_layer(layer, &path)?;
            loaded += 1;
        }
        if loaded == 0 {
            return Err(MapEditError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No layer files found for {}", base.display()),
            )));
        }
        Ok(loaded)
    }

    /// Load an `.smf` file and the tile files it references. The map is
    /// recreated at the file's size.
    pub fn load_smf(&mut self, path: &Path, compressor: &dyn TileCompressor) -> MapEditResult<()> {
        let smf = read_smf(&mut BufReader::new(File::open(path)?))?;
        if smf.map_x % HEIGHTMAP_FACTOR != 0 || smf.map_y % HEIGHTMAP_FACTOR != 0 {
            return Err(MapEditError::DimensionMismatch {
                reason: format!(
                    "Map of {}x{} squares is not a whole number of {HEIGHTMAP_FACTOR}-square units",
                    smf.map_x, smf.map_y
                ),
            });
        }

        let mut loaded = SpringMap::new(smf.map_x / HEIGHTMAP_FACTOR, smf.map_y / HEIGHTMAP_FACTOR)?;
        loaded.map_id = smf.map_id;
        loaded.bounds = smf.bounds;
        loaded.heightmap = smf.heightmap;
        loaded.typemap = smf.typemap;
        loaded.metalmap = smf.metalmap;
        if let Some(vegetation) = smf.vegetation {
            loaded.vegetation = vegetation;
        }
        loaded.features = smf.features;

        let positions = smf.tile_index.positions_by_id()?;
        let directory = path.parent().unwrap_or_else(|| Path::new(""));
        let mut first = 0;
        for (name, count) in &smf.tile_files {
            let tile_path = directory.join(name);
            let mut reader = BufReader::new(File::open(&tile_path)?);
            let available = read_tile_file_header(&mut reader)?;
            if available < *count {
                return Err(MapEditError::format(format!(
                    "{} holds {available} tiles, the map expects {count}",
                    tile_path.display()
                )));
            }
            let last = (first + count).min(positions.len());
            paint_tiles(&mut loaded.texture, &positions[first..last], &mut reader, compressor)?;
            first = last;
        }
        if first < positions.len() {
            return Err(MapEditError::format(format!(
                "Tile files supply {first} tiles, the index uses {}",
                positions.len()
            )));
        }

        *self = loaded;
        info!(
            "Loaded {} ({}x{})",
            path.display(),
            self.dimensions.width,
            self.dimensions.height
        );
        Ok(())
    }

    /// Save the map as `<path>` plus a tile file next to it with the `.smt`
    /// extension. `minimap` optionally replaces the generated minimap with
    /// one read from a DDS file.
    pub fn save_smf(
        &self,
        path: &Path,
        compressor: &mut dyn TileCompressor,
        minimap: Option<&Path>,
    ) -> MapEditResult<()> {
        let tile_path = path.with_extension("smt");
        let tile_file_name = tile_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MapEditError::invalid(format!("Bad tile file name {}", tile_path.display())))?
            .to_string();

        let tile_index = save_tile_file(&tile_path, &self.texture, compressor)?;
        let minimap = match minimap {
            Some(dds) => read_dds_minimap(&mut BufReader::new(File::open(dds)?))?,
            None => compressor.compressed_minimap(&self.texture)?,
        };

        let source = SmfSource {
            map_id: self.map_id,
            bounds: self.bounds,
            heightmap: &self.heightmap,
            typemap: &self.typemap,
            metalmap: &self.metalmap,
            vegetation: &self.vegetation,
            tile_file_name: &tile_file_name,
            tile_index: &tile_index,
            minimap: &minimap,
            features: &self.features,
        };
        write_atomically(path, |writer| write_smf(writer, &source))?;
        info!(
            "Saved {} with {} distinct tiles",
            path.display(),
            tile_index.tile_count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RawTileCodec;
    use crate::map::MapLayer;

    #[test]
    fn test_heightmap_format_from_path() {
        assert_eq!(HeightmapFormat::from_path(Path::new("a.PNG")).unwrap(), HeightmapFormat::Png16);
        assert_eq!(HeightmapFormat::from_path(Path::new("a.sraw")).unwrap(), HeightmapFormat::Sraw);
        assert!(HeightmapFormat::from_path(Path::new("a.tga")).is_err());
    }

    #[test]
    fn test_heightmap_formats_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = SpringMap::new(1, 1).unwrap();
        for (x, y, _) in map.heightmap().clone().iter() {
            map.heightmap_mut().set(x, y, ((x + y) % 7) as f32 / 6.0);
        }

        for name in ["h.png", "h.raw", "h.sraw"] {
            let path = dir.path().join(name);
            map.save_heightmap(&path).unwrap();
            let mut loaded = SpringMap::new(1, 1).unwrap();
            loaded.load_heightmap(&path).unwrap();
            for (a, b) in map.heightmap().data().iter().zip(loaded.heightmap().data()) {
                assert!((a - b).abs() <= 1.0 / 65535.0, "{name}: {a} vs {b}");
            }
        }

        let path = dir.path().join("h.bmp");
        map.save_heightmap(&path).unwrap();
        let mut loaded = SpringMap::new(1, 1).unwrap();
        loaded.load_heightmap(&path).unwrap();
        for (a, b) in map.heightmap().data().iter().zip(loaded.heightmap().data()) {
            assert!((a - b).abs() <= 0.5 / 255.0 + 1e-6);
        }
    }

    #[test]
    fn test_smaller_layer_file_is_resampled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metal.bmp");
        let small = Raster::new(8, 8, 200u8);
        let mut bytes = Vec::new();
        write_bitmap_8(&mut bytes, &small).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let mut map = SpringMap::new(1, 1).unwrap();
        map.load_metalmap(&path).unwrap();
        assert_eq!(map.metalmap().dimensions(), map.dimensions().layer(MapLayer::Metal));
        assert!(map.metalmap().data().iter().all(|&v| v == 200));
    }

    #[test]
    fn test_vegetation_saved_as_full_intensity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("veg.bmp");
        let mut map = SpringMap::new(1, 1).unwrap();
        map.vegetation_mut().set(3, 4, 1);
        map.save_vegetation(&path).unwrap();

        let bitmap = load_bitmap(&path).unwrap();
        assert_eq!(bitmap.value(3, 4), 255);
        assert_eq!(bitmap.value(0, 0), 0);

        let mut loaded = SpringMap::new(1, 1).unwrap();
        loaded.load_vegetation(&path).unwrap();
        assert_eq!(loaded.vegetation(), map.vegetation());
    }

    #[test]
    fn test_smf_round_trip_recreates_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Comet.smf");

        let mut map = SpringMap::new(1, 2).unwrap();
        map.set_height_bounds(20.0, 300.0).unwrap();
        map.heightmap_mut().set(10, 10, 0.75);
        map.texture_mut().set(100, 700, [255, 0, 0]);
        map.metalmap_mut().set(5, 6, 90);
        map.typemap_mut().set(1, 2, 3);
        map.vegetation_mut().set(0, 31, 1);
        let tree = map.features_mut().types_mut().register("tree");
        map.features_mut().insert(12.0, 30.0, 40.0, 90.0, tree);
        map.save_smf(&path, &mut RawTileCodec, None).unwrap();
        assert!(dir.path().join("Comet.smt").exists());

        let mut loaded = SpringMap::new(1, 1).unwrap();
        loaded.load_smf(&path, &RawTileCodec).unwrap();
        assert_eq!(loaded.dimensions(), map.dimensions());
        assert_eq!(loaded.map_id(), map.map_id());
        assert_eq!(loaded.bounds(), map.bounds());
        assert_eq!(loaded.texture(), map.texture());
        assert_eq!(loaded.metalmap(), map.metalmap());
        assert_eq!(loaded.typemap(), map.typemap());
        assert_eq!(loaded.vegetation(), map.vegetation());
        assert!((loaded.heightmap().at(10, 10) - 0.75).abs() <= 1.0 / 65535.0);
        assert_eq!(loaded.features().len(), 1);
    }

    #[test]
    fn test_bundle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("Comet");

        let mut map = SpringMap::new(1, 1).unwrap();
        map.typemap_mut().set(7, 7, 9);
        map.texture_mut().set(1, 1, [9, 8, 7]);
        map.save_all(&base).unwrap();
        for layer in LayerFile::ALL {
            assert!(layer.path_for(&base).exists(), "{layer:?} missing");
        }

        let mut loaded = SpringMap::new(1, 1).unwrap();
        assert_eq!(loaded.load_all(&base).unwrap(), LayerFile::ALL.len());
        assert_eq!(loaded.typemap(), map.typemap());
        assert_eq!(loaded.texture(), map.texture());

        let mut empty = SpringMap::new(1, 1).unwrap();
        assert!(empty.load_all(&dir.path().join("Nothing")).is_err());
    }
}
