use std::path::{Path, PathBuf};

use mapedit::codec::{Dxt1Compressor, RawTileCodec, TileCompressor};
use mapedit::config::range_types::SmoothingStrength;
use mapedit::config::{
    ErosionSetup, SettingsDocument, TerraGenSetup, TextureGeneratorSetup, load_settings_file,
};
use mapedit::errors::{MapEditError, MapEditResult};
use mapedit::map::SpringMap;
use mapedit::terrain::{
    AutoTexturer, ErosionKind, Region, SmoothingAlgorithm, TerrainGenerator, erode, smooth,
    ttdize,
};
use mapedit::terrain::terragen::terrain_preset;
use tracing::{info, warn};

/// Setups read from a settings document. A setup that fails to load stays
/// `None` and the operation needing it is skipped.
#[derive(Debug, Default)]
pub struct Setups {
    pub erosion: Option<ErosionSetup>,
    pub texgen: Option<TextureGeneratorSetup>,
    pub terragen: Option<TerraGenSetup>,
    /// Directory texture file names are relative to
    pub base_dir: PathBuf,
}

impl Setups {
    pub fn load(settings: Option<&Path>) -> Self {
        let Some(path) = settings else {
            return Self::default();
        };
        let document = match load_settings_file(path) {
            Ok(document) => document,
            Err(err) => {
                warn!("Settings unavailable, generators disabled: {err}");
                return Self::default();
            }
        };
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_document(&document, base_dir)
    }

    pub fn from_document(document: &SettingsDocument, base_dir: PathBuf) -> Self {
        Self {
            erosion: enabled("erosion", ErosionSetup::load(document.root())),
            texgen: enabled("texture generator", TextureGeneratorSetup::load(document.root())),
            terragen: enabled("terragen", TerraGenSetup::load(document.root())),
            base_dir,
        }
    }
}

fn enabled<T>(feature: &str, setup: MapEditResult<T>) -> Option<T> {
    setup
        .map_err(|err| warn!("Disabling {feature}: {err}"))
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Height,
    Texture,
    Metal,
    Type,
    Vegetation,
    Features,
}

/// One queued edit
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Create { width: usize, height: usize },
    LoadSmf(PathBuf),
    LoadAll(PathBuf),
    LoadLayer(LayerKind, PathBuf),
    HeightBounds { min: f32, max: f32 },
    TerraGen { preset: Option<String>, seed: Option<u32> },
    Erode(ErosionKind),
    Smooth { algorithm: SmoothingAlgorithm, passes: u32, strength: f32 },
    Ttdize(u32),
    TexGen,
    SaveLayer(LayerKind, PathBuf),
    SaveAll(PathBuf),
    SaveSmf { path: PathBuf, minimap: Option<PathBuf> },
}

/// Runs queued steps against one map
pub struct Pipeline {
    pub map: SpringMap,
    pub setups: Setups,
    pub region: Option<Region>,
    compressor: Box<dyn TileCompressor>,
}

impl Pipeline {
    pub fn new(setups: Setups, region: Option<Region>, compressor: &str) -> MapEditResult<Self> {
        let compressor: Box<dyn TileCompressor> = match compressor {
            "dxt1" => Box::new(Dxt1Compressor),
            "raw" => Box::new(RawTileCodec),
            other => {
                return Err(MapEditError::InvalidSettings {
                    reason: format!("Unknown tile compressor '{other}'. Available: dxt1, raw"),
                });
            }
        };
        Ok(Self {
            map: SpringMap::new(8, 8)?,
            setups,
            region,
            compressor,
        })
    }

    pub fn run(&mut self, steps: &[Step]) -> MapEditResult<()> {
        for step in steps {
            self.run_step(step)?;
        }
        Ok(())
    }

    fn run_step(&mut self, step: &Step) -> MapEditResult<()> {
        match step {
            Step::Create { width, height } => self.map.recreate(*width, *height)?,
            Step::LoadSmf(path) => self.map.load_smf(path, self.compressor.as_ref())?,
            Step::LoadAll(base) => {
                let loaded = self.map.load_all(base)?;
                info!("Loaded {loaded} layer files from {}", base.display());
            }
            Step::LoadLayer(layer, path) => self.load_layer(*layer, path)?,
            Step::HeightBounds { min, max } => self.map.set_height_bounds(*min, *max)?,
            Step::TerraGen { preset, seed } => self.terragen(preset.as_deref(), *seed)?,
            Step::Erode(kind) => match &self.setups.erosion {
                Some(setup) => {
                    let stats = erode(self.map.heightmap_mut(), *kind, setup, self.region)?;
                    info!(
                        "Erosion finished after {} iterations (converged: {})",
                        stats.iterations, stats.converged
                    );
                }
                None => warn!("Skipping {kind:?} erosion: no erosion setup loaded"),
            },
            Step::Smooth {
                algorithm,
                passes,
                strength,
            } => smooth(
                self.map.heightmap_mut(),
                *algorithm,
                *passes,
                SmoothingStrength::new(*strength),
                self.region,
            )?,
            Step::Ttdize(levels) => ttdize(self.map.heightmap_mut(), *levels)?,
            Step::TexGen => self.texgen()?,
            Step::SaveLayer(layer, path) => self.save_layer(*layer, path)?,
            Step::SaveAll(base) => self.map.save_all(base)?,
            Step::SaveSmf { path, minimap } => {
                self.map
                    .save_smf(path, self.compressor.as_mut(), minimap.as_deref())?
            }
        }
        Ok(())
    }

    fn load_layer(&mut self, layer: LayerKind, path: &Path) -> MapEditResult<()> {
        match layer {
            LayerKind::Height => self.map.load_heightmap(path),
            LayerKind::Texture => self.map.load_texture(path),
            LayerKind::Metal => self.map.load_metalmap(path),
            LayerKind::Type => self.map.load_typemap(path),
            LayerKind::Vegetation => self.map.load_vegetation(path),
            LayerKind::Features => self.map.load_features(path).map(|_| ()),
        }
    }

    fn save_layer(&self, layer: LayerKind, path: &Path) -> MapEditResult<()> {
        match layer {
            LayerKind::Height => self.map.save_heightmap(path),
            LayerKind::Texture => self.map.save_texture(path),
            LayerKind::Metal => self.map.save_metalmap(path),
            LayerKind::Type => self.map.save_typemap(path),
            LayerKind::Vegetation => self.map.save_vegetation(path),
            LayerKind::Features => self.map.save_features(path),
        }
    }

    fn terragen(&mut self, preset: Option<&str>, seed: Option<u32>) -> MapEditResult<()> {
        let setup = match preset {
            Some(name) => terrain_preset(name, seed).ok_or_else(|| MapEditError::InvalidSettings {
                reason: format!("Unknown terrain preset '{name}'. Available: hills, mountains, plains"),
            })?,
            None => match &self.setups.terragen {
                Some(setup) => TerraGenSetup {
                    seed: seed.unwrap_or(setup.seed),
                    ..setup.clone()
                },
                None => {
                    warn!("Skipping terragen: no terragen setup loaded");
                    return Ok(());
                }
            },
        };
        TerrainGenerator::new(setup).generate(self.map.heightmap_mut(), self.region)
    }

    fn texgen(&mut self) -> MapEditResult<()> {
        let Some(setup) = &self.setups.texgen else {
            warn!("Skipping texture generation: no texture generator setup loaded");
            return Ok(());
        };
        let texturer = AutoTexturer::new(setup.clone(), &self.setups.base_dir)?;
        let range = self.map.bounds().range();
        let region = self.region.map(|r| {
            let scale = mapedit::map::TEXELS_PER_SQUARE;
            Region::new(r.x * scale, r.y * scale, r.width * scale, r.height * scale)
        });
        // Heightmap and texture both live in the map
        let heightmap = self.map.heightmap().clone();
        texturer.generate(&heightmap, range, self.map.texture_mut(), region)
    }
}
