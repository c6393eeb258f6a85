//! Immutable parameter structs for terrain operations, loaded from settings
//! sections and checked with `validator`.

use super::{SettingsSection, optional_key, require_key, require_section, validation_reason};
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::Rgb;
use std::path::PathBuf;
use tracing::info;
use validator::Validate;

fn check(setup: &impl Validate, name: &str) -> MapEditResult<()> {
    setup.validate().map_err(|errors| MapEditError::InvalidSettings {
        reason: format!("[{name}] {}", validation_reason(&errors)),
    })
}

/// Erosion parameters shared by the wet, wet2 and dry variants
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ErosionSetup {
    #[validate(range(min = 1, max = 1_000_000))]
    pub iterations: u32,
    /// Water added per cell per step
    #[validate(range(min = 0.0, max = 1.0))]
    pub rain: f32,
    /// Fraction of water volume that dissolves terrain
    #[validate(range(min = 0.0, max = 1.0))]
    pub solubility: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub evaporation: f32,
    /// Sediment a unit of water can carry
    #[validate(range(min = 0.0, max = 100.0))]
    pub capacity: f32,
    /// Wet erosion stops once total water falls below this amount
    #[validate(range(min = 0.0))]
    pub break_threshold: f32,

    // Droplet (wet2) parameters
    #[validate(range(min = 1, max = 10_000))]
    pub droplet_lifetime: u32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub inertia: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub deposition: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub erosion_rate: f32,
    #[validate(range(min = 0.0, max = 100.0))]
    pub gravity: f32,

    // Thermal (dry) parameters
    /// Largest height step between neighbours that stays put
    #[validate(range(min = 0.0, max = 1.0))]
    pub talus: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub thermal_rate: f32,
    pub seed: u64,
}

impl Default for ErosionSetup {
    fn default() -> Self {
        Self {
            iterations: 50,
            rain: 0.01,
            solubility: 0.01,
            evaporation: 0.5,
            capacity: 0.01,
            break_threshold: 0.0001,
            droplet_lifetime: 30,
            inertia: 0.05,
            deposition: 0.3,
            erosion_rate: 0.3,
            gravity: 4.0,
            talus: 0.004,
            thermal_rate: 0.5,
            seed: 1,
        }
    }
}

impl ErosionSetup {
    pub const SECTION: &'static str = "erosion";

    /// Load from the `[erosion]` section. The grid parameters are required,
    /// droplet and thermal parameters fall back to defaults.
    pub fn load<S: SettingsSection>(root: &S) -> MapEditResult<Self> {
        let name = Self::SECTION;
        let section = require_section(root, name)?;
        let defaults = Self::default();

        let setup = Self {
            iterations: require_key(section, name, "iterations")?,
            rain: require_key(section, name, "rain")?,
            solubility: require_key(section, name, "solubility")?,
            evaporation: require_key(section, name, "evaporation")?,
            capacity: require_key(section, name, "capacity")?,
            break_threshold: require_key(section, name, "break_threshold")?,
            droplet_lifetime: optional_key(section, name, "droplet_lifetime", defaults.droplet_lifetime)?,
            inertia: optional_key(section, name, "inertia", defaults.inertia)?,
            deposition: optional_key(section, name, "deposition", defaults.deposition)?,
            erosion_rate: optional_key(section, name, "erosion_rate", defaults.erosion_rate)?,
            gravity: optional_key(section, name, "gravity", defaults.gravity)?,
            talus: optional_key(section, name, "talus", defaults.talus)?,
            thermal_rate: optional_key(section, name, "thermal_rate", defaults.thermal_rate)?,
            seed: optional_key(section, name, "seed", defaults.seed)?,
        };
        check(&setup, name)?;
        info!("Loaded erosion setup: {} iterations", setup.iterations);
        Ok(setup)
    }
}

/// Where a band draws its colour from
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    Color(Rgb),
    /// Bitmap tiled across the texture layer
    File(PathBuf),
}

impl TextureSource {
    /// `"r,g,b"` is a colour, anything else a file path
    pub fn parse(value: &str) -> MapEditResult<Self> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if parts.len() == 3 {
            let mut rgb = [0u8; 3];
            for (channel, part) in rgb.iter_mut().zip(&parts) {
                *channel = part.parse().map_err(|_| MapEditError::InvalidSettings {
                    reason: format!("Bad colour component '{part}' in '{value}'"),
                })?;
            }
            return Ok(TextureSource::Color(rgb));
        }
        if value.trim().is_empty() {
            return Err(MapEditError::InvalidSettings {
                reason: "Empty texture source".to_string(),
            });
        }
        Ok(TextureSource::File(PathBuf::from(value.trim())))
    }
}

/// One height band of the texture generator
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct TextureBand {
    #[validate(range(min = 0.0, max = 1.0))]
    pub start: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub end: f32,
    pub flat: TextureSource,
    pub steep: TextureSource,
    /// Normalized slope where steep starts to show
    #[validate(range(min = 0.0, max = 1.0))]
    pub slope_start: f32,
    /// Normalized slope where steep fully covers flat
    #[validate(range(min = 0.0, max = 1.0))]
    pub slope_end: f32,
}

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct TextureGeneratorSetup {
    pub bands: Vec<TextureBand>,
    /// Height distance either side of a band boundary that blends
    #[validate(range(min = 0.0, max = 0.5))]
    pub blend_width: f32,
}

impl TextureGeneratorSetup {
    pub const SECTION: &'static str = "texgen";

    /// Load from `[texgen]` with bands in `[texgen.band0]`, `[texgen.band1]`…
    pub fn load<S: SettingsSection>(root: &S) -> MapEditResult<Self> {
        let name = Self::SECTION;
        let section = require_section(root, name)?;
        let blend_width = optional_key(section, name, "blend_width", 0.02f32)?;

        let mut bands = Vec::new();
        let mut index = 0;
        while let Some(band_section) = section.section(&format!("band{index}")) {
            let band_name = format!("{name}.band{index}");
            let flat: String = require_key(band_section, &band_name, "flat")?;
            let steep: String = require_key(band_section, &band_name, "steep")?;
            let band = TextureBand {
                start: require_key(band_section, &band_name, "start")?,
                end: require_key(band_section, &band_name, "end")?,
                flat: TextureSource::parse(&flat)?,
                steep: TextureSource::parse(&steep)?,
                slope_start: optional_key(band_section, &band_name, "slope_start", 0.2f32)?,
                slope_end: optional_key(band_section, &band_name, "slope_end", 0.5f32)?,
            };
            check(&band, &band_name)?;
            bands.push(band);
            index += 1;
        }

        let setup = Self { bands, blend_width };
        check(&setup, name)?;
        setup.check_bands()?;
        info!("Loaded texture generator setup with {} bands", setup.bands.len());
        Ok(setup)
    }

    /// Bands must be non-empty, ordered and non-overlapping
    pub fn check_bands(&self) -> MapEditResult<()> {
        if self.bands.is_empty() {
            return Err(MapEditError::config_missing(Self::SECTION, "band0"));
        }
        for (i, band) in self.bands.iter().enumerate() {
            if band.start >= band.end {
                return Err(MapEditError::InvalidSettings {
                    reason: format!("band{i} is empty: start {} >= end {}", band.start, band.end),
                });
            }
            if band.slope_start > band.slope_end {
                return Err(MapEditError::InvalidSettings {
                    reason: format!("band{i} slope range is reversed"),
                });
            }
        }
        for (i, pair) in self.bands.windows(2).enumerate() {
            if pair[1].start < pair[0].end {
                return Err(MapEditError::InvalidSettings {
                    reason: format!("band{} overlaps band{}", i + 1, i),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerraGenAlgorithm {
    Perlin,
    Ridged,
}

#[derive(Debug, Clone, PartialEq, Validate)]
pub struct TerraGenSetup {
    pub algorithm: TerraGenAlgorithm,
    pub seed: u32,
    #[validate(range(min = 0.0001, max = 1.0))]
    pub frequency: f64,
    #[validate(range(min = 1, max = 16))]
    pub octaves: usize,
    #[validate(range(min = 0.0, max = 1.0))]
    pub persistence: f64,
    #[validate(range(min = 1.0, max = 4.0))]
    pub lacunarity: f64,
    /// Output range the noise is normalized into
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_height: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_height: f32,
}

impl Default for TerraGenSetup {
    fn default() -> Self {
        Self {
            algorithm: TerraGenAlgorithm::Perlin,
            seed: 42,
            frequency: 0.01,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            min_height: 0.0,
            max_height: 1.0,
        }
    }
}

impl TerraGenSetup {
    pub const SECTION: &'static str = "terragen";

    pub fn load<S: SettingsSection>(root: &S) -> MapEditResult<Self> {
        let name = Self::SECTION;
        let section = require_section(root, name)?;
        let defaults = Self::default();

        let algorithm: String = require_key(section, name, "algorithm")?;
        let algorithm = match algorithm.to_lowercase().as_str() {
            "perlin" => TerraGenAlgorithm::Perlin,
            "ridged" => TerraGenAlgorithm::Ridged,
            other => {
                return Err(MapEditError::InvalidSettings {
                    reason: format!("Unknown terragen algorithm '{other}'"),
                });
            }
        };

        let setup = Self {
            algorithm,
            seed: optional_key(section, name, "seed", defaults.seed)?,
            frequency: require_key(section, name, "frequency")?,
            octaves: optional_key(section, name, "octaves", defaults.octaves)?,
            persistence: optional_key(section, name, "persistence", defaults.persistence)?,
            lacunarity: optional_key(section, name, "lacunarity", defaults.lacunarity)?,
            min_height: optional_key(section, name, "min_height", defaults.min_height)?,
            max_height: optional_key(section, name, "max_height", defaults.max_height)?,
        };
        check(&setup, name)?;
        if setup.min_height > setup.max_height {
            return Err(MapEditError::InvalidSettings {
                reason: "terragen min_height exceeds max_height".to_string(),
            });
        }
        Ok(setup)
    }
}

/// A named stamp: a heightmap pattern plus an optional texture
#[derive(Debug, Clone, PartialEq)]
pub struct Prefab {
    pub name: String,
    pub heightmap: PathBuf,
    pub texture: Option<PathBuf>,
    /// Placement snapping step in heightmap squares
    pub align: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrefabCategory {
    pub name: String,
    pub prefabs: Vec<Prefab>,
}

impl PrefabCategory {
    pub const SECTION: &'static str = "prefabs";

    /// Every `[prefabs.<category>.<prefab>]` table, grouped by category
    pub fn load_all<S: SettingsSection>(root: &S) -> MapEditResult<Vec<Self>> {
        let section = require_section(root, Self::SECTION)?;
        let mut categories = Vec::new();

        for category_name in section.section_names() {
            let Some(category) = section.section(&category_name) else {
                continue;
            };
            let mut prefabs = Vec::new();
            for prefab_name in category.section_names() {
                let Some(prefab) = category.section(&prefab_name) else {
                    continue;
                };
                let path = format!("{}.{category_name}.{prefab_name}", Self::SECTION);
                let heightmap: String = require_key(prefab, &path, "heightmap")?;
                let texture: Option<String> = prefab.key_value("texture");
                let align: Option<u32> = match prefab.key_value("align") {
                    Some(_) => Some(require_key(prefab, &path, "align")?),
                    None => None,
                };
                prefabs.push(Prefab {
                    name: prefab_name,
                    heightmap: PathBuf::from(heightmap),
                    texture: texture.map(PathBuf::from),
                    align,
                });
            }
            categories.push(PrefabCategory {
                name: category_name,
                prefabs,
            });
        }
        Ok(categories)
    }
}
