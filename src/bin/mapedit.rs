use std::path::PathBuf;

use clap::Parser;
use mapedit::errors::MapEditResult;
use mapedit::logging::init_logging;
use mapedit::map::SpringMap;
use mapedit::terrain::{ErosionKind, SmoothingAlgorithm};

mod mapedit_cli {
    pub mod cli_utils;
    pub mod pipeline;
}

use mapedit_cli::cli_utils::*;
use mapedit_cli::pipeline::{LayerKind, Pipeline, Setups, Step};

#[derive(Parser, Clone, Default)]
#[command(name = "mapedit")]
#[command(about = "Create, edit and convert tiled RTS map files")]
struct Args {
    /// Start from an empty map of this size in engine units (format: WIDTHxHEIGHT)
    #[arg(long)]
    create: Option<String>,

    /// Load a map from an .smf file and its tile files
    #[arg(long)]
    load_smf: Option<PathBuf>,

    /// Load every layer file found for this base name
    #[arg(long)]
    load_all: Option<PathBuf>,

    #[arg(long)]
    load_height: Option<PathBuf>,

    #[arg(long)]
    load_texture: Option<PathBuf>,

    #[arg(long)]
    load_metal: Option<PathBuf>,

    #[arg(long)]
    load_type: Option<PathBuf>,

    #[arg(long)]
    load_vegetation: Option<PathBuf>,

    #[arg(long)]
    load_features: Option<PathBuf>,

    /// World elevation of the lowest and highest heights (format: MIN,MAX)
    #[arg(long)]
    height_bounds: Option<String>,

    /// Settings file with erosion, texgen and terragen sections
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Limit terrain operations to a heightmap region (format: X,Y,WIDTH,HEIGHT)
    #[arg(long)]
    region: Option<String>,

    /// Generate terrain from the terragen settings
    #[arg(long)]
    terragen: bool,

    /// Generate terrain from a preset instead (hills, mountains, plains)
    #[arg(long)]
    terrain_preset: Option<String>,

    /// Random seed for terrain generation
    #[arg(long)]
    seed: Option<u32>,

    /// Erosion variant to run (wet, wet2, dry)
    #[arg(long)]
    erode: Option<String>,

    /// Smoothing filter to run (box, gaussian)
    #[arg(long)]
    smooth: Option<String>,

    #[arg(long, default_value = "1")]
    smooth_passes: u32,

    /// Blend factor of each smoothing pass (0.0-1.0)
    #[arg(long, default_value = "1.0")]
    smooth_strength: f32,

    /// Quantize heights into this many levels
    #[arg(long)]
    ttdize: Option<u32>,

    /// Paint the texture from height and slope using the texgen settings
    #[arg(long)]
    texgen: bool,

    #[arg(long)]
    save_height: Option<PathBuf>,

    #[arg(long)]
    save_texture: Option<PathBuf>,

    #[arg(long)]
    save_metal: Option<PathBuf>,

    #[arg(long)]
    save_type: Option<PathBuf>,

    #[arg(long)]
    save_vegetation: Option<PathBuf>,

    #[arg(long)]
    save_features: Option<PathBuf>,

    /// Save every layer as <BASE>_<Layer> files
    #[arg(long)]
    save_all: Option<PathBuf>,

    /// Save the map as an .smf file with a .smt tile file next to it
    #[arg(long)]
    save_smf: Option<PathBuf>,

    /// DDS file whose mipmaps replace the generated minimap
    #[arg(long)]
    minimap: Option<PathBuf>,

    /// Tile compressor for .smt files (dxt1, raw)
    #[arg(long, default_value = "dxt1")]
    compressor: String,

    /// Run the queue without printing a summary
    #[arg(long)]
    batch: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

/// Turn arguments into steps, in the order loads, edits, saves
fn build_steps(args: &Args) -> MapEditResult<Vec<Step>> {
    let mut steps = Vec::new();

    if let Some(size) = &args.create {
        let (width, height) = parse_size(size)?;
        steps.push(Step::Create { width, height });
    }
    if let Some(path) = &args.load_smf {
        steps.push(Step::LoadSmf(path.clone()));
    }
    if let Some(base) = &args.load_all {
        steps.push(Step::LoadAll(base.clone()));
    }
    let loads = [
        (LayerKind::Height, &args.load_height),
        (LayerKind::Texture, &args.load_texture),
        (LayerKind::Metal, &args.load_metal),
        (LayerKind::Type, &args.load_type),
        (LayerKind::Vegetation, &args.load_vegetation),
        (LayerKind::Features, &args.load_features),
    ];
    for (layer, path) in loads {
        if let Some(path) = path {
            steps.push(Step::LoadLayer(layer, path.clone()));
        }
    }

    if let Some(bounds) = &args.height_bounds {
        let (min, max) = parse_height_bounds(bounds)?;
        steps.push(Step::HeightBounds { min, max });
    }
    if args.terragen || args.terrain_preset.is_some() {
        steps.push(Step::TerraGen {
            preset: args.terrain_preset.clone(),
            seed: args.seed,
        });
    }
    if let Some(kind) = &args.erode {
        steps.push(Step::Erode(kind.parse::<ErosionKind>()?));
    }
    if let Some(algorithm) = &args.smooth {
        steps.push(Step::Smooth {
            algorithm: algorithm.parse::<SmoothingAlgorithm>()?,
            passes: args.smooth_passes,
            strength: args.smooth_strength,
        });
    }
    if let Some(levels) = args.ttdize {
        steps.push(Step::Ttdize(levels));
    }
    if args.texgen {
        steps.push(Step::TexGen);
    }

    let saves = [
        (LayerKind::Height, &args.save_height),
        (LayerKind::Texture, &args.save_texture),
        (LayerKind::Metal, &args.save_metal),
        (LayerKind::Type, &args.save_type),
        (LayerKind::Vegetation, &args.save_vegetation),
        (LayerKind::Features, &args.save_features),
    ];
    for (layer, path) in saves {
        if let Some(path) = path {
            steps.push(Step::SaveLayer(layer, path.clone()));
        }
    }
    if let Some(base) = &args.save_all {
        steps.push(Step::SaveAll(base.clone()));
    }
    if let Some(path) = &args.save_smf {
        steps.push(Step::SaveSmf {
            path: path.clone(),
            minimap: args.minimap.clone(),
        });
    }

    Ok(steps)
}

fn main() -> MapEditResult<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let region = args.region.as_deref().map(parse_region).transpose()?;
    let steps = build_steps(&args)?;
    let setups = Setups::load(args.settings.as_deref());

    let mut pipeline = Pipeline::new(setups, region, &args.compressor)?;
    pipeline.run(&steps)?;

    if !args.batch {
        print_map_summary(&pipeline.map, steps.len());
    }
    Ok(())
}

fn print_map_summary(map: &SpringMap, steps: usize) {
    let dimensions = map.dimensions();
    let bounds = map.bounds();
    let (hw, hh) = map.heightmap().dimensions();

    println!("Ran {steps} steps");
    println!("\nMap summary:");
    println!("  Size: {}x{} ({hw}x{hh} heightmap)", dimensions.width, dimensions.height);
    println!("  Map id: {}", map.map_id());
    println!(
        "  Heights: {} to {}{}",
        bounds.min_height,
        bounds.max_height,
        if bounds.has_water { " (water)" } else { "" }
    );
    let heights = map.heightmap().data();
    let lowest = heights.iter().copied().fold(f32::INFINITY, f32::min);
    let highest = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    println!("  Heightmap range: {lowest:.3} to {highest:.3}");
    println!(
        "  Metal cells: {}",
        map.metalmap().data().iter().filter(|&&m| m > 0).count()
    );
    println!(
        "  Vegetation cells: {}",
        map.vegetation().data().iter().filter(|&&v| v > 0).count()
    );
    println!("  Features: {}", map.features().len());

    let features = map.features();
    if !features.is_empty() {
        println!("  Feature types:");
        for type_id in features.used_types() {
            let count = features.features().iter().filter(|f| f.type_id == type_id).count();
            let name = features.types().name(type_id).unwrap_or("?");
            println!("    {name}: {count} features");
        }
    }
}
