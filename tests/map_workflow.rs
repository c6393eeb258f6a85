use mapedit::brush::{
    Brush, BrushAssets, BrushOperation, FeatureMode, HeightMode, MetalMode, PatternShape,
    TextureMode, pattern,
};
use mapedit::codec::Dxt1Compressor;
use mapedit::config::{ErosionSetup, SettingsDocument};
use mapedit::map::{MapLayer, SpringMap};
use mapedit::quicksave::QuickSave;
use mapedit::raster::Raster;
use mapedit::terrain::{ErosionKind, erode};
use rand::SeedableRng;
use rand_pcg::Pcg64;

const RED: [u8; 3] = [255, 0, 0];
const GREEN: [u8; 3] = [0, 255, 0];

/// A small map edited with several brushes
fn edited_map() -> (SpringMap, BrushAssets) {
    let mut rng = Pcg64::seed_from_u64(7);
    let mut map = SpringMap::new(1, 1).unwrap();
    map.set_height_bounds(0.0, 250.0).unwrap();

    let mut assets = BrushAssets::default();
    let square = assets.patterns.add(pattern(PatternShape::Uniform, 8)).unwrap();
    let soft = assets.patterns.add(pattern(PatternShape::Falloff, 32)).unwrap();
    let red = assets.textures.add(Raster::new(8, 8, RED)).unwrap();
    let green = assets.textures.add(Raster::new(8, 8, GREEN)).unwrap();

    Brush::new(BrushOperation::Height(HeightMode::Raise), soft)
        .with_size(24.0)
        .with_strength(120.0)
        .apply(&mut map, &mut assets, 32, 32, false, &mut rng)
        .unwrap();

    // Whole 32-texel tiles so every tile stays a single colour
    let stamp = Brush::new(BrushOperation::Texture(TextureMode::Stamp), square).with_size(4.0);
    stamp
        .clone()
        .with_texture(red)
        .apply(&mut map, &mut assets, 2, 2, false, &mut rng)
        .unwrap();
    stamp
        .clone()
        .with_texture(green)
        .apply(&mut map, &mut assets, 34, 2, false, &mut rng)
        .unwrap();
    stamp
        .with_texture(red)
        .apply(&mut map, &mut assets, 62, 62, false, &mut rng)
        .unwrap();

    Brush::new(BrushOperation::Metal(MetalMode::Set), square)
        .with_size(8.0)
        .with_strength(1.0)
        .apply(&mut map, &mut assets, 16, 48, false, &mut rng)
        .unwrap();

    let rock = map.features_mut().types_mut().register("rock01");
    Brush::new(BrushOperation::Feature(FeatureMode::Add { type_id: rock }), square)
        .apply(&mut map, &mut assets, 40, 20, false, &mut rng)
        .unwrap();

    (map, assets)
}

#[test]
fn test_smf_round_trip_with_dxt1_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Ridge.smf");
    let (map, _) = edited_map();

    map.save_smf(&path, &mut Dxt1Compressor, None).unwrap();
    assert!(dir.path().join("Ridge.smt").exists());

    let mut loaded = SpringMap::new(4, 4).unwrap();
    loaded.load_smf(&path, &Dxt1Compressor).unwrap();

    assert_eq!(loaded.dimensions(), map.dimensions());
    assert_eq!(loaded.map_id(), map.map_id());
    assert_eq!(loaded.bounds(), map.bounds());
    for (a, b) in map.heightmap().data().iter().zip(loaded.heightmap().data()) {
        assert!((a - b).abs() <= 1.0 / 65535.0);
    }
    assert_eq!(loaded.metalmap(), map.metalmap());
    assert_eq!(loaded.typemap(), map.typemap());
    assert_eq!(loaded.vegetation(), map.vegetation());
    // Solid 565-exact colours survive block compression unchanged
    assert_eq!(loaded.texture(), map.texture());
    assert_eq!(loaded.texture().at(10, 10), RED);
    assert_eq!(loaded.texture().at(260, 10), GREEN);

    let features = loaded.features().features();
    assert_eq!(features.len(), 1);
    assert!((features[0].x - 40.0).abs() < 1e-3);
    assert_eq!(loaded.features().types().name(features[0].type_id), Some("rock01"));
}

#[test]
fn test_bundle_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("Ridge");
    let (map, _) = edited_map();
    map.save_all(&base).unwrap();

    let mut loaded = SpringMap::new(1, 1).unwrap();
    let count = loaded.load_all(&base).unwrap();
    assert_eq!(count, 6);
    assert_eq!(loaded.texture(), map.texture());
    assert_eq!(loaded.metalmap(), map.metalmap());
    assert_eq!(loaded.features().len(), 1);
    for (a, b) in map.heightmap().data().iter().zip(loaded.heightmap().data()) {
        assert!((a - b).abs() <= 1.0 / 65535.0);
    }
}

#[test]
fn test_quicksave_undoes_erosion() {
    let (mut map, _) = edited_map();
    let original = map.heightmap().clone();
    let settings: SettingsDocument = r#"
        [erosion]
        iterations = 20
        rain = 0.01
        solubility = 0.01
        evaporation = 0.5
        capacity = 0.01
        break_threshold = 0.0
    "#
    .parse()
    .unwrap();
    let setup = ErosionSetup::load(settings.root()).unwrap();

    let mut quicksave = QuickSave::new();
    quicksave.snapshot(&map, &[MapLayer::Height], true).unwrap();

    erode(map.heightmap_mut(), ErosionKind::Dry, &setup, None).unwrap();
    assert_ne!(map.heightmap(), &original);
    assert!(map.heightmap().data().iter().all(|h| (0.0..=1.0).contains(h)));

    quicksave.restore(&mut map).unwrap();
    assert_eq!(map.heightmap(), &original);
}
