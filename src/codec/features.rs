//! Feature record table, embedded in `.smf` files and stored alone as `.fmf`.
//!
//! Layout: `numFeatureTypes:i32`, `numFeatures:i32`, the type names as
//! NUL-terminated strings, then one record per feature: `typeIndex:i32`,
//! world `x, y, z:f32`, `rotation:f32` (65535 is a full turn) and an unused
//! `relativeSize:f32`.

use crate::codec::binary::{non_negative, read_cstring, reserve_hint, write_atomically, write_cstring};
use crate::errors::{MapEditError, MapEditResult};
use crate::features::FeatureStore;
use crate::raster::coordinates::{grid_to_world, world_to_grid};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::{info, warn};

const FULL_TURN: f32 = 65535.0;

pub fn degrees_to_file_rotation(degrees: f32) -> f32 {
    degrees / 360.0 * FULL_TURN
}

pub fn file_rotation_to_degrees(rotation: f32) -> f32 {
    rotation / FULL_TURN * 360.0
}

/// Write every feature of the store as a record table
pub fn write_feature_table<W: Write>(writer: &mut W, store: &FeatureStore) -> MapEditResult<()> {
    let used = store.used_types();
    let features = store.features();

    writer.write_i32::<LittleEndian>(used.len() as i32)?;
    writer.write_i32::<LittleEndian>(features.len() as i32)?;
    for &type_id in &used {
        let name = store.types().name(type_id).ok_or_else(|| {
            MapEditError::invalid(format!("Feature type {type_id} has no registered name"))
        })?;
        write_cstring(writer, name)?;
    }

    for feature in features {
        // used_types covers every feature, so the lookup always succeeds
        let type_index = used.iter().position(|&t| t == feature.type_id).unwrap_or(0);
        writer.write_i32::<LittleEndian>(type_index as i32)?;
        let world = grid_to_world(feature.x, feature.z);
        writer.write_f32::<LittleEndian>(world.x)?;
        writer.write_f32::<LittleEndian>(feature.y)?;
        writer.write_f32::<LittleEndian>(world.z)?;
        writer.write_f32::<LittleEndian>(degrees_to_file_rotation(feature.rotation_y))?;
        writer.write_f32::<LittleEndian>(1.0)?;
    }
    Ok(())
}

/// Read a record table into the store, replacing its features.
///
/// Records positioned outside the map are skipped with a warning. Returns
/// the number of features inserted.
pub fn read_feature_table<R: Read>(reader: &mut R, store: &mut FeatureStore) -> MapEditResult<usize> {
    let num_types = non_negative(reader.read_i32::<LittleEndian>()?, "feature type count")?;
    let num_features = non_negative(reader.read_i32::<LittleEndian>()?, "feature count")?;

    let mut type_ids = Vec::with_capacity(reserve_hint(num_types));
    for _ in 0..num_types {
        let name = read_cstring(reader)?;
        type_ids.push(store.types_mut().register(&name));
    }

    store.clear();
    let mut skipped = 0;
    for _ in 0..num_features {
        let type_index = reader.read_i32::<LittleEndian>()?;
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;
        let rotation = reader.read_f32::<LittleEndian>()?;
        let _relative_size = reader.read_f32::<LittleEndian>()?;

        let type_id = usize::try_from(type_index)
            .ok()
            .and_then(|i| type_ids.get(i).copied())
            .ok_or_else(|| {
                MapEditError::format(format!(
                    "Feature type index {type_index} outside table of {num_types} names"
                ))
            })?;

        let (grid_x, grid_z) = world_to_grid(x, z);
        let inserted = store.insert(
            grid_x,
            y,
            grid_z,
            file_rotation_to_degrees(rotation),
            type_id,
        );
        if inserted.is_none() {
            skipped += 1;
        }
    }

    if skipped > 0 {
        warn!("Skipped {skipped} features positioned outside the map");
    }
    Ok(num_features - skipped)
}

/// Save the store to a standalone `.fmf` feature file
pub fn save_feature_file(path: &Path, store: &FeatureStore) -> MapEditResult<()> {
    write_atomically(path, |writer| write_feature_table(writer, store))?;
    info!("Saved {} features to {}", store.len(), path.display());
    Ok(())
}

/// Load a standalone `.fmf` feature file into the store
pub fn load_feature_file(path: &Path, store: &mut FeatureStore) -> MapEditResult<usize> {
    let mut reader = BufReader::new(File::open(path)?);
    let count = read_feature_table(&mut reader, store)?;
    info!("Loaded {count} features from {}", path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_feature_table_layout() {
        let mut store = FeatureStore::new(64, 64);
        let rock = store.types_mut().register("rock");
        let tree = store.types_mut().register("tree");
        store.insert(2.0, 30.0, 3.0, 90.0, tree).unwrap();
        store.insert(4.0, 10.0, 5.0, 0.0, rock).unwrap();

        let mut buf = Vec::new();
        write_feature_table(&mut buf, &store).unwrap();

        let mut cursor = Cursor::new(&buf);
        assert_eq!(cursor.read_i32::<LittleEndian>().unwrap(), 2);
        assert_eq!(cursor.read_i32::<LittleEndian>().unwrap(), 2);
        // tree was placed first, so it leads the name table
        assert_eq!(read_cstring(&mut cursor).unwrap(), "tree");
        assert_eq!(read_cstring(&mut cursor).unwrap(), "rock");
        assert_eq!(cursor.read_i32::<LittleEndian>().unwrap(), 0);
        assert_eq!(cursor.read_f32::<LittleEndian>().unwrap(), 16.0);
        assert_eq!(cursor.read_f32::<LittleEndian>().unwrap(), 30.0);
        assert_eq!(cursor.read_f32::<LittleEndian>().unwrap(), 24.0);
        assert_eq!(cursor.read_f32::<LittleEndian>().unwrap(), 65535.0 / 4.0);
        assert_eq!(cursor.read_f32::<LittleEndian>().unwrap(), 1.0);
    }

    #[test]
    fn test_feature_table_round_trip() {
        let mut store = FeatureStore::new(128, 128);
        let geovent = store.types_mut().register("geovent");
        store.insert(100.5, 12.0, 3.25, 45.0, geovent).unwrap();
        store.insert(7.0, 0.0, 90.0, 270.0, geovent).unwrap();

        let mut buf = Vec::new();
        write_feature_table(&mut buf, &store).unwrap();

        let mut loaded = FeatureStore::new(128, 128);
        let count = read_feature_table(&mut Cursor::new(buf), &mut loaded).unwrap();
        assert_eq!(count, 2);

        let features = loaded.features();
        assert_eq!(loaded.types().name(features[0].type_id), Some("geovent"));
        assert_eq!((features[0].x, features[0].z), (100.5, 3.25));
        assert!((features[0].rotation_y - 45.0).abs() < 1e-3);
        assert!((features[1].rotation_y - 270.0).abs() < 1e-3);
    }

    #[test]
    fn test_out_of_map_records_are_skipped() {
        let mut store = FeatureStore::new(256, 256);
        store.insert(200.0, 0.0, 200.0, 0.0, 0).unwrap();
        store.insert(10.0, 0.0, 10.0, 0.0, 0).unwrap();
        store.types_mut().register("tree");

        let mut buf = Vec::new();
        write_feature_table(&mut buf, &store).unwrap();

        let mut small = FeatureStore::new(64, 64);
        let count = read_feature_table(&mut Cursor::new(buf), &mut small).unwrap();
        assert_eq!(count, 1);
        assert_eq!(small.len(), 1);
    }

    #[test]
    fn test_bad_type_index_is_a_format_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&3i32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 20]);

        let mut store = FeatureStore::new(64, 64);
        assert!(matches!(
            read_feature_table(&mut Cursor::new(buf), &mut store),
            Err(MapEditError::Format { .. })
        ));
    }

    #[test]
    fn test_feature_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map_Feature.fmf");

        let mut store = FeatureStore::new(64, 64);
        let tree = store.types_mut().register("tree");
        store.insert(1.0, 2.0, 3.0, 0.0, tree).unwrap();
        save_feature_file(&path, &store).unwrap();

        let mut loaded = FeatureStore::new(64, 64);
        assert_eq!(load_feature_file(&path, &mut loaded).unwrap(), 1);
    }
}
