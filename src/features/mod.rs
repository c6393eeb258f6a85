//! Point features (trees, rocks, wrecks) and their spatial block index.
//!
//! Positions are kept in heightmap squares for `x`/`z` and world elevation
//! for `y`. The map is partitioned into `FEATURE_BLOCK_SIZE`-square blocks;
//! every feature lives in exactly the block covering its `(x, z)`.

use crate::errors::{MapEditError, MapEditResult};
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

/// Block edge in heightmap squares
pub const FEATURE_BLOCK_SIZE: usize = 32;
/// Degrees per unit of strength for the rotate brush
pub const FEATURE_ROTATE_STEP: f32 = 5.0;

pub type FeatureId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Serial number, increasing in insertion order
    pub id: FeatureId,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Degrees around the vertical axis, kept in `[0, 360)`
    pub rotation_y: f32,
    pub type_id: usize,
}

/// Wrap an angle into `[0, 360)`
pub fn normalize_rotation(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Registry of feature type names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTypes {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl FeatureTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type name, returning the existing ID when already known
    pub fn register(&mut self, name: &str) -> usize {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Spatial block index of features
#[derive(Debug, Clone)]
pub struct FeatureStore {
    /// Map extent in heightmap squares
    width: f32,
    height: f32,
    columns: usize,
    rows: usize,
    blocks: Vec<Vec<Feature>>,
    locations: HashMap<FeatureId, usize>,
    next_id: FeatureId,
    types: FeatureTypes,
}

impl FeatureStore {
    /// Create an empty store covering `width`×`height` heightmap squares
    pub fn new(width: usize, height: usize) -> Self {
        let columns = width.div_ceil(FEATURE_BLOCK_SIZE).max(1);
        let rows = height.div_ceil(FEATURE_BLOCK_SIZE).max(1);
        Self {
            width: width as f32,
            height: height as f32,
            columns,
            rows,
            blocks: vec![Vec::new(); columns * rows],
            locations: HashMap::new(),
            next_id: 0,
            types: FeatureTypes::new(),
        }
    }

    pub fn block_grid(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }

    pub fn types(&self) -> &FeatureTypes {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut FeatureTypes {
        &mut self.types
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Drop every feature; registered types are kept
    pub fn clear(&mut self) {
        self.blocks.iter_mut().for_each(Vec::clear);
        self.locations.clear();
    }

    /// Block covering `(x, z)`, or `None` outside the map
    pub fn block_for_coordinates(&self, x: f32, z: f32) -> Option<usize> {
        if !(x >= 0.0 && z >= 0.0 && x < self.width && z < self.height) {
            return None;
        }
        let column = (x as usize / FEATURE_BLOCK_SIZE).min(self.columns - 1);
        let row = (z as usize / FEATURE_BLOCK_SIZE).min(self.rows - 1);
        Some(row * self.columns + column)
    }

    pub fn block(&self, index: usize) -> &[Feature] {
        self.blocks.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Insert a feature, `None` when `(x, z)` is outside the map
    pub fn insert(&mut self, x: f32, y: f32, z: f32, rotation_y: f32, type_id: usize) -> Option<FeatureId> {
        let block = self.block_for_coordinates(x, z)?;
        let id = self.next_id;
        self.next_id += 1;
        self.blocks[block].push(Feature {
            id,
            x,
            y,
            z,
            rotation_y: normalize_rotation(rotation_y),
            type_id,
        });
        self.locations.insert(id, block);
        Some(id)
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        let block = *self.locations.get(&id)?;
        self.blocks[block].iter().find(|f| f.id == id)
    }

    fn get_mut(&mut self, id: FeatureId) -> Option<&mut Feature> {
        let block = *self.locations.get(&id)?;
        self.blocks[block].iter_mut().find(|f| f.id == id)
    }

    pub fn remove(&mut self, id: FeatureId) -> Option<Feature> {
        let block = self.locations.remove(&id)?;
        let list = &mut self.blocks[block];
        let index = list.iter().position(|f| f.id == id)?;
        Some(list.swap_remove(index))
    }

    /// Move a feature, re-bucketing it when it crosses a block boundary
    pub fn move_feature(&mut self, id: FeatureId, x: f32, y: f32, z: f32) -> MapEditResult<()> {
        let new_block = self.block_for_coordinates(x, z).ok_or_else(|| {
            MapEditError::invalid(format!("Feature position ({x}, {z}) is outside the map"))
        })?;
        let old_block = *self
            .locations
            .get(&id)
            .ok_or_else(|| MapEditError::invalid(format!("Unknown feature {id}")))?;

        if old_block == new_block {
            if let Some(feature) = self.get_mut(id) {
                feature.x = x;
                feature.y = y;
                feature.z = z;
            }
            return Ok(());
        }

        let mut feature = self
            .remove(id)
            .ok_or_else(|| MapEditError::invalid(format!("Unknown feature {id}")))?;
        feature.x = x;
        feature.y = y;
        feature.z = z;
        self.blocks[new_block].push(feature);
        self.locations.insert(id, new_block);
        Ok(())
    }

    /// Add `degrees` to a feature's rotation
    pub fn rotate(&mut self, id: FeatureId, degrees: f32) -> bool {
        match self.get_mut(id) {
            Some(feature) => {
                feature.rotation_y = normalize_rotation(feature.rotation_y + degrees);
                true
            }
            None => false,
        }
    }

    pub fn set_rotation(&mut self, id: FeatureId, degrees: f32) -> bool {
        match self.get_mut(id) {
            Some(feature) => {
                feature.rotation_y = normalize_rotation(degrees);
                true
            }
            None => false,
        }
    }

    /// IDs of features within `radius` squares of `(x, z)`, with their distance
    pub fn features_in_radius(&self, x: f32, z: f32, radius: f32) -> Vec<(FeatureId, f32)> {
        let reach = (radius / FEATURE_BLOCK_SIZE as f32).ceil() as i64 + 1;
        let centre_column = (x / FEATURE_BLOCK_SIZE as f32).floor() as i64;
        let centre_row = (z / FEATURE_BLOCK_SIZE as f32).floor() as i64;

        let mut found = Vec::new();
        for row in (centre_row - reach)..=(centre_row + reach) {
            if row < 0 || row >= self.rows as i64 {
                continue;
            }
            for column in (centre_column - reach)..=(centre_column + reach) {
                if column < 0 || column >= self.columns as i64 {
                    continue;
                }
                let block = row as usize * self.columns + column as usize;
                for feature in &self.blocks[block] {
                    let distance = ((feature.x - x).powi(2) + (feature.z - z).powi(2)).sqrt();
                    if distance <= radius {
                        found.push((feature.id, distance));
                    }
                }
            }
        }
        found
    }

    /// Remove the feature closest to `(x, z)` within `radius`
    pub fn remove_nearest(&mut self, x: f32, z: f32, radius: f32) -> Option<Feature> {
        let (id, _) = self
            .features_in_radius(x, z, radius)
            .into_iter()
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))?;
        self.remove(id)
    }

    /// Every feature in insertion order
    pub fn features(&self) -> Vec<&Feature> {
        let mut all: Vec<&Feature> = self.blocks.iter().flatten().collect();
        all.sort_by_key(|f| f.id);
        all
    }

    /// Distinct type IDs in use, ordered by the first feature using each
    pub fn used_types(&self) -> Vec<usize> {
        let mut seen = Vec::new();
        for feature in self.features() {
            if !seen.contains(&feature.type_id) {
                seen.push(feature.type_id);
            }
        }
        seen
    }

    /// Scatter `count` features of one type at random positions.
    ///
    /// Positions falling outside the map are retried, up to ten attempts per
    /// requested feature. `elevation` supplies `y` for a position.
    pub fn place_random<R: Rng>(
        &mut self,
        rng: &mut R,
        type_id: usize,
        count: usize,
        elevation: impl Fn(f32, f32) -> f32,
    ) -> Vec<FeatureId> {
        let mut placed = Vec::with_capacity(count);
        let max_attempts = count * 10;
        let mut attempts = 0;

        while placed.len() < count && attempts < max_attempts {
            attempts += 1;
            let x = rng.gen_range(0.0..=self.width);
            let z = rng.gen_range(0.0..=self.height);
            if self.block_for_coordinates(x, z).is_none() {
                continue;
            }
            let rotation = rng.gen_range(0.0..360.0);
            if let Some(id) = self.insert(x, elevation(x, z), z, rotation, type_id) {
                placed.push(id);
            }
        }

        debug!(
            "Placed {} of {} random features in {} attempts",
            placed.len(),
            count,
            attempts
        );
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_block_for_coordinates() {
        let store = FeatureStore::new(128, 64);
        assert_eq!(store.block_grid(), (4, 2));
        assert_eq!(store.block_for_coordinates(0.0, 0.0), Some(0));
        assert_eq!(store.block_for_coordinates(40.0, 0.0), Some(1));
        assert_eq!(store.block_for_coordinates(127.9, 63.9), Some(7));
        assert_eq!(store.block_for_coordinates(128.0, 0.0), None);
        assert_eq!(store.block_for_coordinates(-0.1, 0.0), None);
        assert_eq!(store.block_for_coordinates(f32::NAN, 0.0), None);
    }

    #[test]
    fn test_move_rebuckets_across_block_boundary() {
        let mut store = FeatureStore::new(128, 128);
        let tree = store.types_mut().register("tree");
        let id = store.insert(10.0, 0.0, 10.0, 0.0, tree).unwrap();
        let old_block = store.block_for_coordinates(10.0, 10.0).unwrap();

        store.move_feature(id, 70.0, 5.0, 40.0).unwrap();
        let new_block = store.block_for_coordinates(70.0, 40.0).unwrap();
        assert_ne!(old_block, new_block);

        assert!(store.block(new_block).iter().any(|f| f.id == id));
        assert!(store.block(old_block).iter().all(|f| f.id != id));
        assert_eq!(store.get(id).unwrap().y, 5.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_move_outside_map_is_rejected() {
        let mut store = FeatureStore::new(64, 64);
        let id = store.insert(1.0, 0.0, 1.0, 0.0, 0).unwrap();
        assert!(store.move_feature(id, 100.0, 0.0, 1.0).is_err());
        assert_eq!(store.get(id).unwrap().x, 1.0);
    }

    #[test]
    fn test_remove_nearest() {
        let mut store = FeatureStore::new(128, 128);
        let far = store.insert(50.0, 0.0, 50.0, 0.0, 0).unwrap();
        let near = store.insert(33.0, 0.0, 30.0, 0.0, 0).unwrap();

        let removed = store.remove_nearest(31.0, 31.0, 5.0).unwrap();
        assert_eq!(removed.id, near);
        assert!(store.remove_nearest(31.0, 31.0, 5.0).is_none());
        assert!(store.get(far).is_some());
    }

    #[test]
    fn test_rotation_wraps() {
        let mut store = FeatureStore::new(64, 64);
        let id = store.insert(1.0, 0.0, 1.0, 350.0, 0).unwrap();
        assert!(store.rotate(id, 20.0));
        assert!((store.get(id).unwrap().rotation_y - 10.0).abs() < 1e-4);
        assert!(store.rotate(id, -20.0));
        assert!((store.get(id).unwrap().rotation_y - 350.0).abs() < 1e-4);
        assert!(!store.rotate(999, 1.0));
    }

    #[test]
    fn test_used_types_follow_first_insertion() {
        let mut store = FeatureStore::new(128, 128);
        let rock = store.types_mut().register("rock");
        let tree = store.types_mut().register("tree");
        let wreck = store.types_mut().register("wreck");
        assert_eq!(store.types_mut().register("rock"), rock);

        store.insert(100.0, 0.0, 100.0, 0.0, tree);
        store.insert(1.0, 0.0, 1.0, 0.0, wreck);
        store.insert(2.0, 0.0, 2.0, 0.0, tree);
        // rock registered but unused
        assert_eq!(store.used_types(), vec![tree, wreck]);
    }

    #[test]
    fn test_place_random_stays_inside_map() {
        let mut store = FeatureStore::new(64, 32);
        let mut rng = Pcg64::seed_from_u64(7);
        let placed = store.place_random(&mut rng, 0, 25, |_, _| 12.0);
        assert_eq!(placed.len(), 25);
        for feature in store.features() {
            assert!(feature.x < 64.0 && feature.z < 32.0);
            assert_eq!(feature.y, 12.0);
        }
    }
}
