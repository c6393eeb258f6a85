//! Caches of brush assets and their scaled copies.

use crate::codec::bitmap::load_bitmap;
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::{Lerp, Raster, Rgb};
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;

/// Handle of a loaded brush asset
pub type BrushSlot = usize;

/// Owns loaded brush rasters and a bounded LRU of resampled copies.
///
/// The default LRU capacity of 1 keeps only the most recently used scaled
/// copy, dropping the previous one as soon as another size is requested.
#[derive(Debug, Clone)]
pub struct BrushDataManager<T> {
    sources: Vec<Option<Raster<T>>>,
    scaled: VecDeque<ScaledEntry<T>>,
    capacity: usize,
}

#[derive(Debug, Clone)]
struct ScaledEntry<T> {
    slot: BrushSlot,
    width: usize,
    height: usize,
    raster: Raster<T>,
}

impl<T: Lerp> Default for BrushDataManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Lerp> BrushDataManager<T> {
    pub fn new() -> Self {
        Self::with_capacity(1)
    }

    /// A manager keeping up to `capacity` scaled copies
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sources: Vec::new(),
            scaled: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a raster and return its slot
    pub fn add(&mut self, raster: Raster<T>) -> MapEditResult<BrushSlot> {
        if raster.is_empty() {
            return Err(MapEditError::invalid("Brush assets need at least one pixel"));
        }
        self.sources.push(Some(raster));
        Ok(self.sources.len() - 1)
    }

    pub fn get(&self, slot: BrushSlot) -> Option<&Raster<T>> {
        self.sources.get(slot).and_then(Option::as_ref)
    }

    /// Number of loaded assets
    pub fn len(&self) -> usize {
        self.sources.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of scaled copies currently cached
    pub fn cached(&self) -> usize {
        self.scaled.len()
    }

    /// The asset in `slot` resampled to `width`×`height`
    pub fn scaled(&mut self, slot: BrushSlot, width: usize, height: usize) -> MapEditResult<&Raster<T>> {
        if let Some(position) = self
            .scaled
            .iter()
            .position(|e| e.slot == slot && e.width == width && e.height == height)
        {
            if position != 0 {
                if let Some(entry) = self.scaled.remove(position) {
                    self.scaled.push_front(entry);
                }
            }
        } else {
            let source = self
                .get(slot)
                .ok_or_else(|| MapEditError::invalid(format!("Brush slot {slot} is not loaded")))?;
            let raster = source.resample_bilinear(width, height);
            self.scaled.push_front(ScaledEntry {
                slot,
                width,
                height,
                raster,
            });
            while self.scaled.len() > self.capacity {
                if let Some(evicted) = self.scaled.pop_back() {
                    debug!(
                        "Evicted scaled brush {} at {}x{}",
                        evicted.slot, evicted.width, evicted.height
                    );
                }
            }
        }
        self.scaled
            .front()
            .map(|entry| &entry.raster)
            .ok_or_else(|| MapEditError::invalid("Brush cache is empty"))
    }

    /// Drop an asset and every scaled copy of it
    pub fn unload(&mut self, slot: BrushSlot) -> bool {
        self.scaled.retain(|e| e.slot != slot);
        match self.sources.get_mut(slot) {
            Some(source) => source.take().is_some(),
            None => false,
        }
    }

    /// Drop every scaled copy, keeping the assets
    pub fn clear_cache(&mut self) {
        self.scaled.clear();
    }
}

impl BrushDataManager<f32> {
    /// Load a grayscale bitmap as a weight pattern
    pub fn load_pattern(&mut self, path: &Path) -> MapEditResult<BrushSlot> {
        let pattern = load_bitmap(path)?.to_intensity();
        debug!("Loaded brush pattern {}", path.display());
        self.add(pattern)
    }
}

impl BrushDataManager<Rgb> {
    /// Load a colour bitmap as a brush texture
    pub fn load_texture(&mut self, path: &Path) -> MapEditResult<BrushSlot> {
        let texture = load_bitmap(path)?.pixels;
        debug!("Loaded brush texture {}", path.display());
        self.add(texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_copies_are_bilinear() {
        let mut manager = BrushDataManager::new();
        let slot = manager.add(Raster::from_vec(2, 1, vec![0.0f32, 1.0]).unwrap()).unwrap();
        let scaled = manager.scaled(slot, 3, 1).unwrap();
        assert_eq!(scaled.data(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_default_capacity_evicts_previous() {
        let mut manager = BrushDataManager::new();
        let slot = manager.add(Raster::new(4, 4, 1.0f32)).unwrap();
        manager.scaled(slot, 8, 8).unwrap();
        manager.scaled(slot, 16, 16).unwrap();
        assert_eq!(manager.cached(), 1);
        assert_eq!(manager.scaled(slot, 16, 16).unwrap().dimensions(), (16, 16));
    }

    #[test]
    fn test_lru_keeps_most_recent() {
        let mut manager = BrushDataManager::with_capacity(2);
        let slot = manager.add(Raster::new(4, 4, 1.0f32)).unwrap();
        manager.scaled(slot, 8, 8).unwrap();
        manager.scaled(slot, 16, 16).unwrap();
        // Touch 8x8 so 16x16 becomes the oldest
        manager.scaled(slot, 8, 8).unwrap();
        manager.scaled(slot, 32, 32).unwrap();
        assert_eq!(manager.cached(), 2);
        let sizes: Vec<usize> = manager.scaled.iter().map(|e| e.width).collect();
        assert_eq!(sizes, vec![32, 8]);
    }

    #[test]
    fn test_unload_drops_asset_and_copies() {
        let mut manager = BrushDataManager::new();
        let first = manager.add(Raster::new(2, 2, [1u8, 2, 3])).unwrap();
        let second = manager.add(Raster::new(2, 2, [4u8, 5, 6])).unwrap();
        manager.scaled(first, 4, 4).unwrap();

        assert!(manager.unload(first));
        assert!(!manager.unload(first));
        assert_eq!(manager.cached(), 0);
        assert_eq!(manager.len(), 1);
        assert!(manager.scaled(first, 4, 4).is_err());
        // Slots are stable after an unload
        assert_eq!(manager.get(second).unwrap().at(0, 0), [4, 5, 6]);
    }

    #[test]
    fn test_empty_asset_rejected() {
        let mut manager: BrushDataManager<f32> = BrushDataManager::new();
        assert!(manager.add(Raster::new(0, 3, 0.0)).is_err());
    }
}
