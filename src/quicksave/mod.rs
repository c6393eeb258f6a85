//! In-memory quicksave: one snapshot of selected map layers, optionally
//! deflate compressed, held in a block-allocated byte buffer.

use crate::errors::{MapEditError, MapEditResult};
use crate::features::FeatureStore;
use crate::map::{MapDimensions, MapLayer, SpringMap};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::{self, Read, Write};
use tracing::{debug, info};

/// Size of one buffer block
pub const BLOCK_SIZE: usize = 10 * 1024 * 1024;

/// Raster layers in the order they are written to a snapshot
const RASTER_ORDER: [MapLayer; 5] = [
    MapLayer::Height,
    MapLayer::Texture,
    MapLayer::Metal,
    MapLayer::Type,
    MapLayer::Vegetation,
];

/// Append-only byte buffer grown in fixed-size blocks.
///
/// Blocks are kept across `reset` so repeated snapshots of the same map
/// don't reallocate.
#[derive(Debug)]
pub struct BlockBuffer {
    blocks: Vec<Box<[u8]>>,
    block_size: usize,
    len: usize,
}

impl Default for BlockBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBuffer {
    pub fn new() -> Self {
        Self::with_block_size(BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            block_size: block_size.max(1),
            len: 0,
        }
    }

    /// Rewind the write cursor, keeping allocated blocks
    pub fn reset(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Read view over the written bytes
    pub fn reader(&self) -> BlockReader<'_> {
        BlockReader {
            buffer: self,
            position: 0,
        }
    }
}

impl Write for BlockBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let block = self.len / self.block_size;
            let offset = self.len % self.block_size;
            if block == self.blocks.len() {
                self.blocks.push(vec![0u8; self.block_size].into_boxed_slice());
            }
            let count = (self.block_size - offset).min(buf.len() - written);
            self.blocks[block][offset..offset + count].copy_from_slice(&buf[written..written + count]);
            written += count;
            self.len += count;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reads straight out of the buffer's blocks without copying them first
pub struct BlockReader<'a> {
    buffer: &'a BlockBuffer,
    position: usize,
}

impl Read for BlockReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.buffer.len - self.position;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let block_size = self.buffer.block_size;
        let block = self.position / block_size;
        let offset = self.position % block_size;
        let count = (block_size - offset).min(remaining).min(buf.len());
        buf[..count].copy_from_slice(&self.buffer.blocks[block][offset..offset + count]);
        self.position += count;
        Ok(count)
    }
}

#[derive(Debug)]
struct Snapshot {
    layers: Vec<MapLayer>,
    compressed: bool,
    dimensions: MapDimensions,
    features: Option<FeatureStore>,
}

/// Holder of at most one snapshot
#[derive(Debug, Default)]
pub struct QuickSave {
    buffer: BlockBuffer,
    snapshot: Option<Snapshot>,
}

impl QuickSave {
    pub fn new() -> Self {
        Self::default()
    }

    /// A quicksave whose buffer grows in `block_size` blocks
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            buffer: BlockBuffer::with_block_size(block_size),
            snapshot: None,
        }
    }

    /// Drop the current snapshot and rewind the buffer
    pub fn prepare(&mut self) {
        self.buffer.reset();
        self.snapshot = None;
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Bytes held by the current snapshot
    pub fn stored_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Replace the snapshot with a copy of `layers` of `map`
    pub fn snapshot(&mut self, map: &SpringMap, layers: &[MapLayer], compress: bool) -> MapEditResult<()> {
        self.prepare();
        let included: Vec<MapLayer> = RASTER_ORDER.into_iter().filter(|l| layers.contains(l)).collect();

        if compress {
            let mut encoder = DeflateEncoder::new(&mut self.buffer, Compression::fast());
            write_layers(&mut encoder, map, &included)?;
            encoder.finish()?;
        } else {
            write_layers(&mut self.buffer, map, &included)?;
        }

        let features = layers
            .contains(&MapLayer::Features)
            .then(|| map.features().clone());
        info!(
            "Quicksaved {} layers ({} bytes in {} blocks{})",
            included.len() + usize::from(features.is_some()),
            self.buffer.len(),
            self.buffer.block_count(),
            if compress { ", compressed" } else { "" }
        );
        self.snapshot = Some(Snapshot {
            layers: included,
            compressed: compress,
            dimensions: map.dimensions(),
            features,
        });
        Ok(())
    }

    /// Copy the snapshot back into `map`. Layers not in the snapshot are
    /// left as they are, and on error the map is not modified.
    pub fn restore(&self, map: &mut SpringMap) -> MapEditResult<()> {
        let snapshot = self.snapshot.as_ref().ok_or(MapEditError::NoSnapshotAvailable)?;
        if snapshot.dimensions != map.dimensions() {
            return Err(MapEditError::DimensionMismatch {
                reason: format!(
                    "Snapshot is {}x{} but the map is now {}x{}",
                    snapshot.dimensions.width,
                    snapshot.dimensions.height,
                    map.dimensions().width,
                    map.dimensions().height
                ),
            });
        }

        let mut reader = self.buffer.reader();
        let decoded = if snapshot.compressed {
            read_layers(&mut DeflateDecoder::new(reader), map, &snapshot.layers)?
        } else {
            read_layers(&mut reader, map, &snapshot.layers)?
        };
        for (layer, bytes) in decoded {
            if let Some(target) = layer_bytes_mut(map, layer) {
                target.copy_from_slice(&bytes);
            }
        }
        if let Some(features) = &snapshot.features {
            *map.features_mut() = features.clone();
        }
        debug!("Restored quicksave of {} raster layers", snapshot.layers.len());
        Ok(())
    }
}

fn layer_bytes(map: &SpringMap, layer: MapLayer) -> Option<&[u8]> {
    match layer {
        MapLayer::Height => Some(map.heightmap().as_bytes()),
        MapLayer::Texture => Some(map.texture().as_bytes()),
        MapLayer::Metal => Some(map.metalmap().as_bytes()),
        MapLayer::Type => Some(map.typemap().as_bytes()),
        MapLayer::Vegetation => Some(map.vegetation().as_bytes()),
        MapLayer::Features => None,
    }
}

fn layer_bytes_mut(map: &mut SpringMap, layer: MapLayer) -> Option<&mut [u8]> {
    match layer {
        MapLayer::Height => Some(map.heightmap_mut().as_bytes_mut()),
        MapLayer::Texture => Some(map.texture_mut().as_bytes_mut()),
        MapLayer::Metal => Some(map.metalmap_mut().as_bytes_mut()),
        MapLayer::Type => Some(map.typemap_mut().as_bytes_mut()),
        MapLayer::Vegetation => Some(map.vegetation_mut().as_bytes_mut()),
        MapLayer::Features => None,
    }
}

fn write_layers<W: Write>(writer: &mut W, map: &SpringMap, layers: &[MapLayer]) -> io::Result<()> {
    for &layer in layers {
        if let Some(bytes) = layer_bytes(map, layer) {
            writer.write_all(bytes)?;
        }
    }
    Ok(())
}

/// Decode every layer into scratch buffers sized from `map`
fn read_layers<R: Read>(reader: &mut R, map: &SpringMap, layers: &[MapLayer]) -> io::Result<Vec<(MapLayer, Vec<u8>)>> {
    let mut decoded = Vec::with_capacity(layers.len());
    for &layer in layers {
        let Some(current) = layer_bytes(map, layer) else {
            continue;
        };
        let mut bytes = vec![0u8; current.len()];
        reader.read_exact(&mut bytes)?;
        decoded.push((layer, bytes));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [MapLayer; 6] = [
        MapLayer::Height,
        MapLayer::Texture,
        MapLayer::Metal,
        MapLayer::Type,
        MapLayer::Vegetation,
        MapLayer::Features,
    ];

    fn painted_map() -> SpringMap {
        let mut map = SpringMap::new(1, 1).unwrap();
        for (i, h) in map.heightmap_mut().data_mut().iter_mut().enumerate() {
            *h = (i % 97) as f32 / 96.0;
        }
        map.texture_mut().set(5, 7, [10, 20, 30]);
        map.metalmap_mut().set(1, 2, 200);
        map.typemap_mut().set(3, 4, 9);
        map.vegetation_mut().set(0, 0, 1);
        map.features_mut().insert(10.0, 0.0, 12.0, 45.0, 0);
        map
    }

    fn assert_same(a: &SpringMap, b: &SpringMap) {
        assert_eq!(a.heightmap(), b.heightmap());
        assert_eq!(a.texture(), b.texture());
        assert_eq!(a.metalmap(), b.metalmap());
        assert_eq!(a.typemap(), b.typemap());
        assert_eq!(a.vegetation(), b.vegetation());
        assert_eq!(a.features().features(), b.features().features());
    }

    fn scribble(map: &mut SpringMap) {
        map.heightmap_mut().fill(0.25);
        map.texture_mut().fill([1, 1, 1]);
        map.metalmap_mut().fill(3);
        map.typemap_mut().fill(4);
        map.vegetation_mut().fill(0);
        map.features_mut().clear();
    }

    #[test]
    fn test_block_buffer_spans_blocks() {
        let mut buffer = BlockBuffer::with_block_size(4);
        buffer.write_all(b"hello quicksave").unwrap();
        assert_eq!(buffer.len(), 15);
        assert_eq!(buffer.block_count(), 4);

        let mut out = Vec::new();
        buffer.reader().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello quicksave");

        buffer.reset();
        assert!(buffer.is_empty());
        buffer.write_all(b"ab").unwrap();
        assert_eq!(buffer.block_count(), 4);
        let mut out = Vec::new();
        buffer.reader().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"ab");
    }

    #[test]
    fn test_restore_is_idempotent_uncompressed() {
        let original = painted_map();
        let mut map = original.clone();
        let mut quicksave = QuickSave::with_block_size(64 * 1024);
        quicksave.snapshot(&map, &ALL, false).unwrap();

        scribble(&mut map);
        quicksave.restore(&mut map).unwrap();
        assert_same(&map, &original);

        scribble(&mut map);
        quicksave.restore(&mut map).unwrap();
        assert_same(&map, &original);
    }

    #[test]
    fn test_restore_is_idempotent_compressed() {
        let original = painted_map();
        let mut map = original.clone();
        let mut quicksave = QuickSave::new();
        quicksave.snapshot(&map, &ALL, true).unwrap();
        // Mostly flat layers compress well below their raw size
        let raw = map.heightmap().as_bytes().len() + map.texture().as_bytes().len();
        assert!(quicksave.stored_bytes() < raw);

        scribble(&mut map);
        quicksave.restore(&mut map).unwrap();
        assert_same(&map, &original);
    }

    #[test]
    fn test_excluded_layers_untouched() {
        let mut map = painted_map();
        let mut quicksave = QuickSave::new();
        quicksave.snapshot(&map, &[MapLayer::Metal, MapLayer::Height], true).unwrap();

        scribble(&mut map);
        let texture = map.texture().clone();
        quicksave.restore(&mut map).unwrap();

        assert_eq!(map.metalmap().at(1, 2), 200);
        assert_eq!(map.heightmap(), painted_map().heightmap());
        assert_eq!(map.texture(), &texture);
        assert_eq!(map.typemap().at(3, 4), 4);
        assert!(map.features().is_empty());
    }

    #[test]
    fn test_failed_restore_leaves_map_untouched() {
        let mut map = painted_map();
        let mut quicksave = QuickSave::with_block_size(64 * 1024);
        quicksave.snapshot(&map, &ALL, false).unwrap();

        // Cut the stream partway through the texture layer
        quicksave.buffer.len = map.heightmap().as_bytes().len() + 10;
        scribble(&mut map);
        let scribbled = map.clone();

        assert!(quicksave.restore(&mut map).is_err());
        assert_same(&map, &scribbled);
    }

    #[test]
    fn test_restore_without_snapshot() {
        let mut map = SpringMap::new(1, 1).unwrap();
        let mut quicksave = QuickSave::new();
        assert!(matches!(quicksave.restore(&mut map), Err(MapEditError::NoSnapshotAvailable)));

        quicksave.snapshot(&map, &[MapLayer::Height], false).unwrap();
        quicksave.prepare();
        assert!(!quicksave.has_snapshot());
        assert!(matches!(quicksave.restore(&mut map), Err(MapEditError::NoSnapshotAvailable)));
    }

    #[test]
    fn test_restore_after_resize() {
        let mut map = SpringMap::new(1, 1).unwrap();
        let mut quicksave = QuickSave::new();
        quicksave.snapshot(&map, &[MapLayer::Height], false).unwrap();
        map.recreate(2, 1).unwrap();
        assert!(matches!(
            quicksave.restore(&mut map),
            Err(MapEditError::DimensionMismatch { .. })
        ));
    }
}
