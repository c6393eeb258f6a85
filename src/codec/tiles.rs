//! Tile deduplication and the `.smt` tile file.
//!
//! The texture is cut into `TILE_SIZE`² tiles in row-major order. Each tile
//! is compressed and checksummed; tiles whose compressed bytes are identical
//! share one ID and are stored once. Checksums only pick the candidates, the
//! final decision is always a byte comparison.

use crate::codec::binary::{FixupWriter, expect_i32, expect_magic, non_negative, write_atomically};
use crate::codec::compressor::{TILE_SIZE, TileCompressor};
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::{Raster, Rgb};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek, Write};
use std::path::Path;
use tracing::{debug, info};

pub const TILE_FILE_MAGIC: &[u8; 16] = b"spring tilefile\0";
pub const TILE_FILE_VERSION: i32 = 1;
pub const TILE_COMPRESSION_DXT1: i32 = 1;

/// A tile position registered under a checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBucket {
    pub position: usize,
    pub tile_id: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    pub positions: usize,
    pub distinct_tiles: usize,
    /// Equal checksums whose bytes differed
    pub checksum_collisions: usize,
}

/// Content-addressed tile table
#[derive(Debug)]
pub struct TileDeduplicator {
    buckets: HashMap<u32, Vec<TileBucket>>,
    arena: Vec<u8>,
    tile_size: usize,
    stats: DedupStats,
}

impl TileDeduplicator {
    pub fn new(tile_size: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            arena: Vec::new(),
            tile_size,
            stats: DedupStats::default(),
        }
    }

    /// Register the compressed tile at `position`.
    ///
    /// Returns its ID and whether the tile is new.
    pub fn insert(&mut self, position: usize, compressed: &[u8]) -> MapEditResult<(u32, bool)> {
        self.insert_with_checksum(crc32fast::hash(compressed), position, compressed)
    }

    pub(crate) fn insert_with_checksum(
        &mut self,
        checksum: u32,
        position: usize,
        compressed: &[u8],
    ) -> MapEditResult<(u32, bool)> {
        if compressed.len() != self.tile_size {
            return Err(MapEditError::invalid(format!(
                "Compressed tile of {} bytes, expected {}",
                compressed.len(),
                self.tile_size
            )));
        }
        self.stats.positions += 1;

        let bucket_list = self.buckets.entry(checksum).or_default();
        for bucket in bucket_list.iter() {
            let start = bucket.tile_id as usize * self.tile_size;
            if self.arena[start..start + self.tile_size] == *compressed {
                return Ok((bucket.tile_id, false));
            }
        }
        if !bucket_list.is_empty() {
            self.stats.checksum_collisions += 1;
        }

        let tile_id = self.stats.distinct_tiles as u32;
        bucket_list.push(TileBucket { position, tile_id });
        self.arena.extend_from_slice(compressed);
        self.stats.distinct_tiles += 1;
        Ok((tile_id, true))
    }

    /// Compressed bytes of a distinct tile
    pub fn tile(&self, tile_id: u32) -> Option<&[u8]> {
        let start = tile_id as usize * self.tile_size;
        self.arena.get(start..start + self.tile_size)
    }

    pub fn tile_count(&self) -> usize {
        self.stats.distinct_tiles
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }
}

/// Per-position tile IDs covering a texture
#[derive(Debug, Clone, PartialEq)]
pub struct TileIndex {
    pub ids: Raster<u32>,
    pub tile_count: usize,
}

impl TileIndex {
    /// Group positions by tile ID, rejecting IDs past `tile_count`.
    ///
    /// The result stops at the highest ID in use, so a file-supplied tile
    /// count never sizes the allocation.
    pub fn positions_by_id(&self) -> MapEditResult<Vec<Vec<usize>>> {
        let used = self.ids.data().iter().map(|&id| id as usize + 1).max().unwrap_or(0);
        let mut positions = vec![Vec::new(); used.min(self.tile_count)];
        for (position, &id) in self.ids.data().iter().enumerate() {
            positions
                .get_mut(id as usize)
                .ok_or_else(|| {
                    MapEditError::format(format!(
                        "Tile index references tile {id}, only {} tiles exist",
                        self.tile_count
                    ))
                })?
                .push(position);
        }
        Ok(positions)
    }
}

fn tile_grid(texture: &Raster<Rgb>) -> MapEditResult<(usize, usize)> {
    let (width, height) = texture.dimensions();
    if width % TILE_SIZE != 0 || height % TILE_SIZE != 0 {
        return Err(MapEditError::DimensionMismatch {
            reason: format!("Texture {width}x{height} is not a whole number of {TILE_SIZE}-texel tiles"),
        });
    }
    Ok((width / TILE_SIZE, height / TILE_SIZE))
}

/// Compress and deduplicate every tile of a texture.
///
/// `emit` receives the bytes of each distinct tile once, in ID order.
pub fn dedupe_texture(
    texture: &Raster<Rgb>,
    compressor: &mut dyn TileCompressor,
    mut emit: impl FnMut(&[u8]) -> MapEditResult<()>,
) -> MapEditResult<(TileIndex, DedupStats)> {
    let (columns, rows) = tile_grid(texture)?;
    let mut dedup = TileDeduplicator::new(compressor.compressed_tile_size());
    let mut ids = Raster::new(columns, rows, 0u32);

    compressor.init()?;
    let result = (|| -> MapEditResult<()> {
        for row in 0..rows {
            for column in 0..columns {
                let compressed =
                    compressor.compress_tile(texture, column * TILE_SIZE, row * TILE_SIZE)?;
                let (tile_id, is_new) = dedup.insert(row * columns + column, &compressed)?;
                if is_new {
                    emit(&compressed)?;
                }
                ids.set(column, row, tile_id);
            }
        }
        Ok(())
    })();
    compressor.clean();
    result?;

    let stats = dedup.stats();
    info!(
        "Deduplicated {} tile positions into {} distinct tiles ({} checksum collisions)",
        stats.positions, stats.distinct_tiles, stats.checksum_collisions
    );
    Ok((
        TileIndex {
            ids,
            tile_count: stats.distinct_tiles,
        },
        stats,
    ))
}

/// Write a complete tile file for a texture and return its tile index
pub fn write_tile_file<W: Write + Seek>(
    writer: W,
    texture: &Raster<Rgb>,
    compressor: &mut dyn TileCompressor,
) -> MapEditResult<TileIndex> {
    let mut out = FixupWriter::new(writer)?;
    out.write_all(TILE_FILE_MAGIC)?;
    out.write_i32::<LittleEndian>(TILE_FILE_VERSION)?;
    let num_tiles = out.placeholder("numTiles")?;
    out.write_i32::<LittleEndian>(TILE_SIZE as i32)?;
    out.write_i32::<LittleEndian>(TILE_COMPRESSION_DXT1)?;

    let (index, _) = dedupe_texture(texture, compressor, |tile| Ok(out.write_all(tile)?))?;

    out.resolve(num_tiles, index.tile_count as i32);
    out.finish()?;
    Ok(index)
}

/// Save a texture's tiles to `path`, replacing any previous file
pub fn save_tile_file(
    path: &Path,
    texture: &Raster<Rgb>,
    compressor: &mut dyn TileCompressor,
) -> MapEditResult<TileIndex> {
    if path.exists() {
        debug!("Removing previous tile file {}", path.display());
        fs::remove_file(path)?;
    }
    write_atomically(path, |writer| write_tile_file(writer, texture, compressor))
}

/// Read a tile file header and return the number of tiles it holds
pub fn read_tile_file_header<R: Read>(reader: &mut R) -> MapEditResult<usize> {
    expect_magic(reader, TILE_FILE_MAGIC, "tile file")?;
    expect_i32(reader.read_i32::<LittleEndian>()?, TILE_FILE_VERSION, "tile file version")?;
    let num_tiles = non_negative(reader.read_i32::<LittleEndian>()?, "tile count")?;
    expect_i32(reader.read_i32::<LittleEndian>()?, TILE_SIZE as i32, "tile size")?;
    expect_i32(
        reader.read_i32::<LittleEndian>()?,
        TILE_COMPRESSION_DXT1,
        "tile compression type",
    )?;
    Ok(num_tiles)
}

/// Paint a run of consecutive tiles from a tile reader onto a texture.
///
/// `positions[i]` lists the tile positions using the `i`-th tile read. Every
/// tile is read and decompressed exactly once.
pub fn paint_tiles<R: Read>(
    texture: &mut Raster<Rgb>,
    positions: &[Vec<usize>],
    reader: &mut R,
    compressor: &dyn TileCompressor,
) -> MapEditResult<()> {
    let (columns, _) = tile_grid(texture)?;
    let mut compressed = vec![0u8; compressor.compressed_tile_size()];

    for targets in positions {
        reader.read_exact(&mut compressed)?;
        if targets.is_empty() {
            continue;
        }
        let tile = compressor.decompress_tile(&compressed)?;
        for &position in targets {
            let x = (position % columns) * TILE_SIZE;
            let y = (position / columns) * TILE_SIZE;
            for row in 0..TILE_SIZE {
                let target = texture.row_mut(y + row);
                target[x..x + TILE_SIZE].copy_from_slice(tile.row(row));
            }
        }
    }
    Ok(())
}

/// Rebuild a texture from a single tile file
pub fn load_tile_file<R: Read>(
    reader: &mut R,
    texture: &mut Raster<Rgb>,
    index: &TileIndex,
    compressor: &dyn TileCompressor,
) -> MapEditResult<()> {
    let num_tiles = read_tile_file_header(reader)?;
    if num_tiles < index.tile_count {
        return Err(MapEditError::format(format!(
            "Tile file holds {num_tiles} tiles, index needs {}",
            index.tile_count
        )));
    }
    let positions = index.positions_by_id()?;
    paint_tiles(texture, &positions, reader, compressor)
}
