//! Texel block compression for map tiles and the minimap.
//!
//! The tiled map codec treats compression as a collaborator behind
//! [`TileCompressor`]. [`Dxt1Compressor`] is the software encoder that
//! produces what the engine expects: DXT1 tiles of 32×32 texels with mips
//! down to 4×4, and a 1024×1024 minimap with nine mip levels.
//!
//! DXT1 packs each 4×4 block into 8 bytes:
//! - 2 bytes: color0 (RGB565)
//! - 2 bytes: color1 (RGB565)
//! - 4 bytes: sixteen 2-bit palette indices

use crate::errors::{MapEditError, MapEditResult};
use crate::raster::{Raster, Rgb};

/// Texels per tile edge
pub const TILE_SIZE: usize = 32;
/// DXT1 tile with mips 32, 16, 8, 4
pub const COMPRESSED_TILE_SIZE: usize = 680;
/// Minimap edge in texels
pub const MINIMAP_SIZE: usize = 1024;
pub const MINIMAP_MIP_LEVELS: usize = 9;
/// DXT1 minimap with mips 1024 down to 4
pub const COMPRESSED_MINIMAP_SIZE: usize = 699_048;

const BLOCK_BYTES: usize = 8;

/// Compresses and decompresses fixed-size texel blocks
pub trait TileCompressor {
    /// Prepare for a batch of tiles
    fn init(&mut self) -> MapEditResult<()> {
        Ok(())
    }

    /// Release anything held for the batch
    fn clean(&mut self) {}

    /// Bytes per compressed tile; every tile has the same size
    fn compressed_tile_size(&self) -> usize;

    /// Compress the `TILE_SIZE`² tile whose top-left texel is `(x, y)`
    fn compress_tile(&mut self, texture: &Raster<Rgb>, x: usize, y: usize) -> MapEditResult<Vec<u8>>;

    /// Decompress one tile into a `TILE_SIZE`² raster
    fn decompress_tile(&self, compressed: &[u8]) -> MapEditResult<Raster<Rgb>>;

    /// Build the compressed minimap for a whole texture
    fn compressed_minimap(&mut self, texture: &Raster<Rgb>) -> MapEditResult<Vec<u8>>;
}

/// Convert RGB888 to packed RGB565
pub fn rgb888_to_rgb565([r, g, b]: Rgb) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Expand RGB565 to RGB888, replicating high bits into the low ones
pub fn rgb565_to_rgb888(color: u16) -> Rgb {
    let r5 = (color >> 11) & 0x1F;
    let g6 = (color >> 5) & 0x3F;
    let b5 = color & 0x1F;
    [
        ((r5 << 3) | (r5 >> 2)) as u8,
        ((g6 << 2) | (g6 >> 4)) as u8,
        ((b5 << 3) | (b5 >> 2)) as u8,
    ]
}

/// Perceptually weighted squared distance (R=3, G=6, B=1)
fn color_distance_squared(a: Rgb, b: Rgb) -> u32 {
    let dr = (a[0] as i32 - b[0] as i32) * 3;
    let dg = (a[1] as i32 - b[1] as i32) * 6;
    let db = a[2] as i32 - b[2] as i32;
    (dr * dr + dg * dg + db * db) as u32
}

fn block_palette(c0: u16, c1: u16) -> [Rgb; 4] {
    let a = rgb565_to_rgb888(c0);
    let b = rgb565_to_rgb888(c1);
    let mix = |wa: u16, wb: u16, d: u16| -> Rgb {
        [
            ((wa * a[0] as u16 + wb * b[0] as u16) / d) as u8,
            ((wa * a[1] as u16 + wb * b[1] as u16) / d) as u8,
            ((wa * a[2] as u16 + wb * b[2] as u16) / d) as u8,
        ]
    };
    if c0 > c1 {
        [a, b, mix(2, 1, 3), mix(1, 2, 3)]
    } else {
        [a, b, mix(1, 1, 2), [0, 0, 0]]
    }
}

/// Compress sixteen row-major texels into one DXT1 block
pub fn compress_block(pixels: &[Rgb; 16]) -> [u8; 8] {
    let mut min = [255u8; 3];
    let mut max = [0u8; 3];
    for pixel in pixels {
        for c in 0..3 {
            min[c] = min[c].min(pixel[c]);
            max[c] = max[c].max(pixel[c]);
        }
    }

    // Four-colour mode needs color0 > color1
    let (c0, c1) = {
        let hi = rgb888_to_rgb565(max);
        let lo = rgb888_to_rgb565(min);
        if hi >= lo { (hi, lo) } else { (lo, hi) }
    };

    let palette = block_palette(c0, c1);
    let mut indices = 0u32;
    if c0 != c1 {
        for (i, &pixel) in pixels.iter().enumerate() {
            let best = (0..4)
                .min_by_key(|&idx| color_distance_squared(pixel, palette[idx]))
                .unwrap_or(0);
            indices |= (best as u32) << (i * 2);
        }
    }

    let mut block = [0u8; 8];
    block[0..2].copy_from_slice(&c0.to_le_bytes());
    block[2..4].copy_from_slice(&c1.to_le_bytes());
    block[4..8].copy_from_slice(&indices.to_le_bytes());
    block
}

/// Decode one DXT1 block into sixteen row-major texels
pub fn decompress_block(block: &[u8]) -> [Rgb; 16] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let palette = block_palette(c0, c1);

    let mut pixels = [[0u8; 3]; 16];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = palette[((indices >> (i * 2)) & 0b11) as usize];
    }
    pixels
}

/// Box-filter a raster down to half size
fn downsample_box_2x(source: &Raster<Rgb>) -> Raster<Rgb> {
    let width = (source.width() / 2).max(1);
    let height = (source.height() / 2).max(1);
    let mut output = Raster::new(width, height, [0u8; 3]);

    for y in 0..height {
        for x in 0..width {
            let samples = [
                source.at_clamped(2 * x as i64, 2 * y as i64),
                source.at_clamped(2 * x as i64 + 1, 2 * y as i64),
                source.at_clamped(2 * x as i64, 2 * y as i64 + 1),
                source.at_clamped(2 * x as i64 + 1, 2 * y as i64 + 1),
            ];
            let mut avg = [0u8; 3];
            for (c, out) in avg.iter_mut().enumerate() {
                *out = (samples.iter().map(|s| s[c] as u16).sum::<u16>() / 4) as u8;
            }
            output.set(x, y, avg);
        }
    }
    output
}

/// Compress one mip level, appending blocks in row-major order
fn compress_level(level: &Raster<Rgb>, out: &mut Vec<u8>) {
    for by in (0..level.height()).step_by(4) {
        for bx in (0..level.width()).step_by(4) {
            let mut pixels = [[0u8; 3]; 16];
            for (i, pixel) in pixels.iter_mut().enumerate() {
                *pixel = level.at_clamped((bx + i % 4) as i64, (by + i / 4) as i64);
            }
            out.extend_from_slice(&compress_block(&pixels));
        }
    }
}

/// Compress a square raster and its box-filtered mips down to 4×4
fn compress_with_mips(base: Raster<Rgb>, levels: usize, out: &mut Vec<u8>) {
    let mut level = base;
    for i in 0..levels {
        compress_level(&level, out);
        if i + 1 < levels {
            level = downsample_box_2x(&level);
        }
    }
}

fn mip_levels_to_4(size: usize) -> usize {
    (size.max(4) / 4).trailing_zeros() as usize + 1
}

/// Software DXT1 encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct Dxt1Compressor;

impl TileCompressor for Dxt1Compressor {
    fn compressed_tile_size(&self) -> usize {
        COMPRESSED_TILE_SIZE
    }

    fn compress_tile(&mut self, texture: &Raster<Rgb>, x: usize, y: usize) -> MapEditResult<Vec<u8>> {
        let tile = extract_tile(texture, x, y)?;
        let mut out = Vec::with_capacity(COMPRESSED_TILE_SIZE);
        compress_with_mips(tile, mip_levels_to_4(TILE_SIZE), &mut out);
        Ok(out)
    }

    fn decompress_tile(&self, compressed: &[u8]) -> MapEditResult<Raster<Rgb>> {
        let blocks_per_row = TILE_SIZE / 4;
        let top_level = blocks_per_row * blocks_per_row * BLOCK_BYTES;
        if compressed.len() < top_level {
            return Err(MapEditError::format(format!(
                "Compressed tile holds {} bytes, need at least {}",
                compressed.len(),
                top_level
            )));
        }

        let mut tile = Raster::new(TILE_SIZE, TILE_SIZE, [0u8; 3]);
        for (block_index, block) in compressed[..top_level].chunks_exact(BLOCK_BYTES).enumerate() {
            let bx = (block_index % blocks_per_row) * 4;
            let by = (block_index / blocks_per_row) * 4;
            for (i, pixel) in decompress_block(block).into_iter().enumerate() {
                tile.set(bx + i % 4, by + i / 4, pixel);
            }
        }
        Ok(tile)
    }

    fn compressed_minimap(&mut self, texture: &Raster<Rgb>) -> MapEditResult<Vec<u8>> {
        if texture.is_empty() {
            return Err(MapEditError::invalid("Cannot build a minimap from an empty texture"));
        }
        let base = texture.resample_bilinear(MINIMAP_SIZE, MINIMAP_SIZE);
        let mut out = Vec::with_capacity(COMPRESSED_MINIMAP_SIZE);
        compress_with_mips(base, MINIMAP_MIP_LEVELS, &mut out);
        Ok(out)
    }
}

/// Copy the `TILE_SIZE`² tile at texel `(x, y)` out of a texture
pub fn extract_tile(texture: &Raster<Rgb>, x: usize, y: usize) -> MapEditResult<Raster<Rgb>> {
    if x + TILE_SIZE > texture.width() || y + TILE_SIZE > texture.height() {
        return Err(MapEditError::DimensionMismatch {
            reason: format!(
                "Tile at ({x}, {y}) exceeds texture of {}x{}",
                texture.width(),
                texture.height()
            ),
        });
    }
    let mut data = Vec::with_capacity(TILE_SIZE * TILE_SIZE);
    for row in y..y + TILE_SIZE {
        data.extend_from_slice(&texture.row(row)[x..x + TILE_SIZE]);
    }
    Raster::from_vec(TILE_SIZE, TILE_SIZE, data)
}

/// Lossless pass-through codec storing raw RGB texels.
///
/// Tile files written with it are not readable by the engine; it exists so
/// texture round-trips through the tiled format can be checked exactly.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawTileCodec;

impl TileCompressor for RawTileCodec {
    fn compressed_tile_size(&self) -> usize {
        TILE_SIZE * TILE_SIZE * 3
    }

    fn compress_tile(&mut self, texture: &Raster<Rgb>, x: usize, y: usize) -> MapEditResult<Vec<u8>> {
        Ok(extract_tile(texture, x, y)?.as_bytes().to_vec())
    }

    fn decompress_tile(&self, compressed: &[u8]) -> MapEditResult<Raster<Rgb>> {
        if compressed.len() != self.compressed_tile_size() {
            return Err(MapEditError::format(format!(
                "Raw tile holds {} bytes, expected {}",
                compressed.len(),
                self.compressed_tile_size()
            )));
        }
        let data = compressed
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        Raster::from_vec(TILE_SIZE, TILE_SIZE, data)
    }

    fn compressed_minimap(&mut self, texture: &Raster<Rgb>) -> MapEditResult<Vec<u8>> {
        Dxt1Compressor.compressed_minimap(texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb565_primaries() {
        assert_eq!(rgb888_to_rgb565([255, 0, 0]), 0xF800);
        assert_eq!(rgb888_to_rgb565([0, 255, 0]), 0x07E0);
        assert_eq!(rgb888_to_rgb565([0, 0, 255]), 0x001F);
        assert_eq!(rgb565_to_rgb888(0xFFFF), [255, 255, 255]);
    }

    #[test]
    fn test_compress_solid_block() {
        let block = compress_block(&[[255, 0, 0]; 16]);
        assert_eq!(u16::from_le_bytes([block[0], block[1]]), 0xF800);
        assert_eq!(u16::from_le_bytes([block[2], block[3]]), 0xF800);
        assert_eq!(&block[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_two_colour_block_round_trip() {
        let mut pixels = [[0u8, 0, 0]; 16];
        for pixel in pixels.iter_mut().skip(8) {
            *pixel = [255, 255, 255];
        }
        assert_eq!(decompress_block(&compress_block(&pixels)), pixels);
    }

    #[test]
    fn test_sizes_match_format_constants() {
        assert_eq!(mip_levels_to_4(TILE_SIZE), 4);
        assert_eq!(mip_levels_to_4(MINIMAP_SIZE), MINIMAP_MIP_LEVELS);

        let texture = Raster::new(64, 64, [10u8, 20, 30]);
        let tile = Dxt1Compressor.compress_tile(&texture, 32, 0).unwrap();
        assert_eq!(tile.len(), COMPRESSED_TILE_SIZE);

        let minimap = Dxt1Compressor.compressed_minimap(&texture).unwrap();
        assert_eq!(minimap.len(), COMPRESSED_MINIMAP_SIZE);
    }

    #[test]
    fn test_dxt1_is_lossless_on_solid_565_colours() {
        let colour = rgb565_to_rgb888(0b10110_101010_01101);
        let mut texture = Raster::new(32, 32, colour);
        for x in 0..16 {
            texture.set(x, 3, [0, 0, 0]);
        }
        let compressed = Dxt1Compressor.compress_tile(&texture, 0, 0).unwrap();
        let tile = Dxt1Compressor.decompress_tile(&compressed).unwrap();
        assert_eq!(tile, texture);
    }

    #[test]
    fn test_extract_tile_bounds() {
        let texture = Raster::new(40, 40, [0u8; 3]);
        assert!(extract_tile(&texture, 0, 0).is_ok());
        assert!(matches!(
            extract_tile(&texture, 16, 0),
            Err(MapEditError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_raw_codec_is_exact() {
        let data: Vec<Rgb> = (0..32 * 32)
            .map(|i| [(i % 251) as u8, (i % 13) as u8, (i / 7) as u8])
            .collect();
        let texture = Raster::from_vec(32, 32, data).unwrap();
        let mut codec = RawTileCodec;
        let compressed = codec.compress_tile(&texture, 0, 0).unwrap();
        assert_eq!(compressed.len(), codec.compressed_tile_size());
        assert_eq!(codec.decompress_tile(&compressed).unwrap(), texture);
    }
}
