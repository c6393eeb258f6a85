//! Uncompressed Windows V3 bitmaps (8, 24 and 32 bits per pixel).
//!
//! Files store scanlines bottom-to-top, each padded to a multiple of four
//! bytes. Decoded rasters use the usual top-left origin, so logical row `y`
//! is file row `height - y - 1`.

use crate::codec::binary::{checked_area, expect_magic};
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::{Raster, Rgb};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

pub const BITMAP_MAGIC: &[u8; 2] = b"BM";

const FILE_HEADER_SIZE: u32 = 14;
const DIB_HEADER_SIZE: i32 = 40;
const PIXELS_PER_METRE: i32 = 2835;

/// Bytes per padded scanline
fn row_stride(width: usize, bits_per_pixel: u16) -> usize {
    (bits_per_pixel as usize * width).div_ceil(32) * 4
}

/// A decoded bitmap
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub bits_per_pixel: u16,
    /// Decoded colours, top-left origin
    pub pixels: Raster<Rgb>,
    /// Raw palette indices for 8 bpp files
    pub indices: Option<Raster<u8>>,
    /// True when the palette maps every index `i` to `(i, i, i)`
    pub grayscale_palette: bool,
}

impl Bitmap {
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    /// Single-channel byte value at a pixel.
    ///
    /// Grayscale-palette bitmaps yield the index directly; anything else
    /// yields the brightest channel.
    pub fn value(&self, x: usize, y: usize) -> u8 {
        match &self.indices {
            Some(indices) if self.grayscale_palette => indices.at(x, y),
            _ => {
                let [r, g, b] = self.pixels.at(x, y);
                r.max(g).max(b)
            }
        }
    }

    /// Intensity in `[0, 1]` at a pixel
    pub fn intensity(&self, x: usize, y: usize) -> f32 {
        self.value(x, y) as f32 / 255.0
    }

    /// Single-channel byte raster
    pub fn to_bytes(&self) -> Raster<u8> {
        let mut out = Raster::new(self.width(), self.height(), 0u8);
        for y in 0..self.height() {
            for x in 0..self.width() {
                out.set(x, y, self.value(x, y));
            }
        }
        out
    }

    /// Float intensity raster, e.g. for heightmaps and brush patterns
    pub fn to_intensity(&self) -> Raster<f32> {
        self.to_bytes().map(|v| v as f32 / 255.0)
    }
}

/// Decode a bitmap from a reader
pub fn read_bitmap<R: Read>(reader: &mut R) -> MapEditResult<Bitmap> {
    // File header
    expect_magic(reader, BITMAP_MAGIC, "bitmap")?;
    let _file_size = reader.read_i32::<LittleEndian>()?;
    let _reserved = reader.read_u32::<LittleEndian>()?;
    let data_offset = reader.read_i32::<LittleEndian>()?;

    // DIB header
    let dib_header_size = reader.read_i32::<LittleEndian>()?;
    if dib_header_size != DIB_HEADER_SIZE {
        return Err(MapEditError::format(format!(
            "Unsupported bitmap header size {dib_header_size}: only Windows V3 bitmaps are supported"
        )));
    }
    let width = reader.read_i32::<LittleEndian>()?;
    let raw_height = reader.read_i32::<LittleEndian>()?;
    let _planes = reader.read_u16::<LittleEndian>()?;
    let bits_per_pixel = reader.read_u16::<LittleEndian>()?;
    let compression = reader.read_i32::<LittleEndian>()?;
    let _raw_size = reader.read_i32::<LittleEndian>()?;
    let _h_res = reader.read_i32::<LittleEndian>()?;
    let _v_res = reader.read_i32::<LittleEndian>()?;
    let colors_in_palette = reader.read_i32::<LittleEndian>()?;
    let _important_colors = reader.read_i32::<LittleEndian>()?;

    if !matches!(bits_per_pixel, 8 | 24 | 32) {
        return Err(MapEditError::format(format!(
            "Unsupported bitmap depth: {bits_per_pixel} bits per pixel"
        )));
    }
    if compression != 0 {
        return Err(MapEditError::format(format!(
            "Unsupported bitmap compression method {compression}"
        )));
    }
    if width <= 0 || raw_height == 0 {
        return Err(MapEditError::format(format!(
            "Invalid bitmap dimensions {width}x{raw_height}"
        )));
    }

    let width = width as usize;
    let bottom_up = raw_height > 0;
    let height = raw_height.unsigned_abs() as usize;
    checked_area(width, height, 3, "Bitmap")?;

    // Palette
    let mut palette = Vec::new();
    let mut consumed = FILE_HEADER_SIZE as i64 + DIB_HEADER_SIZE as i64;
    if bits_per_pixel == 8 {
        let count = match colors_in_palette {
            0 => 256,
            n if (1..=256).contains(&n) => n as usize,
            n => {
                return Err(MapEditError::format(format!(
                    "Invalid bitmap palette size {n}"
                )));
            }
        };
        for _ in 0..count {
            let mut quad = [0u8; 4];
            reader.read_exact(&mut quad)?;
            palette.push([quad[2], quad[1], quad[0]]);
        }
        consumed += count as i64 * 4;
    }
    let grayscale_palette = bits_per_pixel == 8
        && palette
            .iter()
            .enumerate()
            .all(|(i, c)| c[0] as usize == i && c[1] as usize == i && c[2] as usize == i);

    // Skip to the pixel data
    let gap = data_offset as i64 - consumed;
    if gap < 0 {
        return Err(MapEditError::format(format!(
            "Bitmap pixel data offset {data_offset} overlaps the header"
        )));
    }
    io::copy(&mut reader.by_ref().take(gap as u64), &mut io::sink())?;

    let stride = row_stride(width, bits_per_pixel);
    let mut row = vec![0u8; stride];
    let mut pixels = Raster::new(width, height, [0u8; 3]);
    let mut indices = (bits_per_pixel == 8).then(|| Raster::new(width, height, 0u8));

    for file_row in 0..height {
        reader.read_exact(&mut row)?;
        let y = if bottom_up {
            height - file_row - 1
        } else {
            file_row
        };

        for x in 0..width {
            let color = match bits_per_pixel {
                8 => {
                    let index = row[x];
                    if let Some(indices) = indices.as_mut() {
                        indices.set(x, y, index);
                    }
                    palette
                        .get(index as usize)
                        .copied()
                        .unwrap_or([index, index, index])
                }
                24 => [row[x * 3 + 2], row[x * 3 + 1], row[x * 3]],
                _ => [row[x * 4 + 2], row[x * 4 + 1], row[x * 4]],
            };
            pixels.set(x, y, color);
        }
    }

    Ok(Bitmap {
        bits_per_pixel,
        pixels,
        indices,
        grayscale_palette,
    })
}

fn write_headers<W: Write>(
    writer: &mut W,
    width: usize,
    height: usize,
    bits_per_pixel: u16,
    palette_entries: u32,
) -> MapEditResult<()> {
    let stride = row_stride(width, bits_per_pixel);
    let image_size = (stride * height) as u32;
    let data_offset = FILE_HEADER_SIZE + DIB_HEADER_SIZE as u32 + palette_entries * 4;
    let (width, height) = (
        i32::try_from(width).map_err(|_| MapEditError::invalid("Bitmap too wide"))?,
        i32::try_from(height).map_err(|_| MapEditError::invalid("Bitmap too tall"))?,
    );

    writer.write_all(BITMAP_MAGIC)?;
    writer.write_u32::<LittleEndian>(data_offset + image_size)?;
    writer.write_u32::<LittleEndian>(0)?;
    writer.write_u32::<LittleEndian>(data_offset)?;

    writer.write_i32::<LittleEndian>(DIB_HEADER_SIZE)?;
    writer.write_i32::<LittleEndian>(width)?;
    writer.write_i32::<LittleEndian>(height)?;
    writer.write_u16::<LittleEndian>(1)?;
    writer.write_u16::<LittleEndian>(bits_per_pixel)?;
    writer.write_i32::<LittleEndian>(0)?;
    writer.write_u32::<LittleEndian>(image_size)?;
    writer.write_i32::<LittleEndian>(PIXELS_PER_METRE)?;
    writer.write_i32::<LittleEndian>(PIXELS_PER_METRE)?;
    writer.write_u32::<LittleEndian>(palette_entries)?;
    writer.write_u32::<LittleEndian>(0)?;
    Ok(())
}

/// Read a bitmap file from disk
pub fn load_bitmap(path: &Path) -> MapEditResult<Bitmap> {
    let mut reader = BufReader::new(File::open(path)?);
    read_bitmap(&mut reader)
}

/// Write an 8 bpp bitmap with an identity grayscale palette
pub fn write_bitmap_8<W: Write>(writer: &mut W, raster: &Raster<u8>) -> MapEditResult<()> {
    let (width, height) = raster.dimensions();
    write_headers(writer, width, height, 8, 256)?;

    for i in 0..=255u8 {
        writer.write_all(&[i, i, i, 0])?;
    }

    let stride = row_stride(width, 8);
    let mut row = vec![0u8; stride];
    for file_row in 0..height {
        let y = height - file_row - 1;
        row[..width].copy_from_slice(raster.row(y));
        writer.write_all(&row)?;
    }
    Ok(())
}

/// Write a 24 bpp bitmap
pub fn write_bitmap_24<W: Write>(writer: &mut W, raster: &Raster<Rgb>) -> MapEditResult<()> {
    let (width, height) = raster.dimensions();
    write_headers(writer, width, height, 24, 0)?;

    let stride = row_stride(width, 24);
    let mut row = vec![0u8; stride];
    for file_row in 0..height {
        let y = height - file_row - 1;
        for (x, &[r, g, b]) in raster.row(y).iter().enumerate() {
            row[x * 3] = b;
            row[x * 3 + 1] = g;
            row[x * 3 + 2] = r;
        }
        writer.write_all(&row)?;
    }
    Ok(())
}
