//! 16-bit raw heightmaps, plain and self-describing (`SRAW`).

use crate::codec::binary::checked_area;
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::Raster;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use tracing::warn;

pub const SRAW_MAGIC: &[u8; 4] = b"SRAW";

/// Result of a raw heightmap load.
///
/// `warning` carries a [`MapEditError::DimensionMismatch`] when a plain raw
/// file did not divide evenly by the supplied width; the heightmap is still
/// usable but truncated.
#[derive(Debug)]
pub struct RawHeightmap {
    pub heightmap: Raster<f32>,
    pub warning: Option<MapEditError>,
}

#[inline]
pub fn sample_to_height(sample: u16) -> f32 {
    sample as f32 / 65535.0
}

#[inline]
pub fn height_to_sample(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0).round() as u16
}

fn samples_to_raster(width: usize, height: usize, bytes: &[u8]) -> MapEditResult<Raster<f32>> {
    let data = bytes
        .chunks_exact(2)
        .take(width * height)
        .map(|pair| sample_to_height(u16::from_le_bytes([pair[0], pair[1]])))
        .collect();
    Raster::from_vec(width, height, data)
}

/// Read a raw heightmap, detecting the `SRAW` header.
///
/// `plain_width` is only consulted for headerless files.
pub fn read_raw16<R: Read>(reader: &mut R, plain_width: usize) -> MapEditResult<RawHeightmap> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    if bytes.starts_with(SRAW_MAGIC) {
        return read_sraw_body(&bytes[SRAW_MAGIC.len()..]);
    }

    if plain_width == 0 {
        return Err(MapEditError::invalid(
            "Plain raw heightmaps need a non-zero width",
        ));
    }

    let samples = bytes.len() / 2;
    let height = samples / plain_width;
    let warning = if bytes.len() % 2 != 0 || samples % plain_width != 0 {
        let reason = format!(
            "Raw file of {} bytes is not a whole number of {}-sample rows; truncating to {} rows",
            bytes.len(),
            plain_width,
            height
        );
        warn!("{reason}");
        Some(MapEditError::DimensionMismatch { reason })
    } else {
        None
    };

    Ok(RawHeightmap {
        heightmap: samples_to_raster(plain_width, height, &bytes)?,
        warning,
    })
}

fn read_sraw_body(mut body: &[u8]) -> MapEditResult<RawHeightmap> {
    let width = body.read_i32::<LittleEndian>()?;
    let height = body.read_i32::<LittleEndian>()?;
    if width <= 0 || height <= 0 {
        return Err(MapEditError::format(format!(
            "Invalid SRAW dimensions {width}x{height}"
        )));
    }
    let (width, height) = (width as usize, height as usize);

    let expected = checked_area(width, height, 2, "SRAW heightmap")?;
    if body.len() < expected {
        return Err(MapEditError::format(format!(
            "SRAW body holds {} bytes, {}x{} samples need {}",
            body.len(),
            width,
            height,
            expected
        )));
    }

    Ok(RawHeightmap {
        heightmap: samples_to_raster(width, height, body)?,
        warning: None,
    })
}

fn write_samples<W: Write>(writer: &mut W, heightmap: &Raster<f32>) -> MapEditResult<()> {
    for &value in heightmap.data() {
        writer.write_u16::<LittleEndian>(height_to_sample(value))?;
    }
    Ok(())
}

/// Write a headerless raw heightmap
pub fn write_raw16<W: Write>(writer: &mut W, heightmap: &Raster<f32>) -> MapEditResult<()> {
    write_samples(writer, heightmap)
}

/// Write a self-describing `SRAW` heightmap
pub fn write_sraw<W: Write>(writer: &mut W, heightmap: &Raster<f32>) -> MapEditResult<()> {
    writer.write_all(SRAW_MAGIC)?;
    writer.write_i32::<LittleEndian>(heightmap.width() as i32)?;
    writer.write_i32::<LittleEndian>(heightmap.height() as i32)?;
    write_samples(writer, heightmap)
}
