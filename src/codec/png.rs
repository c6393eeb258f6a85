//! PNG heightmaps through the `image` crate.

use crate::codec::raw::{height_to_sample, sample_to_height};
use crate::errors::{MapEditError, MapEditResult};
use crate::raster::Raster;
use image::codecs::png::PngEncoder;
use image::{ImageBuffer, ImageFormat, Luma};
use std::io::{Read, Write};

/// Write a heightmap as a 16-bit grayscale PNG
pub fn write_png16<W: Write>(writer: W, heightmap: &Raster<f32>) -> MapEditResult<()> {
    let samples: Vec<u16> = heightmap.data().iter().map(|&v| height_to_sample(v)).collect();
    let image: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(
        heightmap.width() as u32,
        heightmap.height() as u32,
        samples,
    )
    .ok_or_else(|| MapEditError::invalid("Heightmap buffer does not match its dimensions"))?;

    image.write_with_encoder(PngEncoder::new(writer))?;
    Ok(())
}

/// Read a grayscale PNG heightmap, 8 or 16 bits per sample
pub fn read_png_heightmap<R: Read>(reader: &mut R) -> MapEditResult<Raster<f32>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.into_luma16();

    let (width, height) = image.dimensions();
    let data = image.into_raw().into_iter().map(sample_to_height).collect();
    Raster::from_vec(width as usize, height as usize, data)
}
