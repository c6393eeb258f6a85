//! Typed 2D raster buffers shared by every map layer.
//!
//! All rasters are row-major: cell `(x, y)` lives at `y * width + x`, with
//! `(0, 0)` in the top-left corner. File formats that store rows bottom-up
//! flip at the codec boundary, never here.

use crate::errors::{MapEditError, MapEditResult};

pub mod coordinates;
pub mod slope;

pub use slope::{SlopeClass, compute_slope_map};

/// Interleaved RGB texel
pub type Rgb = [u8; 3];

/// Linear interpolation used by bilinear sampling and resampling
pub trait Lerp: Copy {
    fn lerp(a: Self, b: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }
}

impl Lerp for u8 {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        (a as f32 + (b as f32 - a as f32) * t).round().clamp(0.0, 255.0) as u8
    }
}

impl Lerp for Rgb {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        [
            u8::lerp(a[0], b[0], t),
            u8::lerp(a[1], b[1], t),
            u8::lerp(a[2], b[2], t),
        ]
    }
}

/// Row-major 2D buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Raster<T> {
    /// Create a raster filled with a single value
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    /// Wrap an existing row-major buffer, validating its length
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> MapEditResult<Self> {
        if data.len() != width * height {
            return Err(MapEditError::DimensionMismatch {
                reason: format!(
                    "Buffer of {} cells does not match raster dimensions {}x{}",
                    data.len(),
                    width,
                    height
                ),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Check signed coordinates against the raster bounds
    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x < self.width && y < self.height {
            Some(self.data[self.index(x, y)])
        } else {
            None
        }
    }

    /// Unchecked-by-contract accessor; panics when out of bounds
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let index = self.index(x, y);
        self.data[index] = value;
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        if x < self.width && y < self.height {
            let index = self.index(x, y);
            Some(&mut self.data[index])
        } else {
            None
        }
    }

    /// Clamp coordinates to the nearest edge cell
    #[inline]
    pub fn at_clamped(&self, x: i64, y: i64) -> T {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.at(x, y)
    }

    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let start = y * self.width;
        &mut self.data[start..start + self.width]
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Iterate `(x, y, value)` in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let width = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % width, i / width, v))
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Raster<U> {
        Raster {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Nearest-neighbour resample into new dimensions
    pub fn resample_nearest(&self, width: usize, height: usize) -> Raster<T> {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let sy = (y * self.height / height.max(1)).min(self.height - 1);
            for x in 0..width {
                let sx = (x * self.width / width.max(1)).min(self.width - 1);
                data.push(self.at(sx, sy));
            }
        }
        Raster {
            width,
            height,
            data,
        }
    }
}

impl<T: Lerp> Raster<T> {
    /// Bilinear sample at fractional cell coordinates, clamped to the edges
    pub fn sample_bilinear(&self, fx: f32, fy: f32) -> T {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let fx = fx.clamp(0.0, max_x);
        let fy = fy.clamp(0.0, max_y);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let top = T::lerp(self.at(x0, y0), self.at(x1, y0), tx);
        let bottom = T::lerp(self.at(x0, y1), self.at(x1, y1), tx);
        T::lerp(top, bottom, ty)
    }

    /// Bilinear resample with corner-aligned sampling
    pub fn resample_bilinear(&self, width: usize, height: usize) -> Raster<T> {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        let step_x = if width > 1 {
            (self.width - 1) as f32 / (width - 1) as f32
        } else {
            0.0
        };
        let step_y = if height > 1 {
            (self.height - 1) as f32 / (height - 1) as f32
        } else {
            0.0
        };

        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(self.sample_bilinear(x as f32 * step_x, y as f32 * step_y));
            }
        }
        Raster {
            width,
            height,
            data,
        }
    }
}

impl<T: bytemuck::Pod> Raster<T> {
    /// Raw bytes of the buffer in memory order
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.data)
    }
}

/// Fixed display colour for a typemap index.
///
/// Index 0 is black; the rest walk the hue circle by the golden angle so
/// neighbouring indices stay distinguishable.
pub fn type_color(index: u8) -> Rgb {
    if index == 0 {
        return [0, 0, 0];
    }
    let hue = (index as f32 * 137.507_77) % 360.0;
    let value = if index % 2 == 0 { 0.75 } else { 1.0 };
    hsv_to_rgb(hue, 0.8, value)
}

/// The full 256-entry typemap colour table
pub fn type_color_table() -> [Rgb; 256] {
    let mut table = [[0u8; 3]; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = type_color(i as u8);
    }
    table
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb {
    let c = value * saturation;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    [
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    ]
}
