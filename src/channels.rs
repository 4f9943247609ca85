//! Fixed-size three-channel intensity grid shared by every stage.
//!
//! Values are stored as `i32` in one contiguous buffer, channel-major then
//! row-major: index `(c * height + y) * width + x`. Intermediate stages may
//! hold values outside `[0, 255]`; conversion back to an [`RgbImage`] clamps.

use std::fmt;
use std::str::FromStr;

use image::{Rgb, RgbImage};

use crate::error::{Error, Result};

/// Number of colour channels carried by every map.
pub const CHANNELS: usize = 3;

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a size from width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of an existing RGB image.
    #[must_use]
    pub fn of(img: &RgbImage) -> Self {
        Self::new(img.width(), img.height())
    }

    /// Number of pixels in one channel.
    #[must_use]
    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = Error;

    /// Parse `"<width>x<height>"`, e.g. `"640x480"`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidOptions(format!("size must look like 640x480, got {s:?}"));
        let (w, h) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = w.trim().parse().map_err(|_| invalid())?;
        let height = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self::new(width, height))
    }
}

/// Round a computed intensity to the nearest integer, halves to even.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn round_intensity(value: f64) -> i32 {
    value.round_ties_even() as i32
}

/// Clamp an intensity into the `u8` range.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// A `(width, height)` grid with three independent integer channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channels {
    size: Size,
    data: Vec<i32>,
}

impl Channels {
    /// All-zero map of the given size.
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self {
            size,
            data: vec![0; CHANNELS * size.pixel_count()],
        }
    }

    /// Build a map by evaluating `f(channel, x, y)` for every sample.
    #[must_use]
    pub fn from_fn<F>(size: Size, f: F) -> Self
    where
        F: Fn(usize, u32, u32) -> i32 + Sync,
    {
        Self::from_rows(size, |c, y, row| {
            for (x, value) in (0u32..).zip(row.iter_mut()) {
                *value = f(c, x, y);
            }
        })
    }

    /// Build a map from a function of the flat buffer position.
    ///
    /// Useful when the inputs share this map's layout, so position `i` of
    /// the output corresponds to position `i` of every input buffer.
    #[must_use]
    pub fn from_flat_fn<F>(size: Size, f: F) -> Self
    where
        F: Fn(usize) -> i32 + Sync,
    {
        let width = size.width as usize;
        let height = size.height as usize;
        Self::from_rows(size, |c, y, row| {
            let offset = (c * height + y as usize) * width;
            for (i, value) in row.iter_mut().enumerate() {
                *value = f(offset + i);
            }
        })
    }

    /// Build a map one output row at a time.
    ///
    /// `f(channel, y, row)` receives a disjoint, zero-initialised row of
    /// `width` values. Rows are filled concurrently when the `parallel`
    /// feature is enabled.
    #[must_use]
    pub fn from_rows<F>(size: Size, f: F) -> Self
    where
        F: Fn(usize, u32, &mut [i32]) + Sync,
    {
        let mut out = Self::new(size);
        let width = size.width as usize;
        let height = size.height as usize;
        if width == 0 || height == 0 {
            return out;
        }

        #[allow(clippy::cast_possible_truncation)]
        let fill = |(row, values): (usize, &mut [i32])| f(row / height, (row % height) as u32, values);

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            out.data.par_chunks_mut(width).enumerate().for_each(fill);
        }

        #[cfg(not(feature = "parallel"))]
        {
            out.data.chunks_mut(width).enumerate().for_each(fill);
        }

        out
    }

    /// Copy an 8-bit RGB image into a map.
    #[must_use]
    pub fn from_rgb(img: &RgbImage) -> Self {
        Self::from_fn(Size::of(img), |c, x, y| i32::from(img.get_pixel(x, y)[c]))
    }

    /// Convert to an 8-bit RGB image, clamping every value to `[0, 255]`.
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.size.width, self.size.height, |x, y| {
            Rgb([
                clamp_u8(self.get(0, x, y)),
                clamp_u8(self.get(1, x, y)),
                clamp_u8(self.get(2, x, y)),
            ])
        })
    }

    /// Size of the map.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.size.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Position of `(channel, x, y)` in the flat buffer.
    #[must_use]
    pub fn index(&self, channel: usize, x: u32, y: u32) -> usize {
        debug_assert!(channel < CHANNELS && x < self.size.width && y < self.size.height);
        (channel * self.size.height as usize + y as usize) * self.size.width as usize + x as usize
    }

    /// Value at `(channel, x, y)`.
    #[must_use]
    pub fn get(&self, channel: usize, x: u32, y: u32) -> i32 {
        self.data[self.index(channel, x, y)]
    }

    /// Overwrite the value at `(channel, x, y)`.
    pub fn set(&mut self, channel: usize, x: u32, y: u32, value: i32) {
        let idx = self.index(channel, x, y);
        self.data[idx] = value;
    }

    /// The flat value buffer.
    #[must_use]
    pub fn data(&self) -> &[i32] {
        &self.data
    }

    /// Fail with [`Error::SizeMismatch`] unless this map has size `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] naming `item` when sizes differ.
    pub fn ensure_size(&self, expected: Size, item: &str) -> Result<()> {
        ensure_size(self.size, expected, item)
    }
}

/// Fail with [`Error::SizeMismatch`] unless `actual == expected`.
///
/// # Errors
///
/// Returns [`Error::SizeMismatch`] naming `item` when sizes differ.
pub fn ensure_size(actual: Size, expected: Size, item: &str) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::SizeMismatch {
            item: item.to_string(),
            expected,
            actual,
        })
    }
}
