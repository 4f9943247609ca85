//! Algebraic recovery of the watermark and of the original content.
//!
//! With `a = alpha / 255`, compositing is `observed = a * color + (1 - a) * content`.
//! Variance scales by `(1 - a)^2`, so `a = 1 - sqrt(Var / Var0)`; the mean gives
//! `color = EV / a + EV0 * (1 - 1 / a)`; and a target inverts as
//! `content = (observed - a * color) / (1 - a)`.

use image::RgbImage;

use crate::channels::{round_intensity, Channels, Size};
use crate::error::Result;
use crate::progress::{report_progress, ProgressCallback, Stage};

/// Per-pixel alpha from watermarked and watermark-free variance.
#[derive(Debug, Clone, Copy)]
pub struct AlphaSolver<'a> {
    variance: &'a Channels,
    clean_variance: &'a Channels,
}

impl<'a> AlphaSolver<'a> {
    /// Pair the observed variance with its gap-filled estimate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SizeMismatch`] if the maps differ in size.
    pub fn new(variance: &'a Channels, clean_variance: &'a Channels) -> Result<Self> {
        clean_variance.ensure_size(variance.size(), "no-watermark variance map")?;
        Ok(Self {
            variance,
            clean_variance,
        })
    }

    /// Alpha in `[0, 255]` at `(channel, x, y)`.
    ///
    /// Zero where the watermark-free variance is zero, since nothing can be
    /// compared there.
    #[must_use]
    pub fn alpha(&self, channel: usize, x: u32, y: u32) -> i32 {
        let var0 = self.clean_variance.get(channel, x, y);
        if var0 <= 0 {
            return 0;
        }
        let var = self.variance.get(channel, x, y).max(0);
        let ratio = f64::from(var) / f64::from(var0);
        round_intensity(255.0 * (1.0 - ratio.sqrt())).clamp(0, 255)
    }

    /// Evaluate every pixel into an alpha map.
    #[must_use]
    pub fn solve(&self, progress: &ProgressCallback) -> Channels {
        let map = Channels::from_fn(self.variance.size(), |c, x, y| self.alpha(c, x, y));
        report_progress(progress, Stage::Alpha, 1, 1);
        map
    }
}

/// Per-pixel watermark colour from watermarked and watermark-free means.
#[derive(Debug, Clone, Copy)]
pub struct ColorSolver<'a> {
    ev: &'a Channels,
    clean_ev: &'a Channels,
    alpha: &'a Channels,
}

impl<'a> ColorSolver<'a> {
    /// Combine the observed mean, its gap-filled estimate and the alpha map.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SizeMismatch`] if the maps differ in size.
    pub fn new(ev: &'a Channels, clean_ev: &'a Channels, alpha: &'a Channels) -> Result<Self> {
        clean_ev.ensure_size(ev.size(), "no-watermark expected-value map")?;
        alpha.ensure_size(ev.size(), "alpha map")?;
        Ok(Self {
            ev,
            clean_ev,
            alpha,
        })
    }

    /// Colour in `[0, 255]` at `(channel, x, y)`; zero where alpha is zero.
    #[must_use]
    pub fn color(&self, channel: usize, x: u32, y: u32) -> i32 {
        let alpha = self.alpha.get(channel, x, y);
        if alpha <= 0 {
            return 0;
        }
        let a = f64::from(alpha) / 255.0;
        let ev = f64::from(self.ev.get(channel, x, y));
        let ev0 = f64::from(self.clean_ev.get(channel, x, y));
        round_intensity(ev / a + ev0 * (1.0 - 1.0 / a)).clamp(0, 255)
    }

    /// Evaluate every pixel into a colour map.
    #[must_use]
    pub fn solve(&self, progress: &ProgressCallback) -> Channels {
        let map = Channels::from_fn(self.ev.size(), |c, x, y| self.color(c, x, y));
        report_progress(progress, Stage::Color, 1, 1);
        map
    }
}

/// Inverse alpha compositing with a solved alpha and colour map.
#[derive(Debug, Clone, Copy)]
pub struct Inverter<'a> {
    alpha: &'a Channels,
    color: &'a Channels,
}

impl<'a> Inverter<'a> {
    /// Pair an alpha map with its colour map.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SizeMismatch`] if the maps differ in size.
    pub fn new(alpha: &'a Channels, color: &'a Channels) -> Result<Self> {
        color.ensure_size(alpha.size(), "color map")?;
        Ok(Self { alpha, color })
    }

    /// Size every target must have.
    #[must_use]
    pub fn size(&self) -> Size {
        self.alpha.size()
    }

    /// Original intensity for an observed value at `(channel, x, y)`.
    ///
    /// A fully opaque pixel (`alpha == 255`) carries no original signal and
    /// yields zero.
    #[must_use]
    pub fn original(&self, observed: i32, channel: usize, x: u32, y: u32) -> i32 {
        let alpha = self.alpha.get(channel, x, y).clamp(0, 255);
        if alpha == 255 {
            return 0;
        }
        let a = f64::from(alpha) / 255.0;
        let color = f64::from(self.color.get(channel, x, y));
        round_intensity((f64::from(observed) - a * color) / (1.0 - a)).clamp(0, 255)
    }

    /// Recover the original content of a whole target.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SizeMismatch`] if `target` differs in size.
    pub fn invert(&self, target: &Channels) -> Result<Channels> {
        target.ensure_size(self.size(), "target")?;
        Ok(Channels::from_fn(self.size(), |c, x, y| {
            self.original(target.get(c, x, y), c, x, y)
        }))
    }

    /// [`Inverter::invert`] for an 8-bit RGB image.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SizeMismatch`] if `target` differs in size.
    pub fn invert_rgb(&self, target: &RgbImage) -> Result<RgbImage> {
        Ok(self.invert(&Channels::from_rgb(target))?.to_rgb())
    }
}
