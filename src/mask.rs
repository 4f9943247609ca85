//! Confidence that a pixel is free of the watermark.
//!
//! A semi-transparent overlay suppresses cross-sample variability by
//! `(1 - a)^2`, so low variance marks watermark-dominated pixels.

use crate::channels::Channels;
use crate::error::{Error, Result};

/// Per-pixel confidence in `[0, 1]` that a pixel is not watermark-affected.
pub trait MaskWeight: Sync {
    /// Weight of `(channel, x, y)`.
    fn weight(&self, channel: usize, x: u32, y: u32) -> f32;
}

/// Linear ramp over a variance map between two thresholds.
///
/// - `var < low` gives `0.0` (watermark-dominated),
/// - `var >= high` gives `1.0` (normal content variability),
/// - otherwise `(var - low) / (high - low)`.
#[derive(Debug, Clone, Copy)]
pub struct VarianceMask<'a> {
    variance: &'a Channels,
    low: f32,
    high: f32,
}

impl<'a> VarianceMask<'a> {
    /// Build a mask over `variance` with thresholds `low < high`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] unless `low < high`.
    pub fn new(variance: &'a Channels, low: u8, high: u8) -> Result<Self> {
        if low >= high {
            return Err(Error::InvalidOptions(format!(
                "low variance threshold ({low}) must be below high threshold ({high})"
            )));
        }
        Ok(Self {
            variance,
            low: f32::from(low),
            high: f32::from(high),
        })
    }

    /// Weight for a raw variance value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn weight_of(&self, var: i32) -> f32 {
        let var = var as f32;
        if var < self.low {
            0.0
        } else if var >= self.high {
            1.0
        } else {
            (var - self.low) / (self.high - self.low)
        }
    }
}

impl MaskWeight for VarianceMask<'_> {
    fn weight(&self, channel: usize, x: u32, y: u32) -> f32 {
        self.weight_of(self.variance.get(channel, x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Size;

    #[test]
    fn thresholds_must_be_ordered() {
        let var = Channels::new(Size::new(1, 1));
        assert!(VarianceMask::new(&var, 50, 50).is_err());
        assert!(VarianceMask::new(&var, 80, 20).is_err());
        assert!(VarianceMask::new(&var, 20, 80).is_ok());
    }

    #[test]
    fn weight_ramps_linearly_between_thresholds() {
        let var = Channels::new(Size::new(1, 1));
        let mask = VarianceMask::new(&var, 40, 80).unwrap();
        assert!(mask.weight_of(0).abs() < f32::EPSILON);
        assert!(mask.weight_of(39).abs() < f32::EPSILON);
        assert!(mask.weight_of(40).abs() < f32::EPSILON);
        assert!((mask.weight_of(50) - 0.25).abs() < 1e-6);
        assert!((mask.weight_of(60) - 0.5).abs() < 1e-6);
        assert!((mask.weight_of(80) - 1.0).abs() < f32::EPSILON);
        assert!((mask.weight_of(255) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn weight_reads_variance_per_channel() {
        let var = Channels::from_fn(Size::new(2, 1), |c, x, _| {
            if c == 1 && x == 1 {
                200
            } else {
                3
            }
        });
        let mask = VarianceMask::new(&var, 10, 100).unwrap();
        assert!((mask.weight(1, 1, 0) - 1.0).abs() < f32::EPSILON);
        assert!(mask.weight(0, 1, 0).abs() < f32::EPSILON);
        assert!(mask.weight(1, 0, 0).abs() < f32::EPSILON);
    }
}
