//! Radial weighted interpolation across masked-out pixels.
//!
//! Pixels whose mask weight is at least 0.5 pass through unchanged. Every
//! other pixel becomes the average of its neighbours within `radius`,
//! each weighted by `mask(neighbour) * (1 - distance / radius)`.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::channels::{round_intensity, Channels, CHANNELS};
use crate::error::{Error, Result};
use crate::mask::MaskWeight;
use crate::progress::{report_progress, ProgressCallback, Stage};

/// Mask weight at or above which a pixel is copied from the base image.
pub const PASS_THROUGH_WEIGHT: f32 = 0.5;

/// Largest accepted search radius in pixels.
pub const MAX_RADIUS: u32 = 256;

/// Offset inside the search disc with its radial falloff weight.
#[derive(Debug, Clone, Copy)]
struct Offset {
    dx: i64,
    dy: i64,
    falloff: f64,
}

/// Inpaints masked regions from nearby unmasked pixels.
#[derive(Debug, Clone)]
pub struct GapFiller {
    offsets: Vec<Offset>,
}

impl GapFiller {
    /// Create a filler with the given search radius in pixels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] if `radius` is zero or above
    /// [`MAX_RADIUS`].
    pub fn new(radius: u32) -> Result<Self> {
        check_radius(radius)?;

        let r = i64::from(radius);
        let mut offsets = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                let d2 = dx * dx + dy * dy;
                if d2 > r * r {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let falloff = 1.0 - (d2 as f64).sqrt() / f64::from(radius);
                // The rim of the disc has zero weight.
                if falloff > 0.0 {
                    offsets.push(Offset { dx, dy, falloff });
                }
            }
        }

        Ok(Self { offsets })
    }

    /// In-bounds neighbours of `(x, y)` with their radial falloff weight.
    ///
    /// Includes `(x, y)` itself with weight 1.
    pub fn neighbourhood(
        &self,
        width: u32,
        height: u32,
        x: u32,
        y: u32,
    ) -> impl Iterator<Item = (u32, u32, f64)> + '_ {
        let (x, y) = (i64::from(x), i64::from(y));
        let (w, h) = (i64::from(width), i64::from(height));
        self.offsets.iter().filter_map(move |o| {
            let nx = x + o.dx;
            let ny = y + o.dy;
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                return None;
            }
            let nx = u32::try_from(nx).ok()?;
            let ny = u32::try_from(ny).ok()?;
            Some((nx, ny, o.falloff))
        })
    }

    /// Value of one output sample.
    ///
    /// Falls back to zero when no neighbour carries any mask weight.
    pub fn fill_pixel<M: MaskWeight + ?Sized>(
        &self,
        base: &Channels,
        mask: &M,
        channel: usize,
        x: u32,
        y: u32,
    ) -> i32 {
        if mask.weight(channel, x, y) >= PASS_THROUGH_WEIGHT {
            return base.get(channel, x, y);
        }

        let mut total = 0.0_f64;
        let mut weight_sum = 0.0_f64;
        for (nx, ny, falloff) in self.neighbourhood(base.width(), base.height(), x, y) {
            let m = f64::from(mask.weight(channel, nx, ny));
            if m <= 0.0 {
                continue;
            }
            let w = m * falloff;
            total += w * f64::from(base.get(channel, nx, ny));
            weight_sum += w;
        }

        if weight_sum > 0.0 {
            round_intensity(total / weight_sum)
        } else {
            0
        }
    }

    /// Fill every masked pixel of `base`, reporting completed rows under `stage`.
    #[must_use]
    pub fn fill<M: MaskWeight + ?Sized>(
        &self,
        base: &Channels,
        mask: &M,
        stage: Stage,
        progress: &ProgressCallback,
    ) -> Channels {
        let total = CHANNELS * base.height() as usize;
        let done = AtomicUsize::new(0);

        Channels::from_rows(base.size(), |c, y, row| {
            for (x, value) in (0u32..).zip(row.iter_mut()) {
                *value = self.fill_pixel(base, mask, c, x, y);
            }
            let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
            report_progress(progress, stage, completed, total);
        })
    }
}

/// Reject a search radius outside `1..=MAX_RADIUS`.
///
/// # Errors
///
/// Returns [`Error::InvalidOptions`] for an out-of-range radius.
pub fn check_radius(radius: u32) -> Result<()> {
    if radius == 0 {
        return Err(Error::InvalidOptions("search radius must be positive".into()));
    }
    if radius > MAX_RADIUS {
        return Err(Error::InvalidOptions(format!(
            "search radius {radius} exceeds the maximum of {MAX_RADIUS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::channels::Size;

    /// Mask backed by an explicit weight per sample, recording every lookup.
    struct TableMask {
        weights: Vec<f32>,
        size: Size,
        seen: Mutex<Vec<(usize, u32, u32)>>,
    }

    impl TableMask {
        fn new(size: Size, weight: impl Fn(usize, u32, u32) -> f32) -> Self {
            let mut weights = Vec::new();
            for c in 0..CHANNELS {
                for y in 0..size.height {
                    for x in 0..size.width {
                        weights.push(weight(c, x, y));
                    }
                }
            }
            Self {
                weights,
                size,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl MaskWeight for TableMask {
        fn weight(&self, channel: usize, x: u32, y: u32) -> f32 {
            self.seen.lock().unwrap().push((channel, x, y));
            let plane = self.size.pixel_count();
            self.weights
                [channel * plane + y as usize * self.size.width as usize + x as usize]
        }
    }

    #[test]
    fn zero_radius_is_rejected() {
        assert!(GapFiller::new(0).is_err());
    }

    #[test]
    fn oversized_radius_is_rejected() {
        assert!(matches!(GapFiller::new(MAX_RADIUS + 1), Err(Error::InvalidOptions(_))));
        assert!(matches!(GapFiller::new(u32::MAX), Err(Error::InvalidOptions(_))));
        assert!(GapFiller::new(MAX_RADIUS).is_ok());
    }

    #[test]
    fn neighbourhood_is_a_clipped_disc() {
        let filler = GapFiller::new(3).unwrap();
        // Interior: all lattice points with dx^2 + dy^2 < 9 (rim excluded).
        let interior: Vec<_> = filler.neighbourhood(20, 20, 10, 10).collect();
        assert_eq!(interior.len(), 25);
        for &(nx, ny, falloff) in &interior {
            let dx = i64::from(nx) - 10;
            let dy = i64::from(ny) - 10;
            assert!(dx * dx + dy * dy < 9);
            assert!(falloff > 0.0 && falloff <= 1.0);
        }
        assert!(interior
            .iter()
            .any(|&(nx, ny, f)| nx == 10 && ny == 10 && (f - 1.0).abs() < 1e-12));
    }

    #[test]
    fn corner_neighbourhood_stays_in_bounds() {
        let filler = GapFiller::new(12).unwrap();
        let corner: Vec<_> = filler.neighbourhood(30, 20, 0, 0).collect();
        assert!(!corner.is_empty());
        for &(nx, ny, _) in &corner {
            assert!(nx < 30 && ny < 20);
            assert!(u64::from(nx * nx + ny * ny) < 144);
        }
    }

    #[test]
    fn fill_at_corner_only_consults_in_bounds_pixels() {
        let size = Size::new(8, 6);
        let base = Channels::from_fn(size, |_, x, y| i32::try_from(x + y).unwrap());
        let mask = TableMask::new(size, |_, x, y| if x == 0 && y == 0 { 0.0 } else { 1.0 });
        let filler = GapFiller::new(12).unwrap();

        let _ = filler.fill_pixel(&base, &mask, 0, 0, 0);

        let seen = mask.seen.lock().unwrap();
        assert!(seen.len() > 1);
        assert!(seen.iter().all(|&(_, x, y)| x < 8 && y < 6));
    }

    #[test]
    fn unmasked_pixels_pass_through_exactly() {
        let size = Size::new(24, 18);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut base = Channels::new(size);
        let mut weights = Vec::new();
        for c in 0..CHANNELS {
            for y in 0..size.height {
                for x in 0..size.width {
                    base.set(c, x, y, rng.gen_range(0..=255));
                    weights.push(rng.gen::<f32>());
                }
            }
        }
        let plane = size.pixel_count();
        let mask = TableMask::new(size, |c, x, y| {
            weights[c * plane + y as usize * size.width as usize + x as usize]
        });

        let filled = GapFiller::new(4)
            .unwrap()
            .fill(&base, &mask, Stage::FillExpectedValue, &None);

        let mut checked = 0;
        for c in 0..CHANNELS {
            for y in 0..size.height {
                for x in 0..size.width {
                    if mask.weight(c, x, y) >= PASS_THROUGH_WEIGHT {
                        assert_eq!(filled.get(c, x, y), base.get(c, x, y));
                        checked += 1;
                    }
                }
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn masked_pixel_is_radially_weighted_average() {
        let size = Size::new(5, 1);
        let base = Channels::from_fn(size, |_, x, _| match x {
            1 => 10,
            3 => 30,
            _ => 250,
        });
        let mask = TableMask::new(size, |_, x, _| if x == 2 { 0.0 } else { 1.0 });

        // Radius 2: x=1 and x=3 at distance 1 weigh 0.5 each, x=0 and x=4 sit
        // on the rim and weigh nothing.
        let filled = GapFiller::new(2).unwrap().fill(&base, &mask, Stage::FillVariance, &None);
        assert_eq!(filled.get(0, 2, 0), 20);
        assert_eq!(filled.get(0, 0, 0), 250);
    }

    #[test]
    fn partial_mask_weights_scale_contributions() {
        let size = Size::new(3, 1);
        let base = Channels::from_fn(size, |_, x, _| if x == 0 { 0 } else { 90 });
        // Left neighbour weight 0.4 (masked itself, but still contributes),
        // centre masked out, right neighbour fully trusted.
        let mask = TableMask::new(size, |_, x, _| match x {
            0 => 0.4,
            1 => 0.0,
            _ => 1.0,
        });
        let filler = GapFiller::new(2).unwrap();
        // (0.4 * 0.5 * 0 + 1.0 * 0.5 * 90) / (0.2 + 0.5) = 64.29
        assert_eq!(filler.fill_pixel(&base, &mask, 0, 1, 0), 64);
    }

    #[test]
    fn fully_masked_image_falls_back_to_zero() {
        let size = Size::new(6, 6);
        let base = Channels::from_fn(size, |_, _, _| 123);
        let mask = TableMask::new(size, |_, _, _| 0.0);
        let filled = GapFiller::new(3).unwrap().fill(&base, &mask, Stage::FillVariance, &None);
        assert!(filled.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn fill_reports_each_row() {
        use std::sync::Arc;

        use crate::progress::Progress;

        let size = Size::new(4, 5);
        let base = Channels::new(size);
        let mask = TableMask::new(size, |_, _, _| 1.0);
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let callback: ProgressCallback = Some(Arc::new(move |p: Progress| {
            assert_eq!(p.total, 15);
            sink.fetch_add(1, Ordering::Relaxed);
        }));

        let _ = GapFiller::new(1).unwrap().fill(&base, &mask, Stage::FillExpectedValue, &callback);
        assert_eq!(count.load(Ordering::Relaxed), 15);
    }
}
