//! Synthetic watermarked samples for testing the estimator.
//!
//! Each sample is uniformly random content with an RGBA overlay composited
//! on top as `round(content * (1 - a) + overlay * a)`, `a = overlay_alpha / 255`.

use std::path::Path;

use image::{Rgba, RgbaImage};
use rand::Rng;

use crate::channels::{ensure_size, round_intensity, Channels, Size, CHANNELS};
use crate::error::Result;

/// Load an overlay asset, keeping its alpha channel.
///
/// # Errors
///
/// Returns [`crate::Error::Image`] if the file cannot be decoded.
pub fn load_overlay(path: &Path) -> Result<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}

/// Composite `overlay` onto `content`.
///
/// # Errors
///
/// Returns [`crate::Error::SizeMismatch`] if the overlay and content differ in size.
pub fn composite_overlay(content: &Channels, overlay: &RgbaImage) -> Result<Channels> {
    ensure_size(
        Size::new(overlay.width(), overlay.height()),
        content.size(),
        "overlay",
    )?;
    Ok(composite_unchecked(content, overlay))
}

/// Composite assuming `overlay` and `content` share a size.
fn composite_unchecked(content: &Channels, overlay: &RgbaImage) -> Channels {
    Channels::from_fn(content.size(), |c, x, y| {
        blend(content.get(c, x, y), overlay.get_pixel(x, y), c)
    })
}

fn blend(value: i32, px: &Rgba<u8>, channel: usize) -> i32 {
    let a = f64::from(px[3]) / 255.0;
    round_intensity(f64::from(value) * (1.0 - a) + f64::from(px[channel]) * a)
}

/// Generate `count` samples of random content under `overlay`.
#[must_use]
pub fn random_samples<R: Rng + ?Sized>(overlay: &RgbaImage, count: usize, rng: &mut R) -> Vec<Channels> {
    let size = Size::new(overlay.width(), overlay.height());
    (0..count)
        .map(|_| {
            let mut content = Channels::new(size);
            for c in 0..CHANNELS {
                for y in 0..size.height {
                    for x in 0..size.width {
                        content.set(c, x, y, rng.gen_range(0..=255));
                    }
                }
            }
            composite_unchecked(&content, overlay)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn transparent_overlay_leaves_content() {
        let content = Channels::from_fn(Size::new(3, 3), |c, x, y| {
            i32::try_from(c * 50 + (x + y) as usize).unwrap()
        });
        let overlay = RgbaImage::from_pixel(3, 3, Rgba([255, 0, 255, 0]));
        assert_eq!(composite_overlay(&content, &overlay).unwrap(), content);
    }

    #[test]
    fn opaque_overlay_replaces_content() {
        let content = Channels::from_fn(Size::new(2, 2), |_, _, _| 17);
        let overlay = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 255]));
        let out = composite_overlay(&content, &overlay).unwrap();
        assert_eq!(out.to_rgb().get_pixel(1, 1).0, [200, 100, 50]);
    }

    #[test]
    fn half_alpha_blends() {
        let content = Channels::from_fn(Size::new(1, 1), |_, _, _| 0);
        let overlay = RgbaImage::from_pixel(1, 1, Rgba([200, 100, 50, 51]));
        // a = 0.2
        let out = composite_overlay(&content, &overlay).unwrap();
        assert_eq!(out.get(0, 0, 0), 40);
        assert_eq!(out.get(1, 0, 0), 20);
        assert_eq!(out.get(2, 0, 0), 10);
    }

    #[test]
    fn overlay_size_must_match() {
        let content = Channels::new(Size::new(2, 2));
        let overlay = RgbaImage::new(3, 2);
        assert!(composite_overlay(&content, &overlay).is_err());
    }

    #[test]
    fn random_samples_are_deterministic_for_a_seed() {
        let overlay = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 128]));
        let a = random_samples(&overlay, 3, &mut ChaCha8Rng::seed_from_u64(1));
        let b = random_samples(&overlay, 3, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
        // Half-opaque white keeps every value in the upper half.
        assert!(a.iter().flat_map(Channels::data).all(|&v| v >= 128));
    }

    #[test]
    fn random_samples_carry_the_overlay() {
        let overlay = RgbaImage::from_fn(3, 1, |x, _| {
            if x == 1 {
                Rgba([200, 100, 50, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let samples = random_samples(&overlay, 5, &mut ChaCha8Rng::seed_from_u64(9));
        for sample in &samples {
            assert_eq!(sample.size(), Size::new(3, 1));
            assert_eq!(
                [sample.get(0, 1, 0), sample.get(1, 1, 0), sample.get(2, 1, 0)],
                [200, 100, 50]
            );
        }
        // Random content differs between samples where the overlay is transparent.
        assert!(samples.iter().any(|s| s.get(0, 0, 0) != samples[0].get(0, 0, 0)));
    }
}
