//! Statistics to watermark model: mask, gap filling, alpha and colour.

use image::RgbImage;
use tracing::{debug, info};

use crate::channels::{Channels, Size};
use crate::error::{Error, Result};
use crate::gap_fill::{self, GapFiller};
use crate::mask::VarianceMask;
use crate::progress::{ProgressCallback, Stage};
use crate::solver::{AlphaSolver, ColorSolver, Inverter};
use crate::statistics::{self, SampleCorpus};

/// Tunables of the mask and gap-filling stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimationOptions {
    /// Normalized variance below which a pixel is fully masked (`v1`).
    pub low_variance: u8,
    /// Normalized variance at or above which a pixel is fully trusted (`v2`).
    pub high_variance: u8,
    /// Gap-filling search radius in pixels.
    pub radius: u32,
}

impl Default for EstimationOptions {
    fn default() -> Self {
        Self {
            low_variance: 48,
            high_variance: 128,
            radius: 12,
        }
    }
}

impl EstimationOptions {
    /// Check threshold ordering and radius.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] if `low_variance >= high_variance`
    /// or `radius` is outside `1..=`[`gap_fill::MAX_RADIUS`].
    pub fn validate(&self) -> Result<()> {
        if self.low_variance >= self.high_variance {
            return Err(Error::InvalidOptions(format!(
                "low variance threshold ({}) must be below high threshold ({})",
                self.low_variance, self.high_variance
            )));
        }
        gap_fill::check_radius(self.radius)
    }
}

/// Every map derived from a sample corpus.
///
/// Built once per run and shared read-only by every target.
#[derive(Debug, Clone)]
pub struct WatermarkModel {
    /// Per-pixel mean over the samples.
    pub expected_value: Channels,
    /// Normalized per-pixel variance over the samples.
    pub variance: Channels,
    /// Expected value with watermarked pixels filled in from neighbours.
    pub clean_expected_value: Channels,
    /// Variance with watermarked pixels filled in from neighbours.
    pub clean_variance: Channels,
    /// Watermark opacity, 0 (transparent) to 255 (opaque).
    pub alpha: Channels,
    /// Watermark colour.
    pub color: Channels,
}

impl WatermarkModel {
    /// Aggregate `corpus` and solve for the watermark.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] for invalid `opts`.
    pub fn from_corpus(
        corpus: &SampleCorpus,
        opts: &EstimationOptions,
        progress: &ProgressCallback,
    ) -> Result<Self> {
        opts.validate()?;
        info!(samples = corpus.len(), size = %corpus.size(), "aggregating samples");
        let ev = statistics::expected_value(corpus, progress);
        let variance = statistics::variance(corpus, &ev, progress)?;
        Self::estimate(ev, variance, opts, progress)
    }

    /// Solve for the watermark from precomputed expected-value and variance maps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if the maps differ in size and
    /// [`Error::InvalidOptions`] for invalid `opts`.
    pub fn estimate(
        expected_value: Channels,
        variance: Channels,
        opts: &EstimationOptions,
        progress: &ProgressCallback,
    ) -> Result<Self> {
        opts.validate()?;
        variance.ensure_size(expected_value.size(), "variance map")?;

        let mask = VarianceMask::new(&variance, opts.low_variance, opts.high_variance)?;
        let filler = GapFiller::new(opts.radius)?;

        info!(radius = opts.radius, "filling watermarked regions");
        let clean_expected_value = filler.fill(&expected_value, &mask, Stage::FillExpectedValue, progress);
        let clean_variance = filler.fill(&variance, &mask, Stage::FillVariance, progress);

        info!("solving watermark alpha and color");
        let alpha = AlphaSolver::new(&variance, &clean_variance)?.solve(progress);
        let color = ColorSolver::new(&expected_value, &clean_expected_value, &alpha)?.solve(progress);

        let covered = alpha.data().iter().filter(|&&a| a > 0).count();
        debug!(covered, total = alpha.data().len(), "samples with non-zero alpha");

        Ok(Self {
            expected_value,
            variance,
            clean_expected_value,
            clean_variance,
            alpha,
            color,
        })
    }

    /// Size shared by every map and every target.
    #[must_use]
    pub fn size(&self) -> Size {
        self.alpha.size()
    }

    /// Inverter over this model's alpha and colour maps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if the alpha and colour maps were
    /// replaced with maps of different sizes.
    pub fn inverter(&self) -> Result<Inverter<'_>> {
        Inverter::new(&self.alpha, &self.color)
    }

    /// Remove the watermark from one target image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if `target` differs from [`Self::size`].
    pub fn remove(&self, target: &RgbImage) -> Result<RgbImage> {
        self.inverter()?.invert_rgb(target)
    }

    /// Named maps in output order, for saving or inspection.
    #[must_use]
    pub fn maps(&self) -> [(&'static str, &Channels); 6] {
        [
            ("expected_value", &self.expected_value),
            ("variance", &self.variance),
            ("no_watermark_expected_value", &self.clean_expected_value),
            ("no_watermark_variance", &self.clean_variance),
            ("watermark_alpha", &self.alpha),
            ("watermark_color", &self.color),
        ]
    }
}
