//! Sample corpus aggregation into expected-value and variance maps.
//!
//! Under the compositing model `observed = a * watermark + (1 - a) * content`
//! the per-pixel mean over many samples mixes the watermark colour with the
//! mean content, while the per-pixel spread is attenuated by `(1 - a)^2`.

use tracing::debug;

use crate::channels::{round_intensity, Channels, Size, CHANNELS};
use crate::error::{Error, Result};
use crate::progress::{report_progress, ProgressCallback, Stage};

/// An ordered, non-empty set of equally sized sample images.
#[derive(Debug, Clone)]
pub struct SampleCorpus {
    size: Size,
    samples: Vec<Channels>,
}

impl SampleCorpus {
    /// Build a corpus, checking every sample against the reference `size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientData`] if `samples` is empty and
    /// [`Error::SizeMismatch`] if any sample differs from `size`.
    pub fn new(size: Size, samples: Vec<Channels>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::InsufficientData("sample corpus is empty"));
        }
        for (i, sample) in samples.iter().enumerate() {
            sample.ensure_size(size, &format!("sample #{i}"))?;
        }
        Ok(Self { size, samples })
    }

    /// Keep at most `max` samples. A corpus never shrinks below one sample.
    pub fn truncate(&mut self, max: usize) {
        self.samples.truncate(max.max(1));
    }

    /// Reference size of every sample.
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always `false`; a corpus holds at least one sample.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The samples in corpus order.
    #[must_use]
    pub fn samples(&self) -> &[Channels] {
        &self.samples
    }
}

/// Add `term(i, values[i])` to every accumulator.
fn accumulate<F>(sums: &mut [i64], values: &[i32], term: F)
where
    F: Fn(usize, i32) -> i64 + Sync,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        sums.par_iter_mut()
            .zip(values.par_iter())
            .enumerate()
            .for_each(|(i, (sum, &v))| *sum += term(i, v));
    }

    #[cfg(not(feature = "parallel"))]
    {
        for (i, (sum, &v)) in sums.iter_mut().zip(values).enumerate() {
            *sum += term(i, v);
        }
    }
}

/// Per-channel, per-pixel mean over the corpus, rounded to the nearest integer.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn expected_value(corpus: &SampleCorpus, progress: &ProgressCallback) -> Channels {
    let size = corpus.size();
    let total = corpus.len();
    let mut sums = vec![0_i64; CHANNELS * size.pixel_count()];

    for (i, sample) in corpus.samples().iter().enumerate() {
        accumulate(&mut sums, sample.data(), |_, v| i64::from(v));
        report_progress(progress, Stage::ExpectedValue, i + 1, total);
    }

    let n = total as f64;
    Channels::from_flat_fn(size, |i| round_intensity(sums[i] as f64 / n))
}

/// Per-channel sum of squared deviations from `ev`, normalized to `[0, 255]`.
///
/// Each channel is divided by its own maximum and scaled to 255, so values
/// are only comparable within one map. A channel whose maximum is zero
/// (identical samples, or a single-sample corpus) is all zero.
///
/// # Errors
///
/// Returns [`Error::SizeMismatch`] if `ev` does not match the corpus size.
#[allow(clippy::cast_precision_loss)]
pub fn variance(corpus: &SampleCorpus, ev: &Channels, progress: &ProgressCallback) -> Result<Channels> {
    let size = corpus.size();
    ev.ensure_size(size, "expected-value map")?;

    let total = corpus.len();
    let mean = ev.data();
    let mut raw = vec![0_i64; CHANNELS * size.pixel_count()];

    for (i, sample) in corpus.samples().iter().enumerate() {
        accumulate(&mut raw, sample.data(), |k, v| {
            let d = i64::from(mean[k] - v);
            d * d
        });
        report_progress(progress, Stage::Variance, i + 1, total);
    }

    let plane = size.pixel_count();
    let maxima: Vec<i64> = raw
        .chunks(plane.max(1))
        .map(|channel| channel.iter().copied().max().unwrap_or(0))
        .collect();
    debug!(?maxima, "raw variance maxima per channel");

    Ok(Channels::from_flat_fn(size, |i| {
        let max = maxima[i / plane];
        if max == 0 {
            0
        } else {
            round_intensity(255.0 * raw[i] as f64 / max as f64)
        }
    }))
}
