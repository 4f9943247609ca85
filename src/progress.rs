//! Progress reporting for the estimation pipeline.

use std::sync::Arc;

/// Stage of the estimation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Accumulating the expected-value map over the samples.
    ExpectedValue,
    /// Accumulating squared deviations over the samples.
    Variance,
    /// Gap-filling the expected-value map.
    FillExpectedValue,
    /// Gap-filling the variance map.
    FillVariance,
    /// Solving the watermark alpha map.
    Alpha,
    /// Solving the watermark colour map.
    Color,
    /// Inverting the composite on target images.
    Invert,
}

/// Progress information for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Stage being reported.
    pub stage: Stage,
    /// Completed units of work.
    pub completed: usize,
    /// Total units of work for the stage.
    pub total: usize,
}

/// Callback type for progress reporting.
pub type ProgressCallback = Option<Arc<dyn Fn(Progress) + Send + Sync>>;

/// Report progress using the callback if set.
pub fn report_progress(callback: &ProgressCallback, stage: Stage, completed: usize, total: usize) {
    if let Some(f) = callback.as_ref() {
        f(Progress {
            stage,
            completed,
            total,
        });
    }
}
