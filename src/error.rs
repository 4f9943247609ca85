//! Error types for the watermark-estimation crate.

use crate::channels::Size;

/// Errors that can occur while estimating or removing a watermark.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The sample corpus or the target set is empty.
    #[error("insufficient data: {0}")]
    InsufficientData(&'static str),

    /// An image does not match the reference size of the run.
    #[error("{item} has size {actual}, expected {expected}")]
    SizeMismatch {
        /// Name of the offending image or map.
        item: String,
        /// Reference size established for the run.
        expected: Size,
        /// Size of the offending image.
        actual: Size,
    },

    /// Estimation or processing options are out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred while decoding or encoding an image.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
