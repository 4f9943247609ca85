//! Estimate and remove a fixed-position, semi-transparent watermark.
//!
//! Given a corpus of sample images that all carry the same overlay at the
//! same position, the per-pixel mean and variance across the corpus reveal
//! the overlay: opacity attenuates cross-sample variance by `(1 - alpha)^2`.
//! Low-variance pixels are masked and filled in from their neighbours to
//! estimate what the statistics would be without the watermark, which gives
//! per-pixel alpha and colour. Each target is then cleaned by inverting the
//! alpha composite.
//!
//! # Quick Start
//!
//! ```no_run
//! use watermark_estimation::{DirectoryLayout, ProcessOptions, WatermarkEngine};
//!
//! let engine = WatermarkEngine::new(ProcessOptions::default()).expect("valid options");
//! let results = engine
//!     .run(&DirectoryLayout::under(".".as_ref()))
//!     .expect("estimation failed");
//! for r in results {
//!     println!("{}: {}", r.path.display(), r.message);
//! }
//! ```
//!
//! # In-memory use
//!
//! ```no_run
//! use watermark_estimation::{Channels, EstimationOptions, SampleCorpus, Size, WatermarkModel};
//!
//! # let samples: Vec<Channels> = Vec::new();
//! let corpus = SampleCorpus::new(Size::new(640, 480), samples).unwrap();
//! let model = WatermarkModel::from_corpus(&corpus, &EstimationOptions::default(), &None).unwrap();
//! let target = image::open("target.jpg").unwrap().to_rgb8();
//! let cleaned = model.remove(&target).unwrap();
//! cleaned.save("cleaned.png").unwrap();
//! ```

#![deny(missing_docs)]

pub mod channels;
mod engine;
pub mod error;
pub mod gap_fill;
pub mod mask;
mod pipeline;
pub mod progress;
pub mod solver;
pub mod statistics;
pub mod synthetic;

pub use channels::{Channels, Size};
pub use engine::{
    cleaned_output_path, is_supported_image, list_images, load_rgb, save_image, save_maps,
    DirectoryLayout, MapCache, ProcessOptions, ProcessResult, WatermarkEngine,
    EXPECTED_VALUE_MAP, VARIANCE_MAP,
};
pub use error::{Error, Result};
pub use pipeline::{EstimationOptions, WatermarkModel};
pub use statistics::SampleCorpus;
