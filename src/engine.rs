//! Directory-level batch processing: load, estimate, cache, clean, save.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::{debug, info, warn};

use crate::channels::{ensure_size, Channels, Size};
use crate::error::{Error, Result};
use crate::pipeline::{EstimationOptions, WatermarkModel};
use crate::progress::{report_progress, ProgressCallback, Stage};
use crate::statistics::{self, SampleCorpus};

/// Cache file stem of the expected-value map.
pub const EXPECTED_VALUE_MAP: &str = "expected_value";
/// Cache file stem of the variance map.
pub const VARIANCE_MAP: &str = "variance";

/// Options controlling a batch run.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Reference size; inferred from the first target when `None`.
    pub size: Option<Size>,
    /// Use at most this many samples.
    pub max_samples: Option<usize>,
    /// Mask and gap-filling tunables.
    pub estimation: EstimationOptions,
    /// Read and write precomputed expected-value and variance maps.
    pub use_cache: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            size: None,
            max_samples: None,
            estimation: EstimationOptions::default(),
            use_cache: true,
        }
    }
}

impl ProcessOptions {
    /// Check every option.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] for a zero sample limit or invalid
    /// estimation options.
    pub fn validate(&self) -> Result<()> {
        if self.max_samples == Some(0) {
            return Err(Error::InvalidOptions("max samples must be positive".into()));
        }
        self.estimation.validate()
    }
}

/// Where samples, targets, outputs and cached maps live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    /// Sample corpus sharing the watermark.
    pub samples: PathBuf,
    /// Images to clean.
    pub targets: PathBuf,
    /// Derived maps and cleaned images.
    pub outputs: PathBuf,
    /// Previously computed expected-value and variance maps.
    pub precomputed: PathBuf,
}

impl DirectoryLayout {
    /// The conventional `samples/ targets/ outputs/ precomputed/` layout under `root`.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            samples: root.join("samples"),
            targets: root.join("targets"),
            outputs: root.join("outputs"),
            precomputed: root.join("precomputed"),
        }
    }
}

/// Result of processing a single target file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the file was skipped (wrong size).
    pub skipped: bool,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            skipped: false,
            message: String::new(),
        }
    }
}

/// PNG maps stored between runs, keyed by file stem.
#[derive(Debug, Clone)]
pub struct MapCache {
    dir: PathBuf,
}

impl MapCache {
    /// Cache rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File backing the map called `name`.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.png"))
    }

    /// Load `name` if it exists, decodes and has size `size`.
    ///
    /// Any failure is a cache miss, never an error.
    #[must_use]
    pub fn load(&self, name: &str, size: Size) -> Option<Channels> {
        let path = self.path_for(name);
        if !path.is_file() {
            debug!(path = %path.display(), "no cached map");
            return None;
        }
        let img = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "unreadable cached map");
                return None;
            }
        };
        if let Err(e) = ensure_size(Size::of(&img), size, name) {
            debug!(error = %e, "ignoring cached map");
            return None;
        }
        info!(path = %path.display(), "using cached map");
        Some(Channels::from_rgb(&img))
    }

    /// Store `map` under `name`, creating the cache directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn store(&self, name: &str, map: &Channels) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        save_image(&map.to_rgb(), &self.path_for(name))
    }
}

/// Batch driver tying the estimation pipeline to a directory layout.
pub struct WatermarkEngine {
    opts: ProcessOptions,
    progress: ProgressCallback,
}

impl WatermarkEngine {
    /// Create an engine after validating `opts`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] if `opts` are out of range.
    pub fn new(opts: ProcessOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self {
            opts,
            progress: None,
        })
    }

    /// Attach a progress observer.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Estimate the watermark from `layout.samples` and clean every target.
    ///
    /// Derived maps and cleaned images are written to `layout.outputs`.
    /// Targets of the wrong size are skipped and reported in their
    /// [`ProcessResult`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientData`] when there are no samples or no
    /// targets (or no sample of the reference size), and I/O or codec
    /// errors for the derived maps.
    pub fn run(&self, layout: &DirectoryLayout) -> Result<Vec<ProcessResult>> {
        let samples = list_images(&layout.samples)?;
        let targets = list_images(&layout.targets)?;
        info!(
            samples = samples.len(),
            targets = targets.len(),
            "found input images"
        );
        if samples.is_empty() {
            return Err(Error::InsufficientData("no sample images found"));
        }
        if targets.is_empty() {
            return Err(Error::InsufficientData("no target images found"));
        }

        let size = self.reference_size(&targets)?;
        info!(%size, "reference image size");

        let model = self.build_model(&samples, &layout.precomputed, size)?;
        save_maps(&model, &layout.outputs)?;

        Ok(self.clean_targets(&model, &targets, &layout.outputs))
    }

    /// Explicit size, or the size of the first target.
    fn reference_size(&self, targets: &[PathBuf]) -> Result<Size> {
        if let Some(size) = self.opts.size {
            return Ok(size);
        }
        let first = targets
            .first()
            .ok_or(Error::InsufficientData("no target images found"))?;
        let (width, height) = image::image_dimensions(first)?;
        Ok(Size::new(width, height))
    }

    /// Load every sample of the reference size; others are skipped.
    ///
    /// The corpus keeps at most `max_samples` of the usable samples, in
    /// file-name order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientData`] if no sample could be used.
    pub fn load_corpus(&self, samples: &[PathBuf], size: Size) -> Result<SampleCorpus> {
        let mut loaded = Vec::with_capacity(samples.len());
        for path in samples {
            match load_rgb(path, size) {
                Ok(img) => {
                    debug!(path = %path.display(), "loaded sample");
                    loaded.push(Channels::from_rgb(&img));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping sample"),
            }
        }
        if loaded.is_empty() {
            return Err(Error::InsufficientData("no usable sample images"));
        }
        let mut corpus = SampleCorpus::new(size, loaded)?;
        if let Some(max) = self.opts.max_samples {
            corpus.truncate(max);
        }
        Ok(corpus)
    }

    /// Expected-value and variance maps from the cache or the samples,
    /// then the remaining pipeline stages.
    fn build_model(&self, samples: &[PathBuf], precomputed: &Path, size: Size) -> Result<WatermarkModel> {
        let cache = MapCache::new(precomputed);
        let (mut ev, mut variance) = if self.opts.use_cache {
            (
                cache.load(EXPECTED_VALUE_MAP, size),
                cache.load(VARIANCE_MAP, size),
            )
        } else {
            (None, None)
        };

        if ev.is_none() || variance.is_none() {
            let corpus = self.load_corpus(samples, size)?;
            info!(samples = corpus.len(), "aggregating samples");

            let mean = match ev {
                Some(mean) => mean,
                None => {
                    let mean = statistics::expected_value(&corpus, &self.progress);
                    self.store_cached(&cache, EXPECTED_VALUE_MAP, &mean);
                    mean
                }
            };
            if variance.is_none() {
                let var = statistics::variance(&corpus, &mean, &self.progress)?;
                self.store_cached(&cache, VARIANCE_MAP, &var);
                variance = Some(var);
            }
            ev = Some(mean);
        }

        match (ev, variance) {
            (Some(ev), Some(variance)) => {
                WatermarkModel::estimate(ev, variance, &self.opts.estimation, &self.progress)
            }
            _ => Err(Error::InsufficientData("expected-value or variance map unavailable")),
        }
    }

    fn store_cached(&self, cache: &MapCache, name: &str, map: &Channels) {
        if !self.opts.use_cache {
            return;
        }
        if let Err(e) = cache.store(name, map) {
            warn!(map = name, error = %e, "failed to store precomputed map");
        }
    }

    /// Clean every target, one [`ProcessResult`] per file.
    fn clean_targets(&self, model: &WatermarkModel, targets: &[PathBuf], output_dir: &Path) -> Vec<ProcessResult> {
        let total = targets.len();
        let done = AtomicUsize::new(0);
        let process = |input: &PathBuf| {
            let output = cleaned_output_path(input, output_dir);
            let result = self.process_file(model, input, &output);
            let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
            report_progress(&self.progress, Stage::Invert, completed, total);
            result
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            targets.par_iter().map(process).collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            targets.iter().map(process).collect()
        }
    }

    /// Process a single target: load, check size, invert, save.
    #[must_use]
    pub fn process_file(&self, model: &WatermarkModel, input: &Path, output: &Path) -> ProcessResult {
        let mut result = ProcessResult::new(input);

        let img = match load_rgb(input, model.size()) {
            Ok(img) => img,
            Err(e @ Error::SizeMismatch { .. }) => {
                warn!(path = %input.display(), error = %e, "skipping target");
                result.skipped = true;
                result.message = e.to_string();
                return result;
            }
            Err(e) => {
                result.message = format!("Failed to load: {e}");
                return result;
            }
        };

        let cleaned = match model.remove(&img) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                result.message = format!("Failed to clean: {e}");
                return result;
            }
        };

        match save_image(&cleaned, output) {
            Ok(()) => {
                debug!(path = %output.display(), "saved cleaned image");
                result.success = true;
                result.message = format!("Saved {}", output.display());
            }
            Err(e) => {
                result.message = format!("Failed to save: {e}");
            }
        }

        result
    }
}

/// Write every map of `model` to `output_dir` as PNG.
///
/// # Errors
///
/// Returns an error if the directory or any file cannot be written.
pub fn save_maps(model: &WatermarkModel, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    for (name, map) in model.maps() {
        let path = output_dir.join(format!("{name}.png"));
        save_image(&map.to_rgb(), &path)?;
        debug!(path = %path.display(), "saved map");
    }
    Ok(())
}

/// Decode `path` as RGB and check it against `size`.
///
/// # Errors
///
/// Returns a codec error, or [`Error::SizeMismatch`] naming the file.
pub fn load_rgb(path: &Path, size: Size) -> Result<RgbImage> {
    let img = image::open(path)?.to_rgb8();
    ensure_size(Size::of(&img), size, &path.display().to_string())?;
    Ok(img)
}

/// Supported images directly inside `dir`, sorted by path.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be read.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| is_supported_image(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(img)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            DynamicImage::ImageRgb8(img.clone()).save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Output path for a cleaned target inside `output_dir`.
///
/// Example: `"targets/photo.jpg"` becomes `"<output_dir>/photo_cleaned.jpg"`.
#[must_use]
pub fn cleaned_output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    output_dir.join(format!("{stem}_cleaned.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaned_output_path_appends_suffix() {
        let p = cleaned_output_path(Path::new("/data/targets/photo.jpg"), Path::new("/data/outputs"));
        assert_eq!(p, PathBuf::from("/data/outputs/photo_cleaned.jpg"));
    }

    #[test]
    fn layout_under_root_uses_conventional_names() {
        let layout = DirectoryLayout::under(Path::new("/work"));
        assert_eq!(layout.samples, PathBuf::from("/work/samples"));
        assert_eq!(layout.targets, PathBuf::from("/work/targets"));
        assert_eq!(layout.outputs, PathBuf::from("/work/outputs"));
        assert_eq!(layout.precomputed, PathBuf::from("/work/precomputed"));
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("photo.gif")));
        assert!(!is_supported_image(Path::new("photo.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }

    #[test]
    fn zero_max_samples_is_invalid() {
        let opts = ProcessOptions {
            max_samples: Some(0),
            ..ProcessOptions::default()
        };
        assert!(WatermarkEngine::new(opts).is_err());
    }

    #[test]
    fn oversized_radius_is_invalid() {
        let opts = ProcessOptions {
            estimation: EstimationOptions {
                radius: 100_000,
                ..EstimationOptions::default()
            },
            ..ProcessOptions::default()
        };
        assert!(matches!(WatermarkEngine::new(opts), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn cache_round_trips_and_checks_size() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MapCache::new(dir.path().join("precomputed"));
        let size = Size::new(5, 4);
        let map = Channels::from_fn(size, |c, x, y| i32::try_from(c * 60 + (x * y) as usize).unwrap());

        assert!(cache.load(VARIANCE_MAP, size).is_none());
        cache.store(VARIANCE_MAP, &map).unwrap();

        assert_eq!(cache.load(VARIANCE_MAP, size), Some(map));
        assert!(cache.load(VARIANCE_MAP, Size::new(4, 5)).is_none());
    }

    #[test]
    fn unreadable_cache_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MapCache::new(dir.path());
        std::fs::write(cache.path_for(EXPECTED_VALUE_MAP), b"not a png").unwrap();
        assert!(cache.load(EXPECTED_VALUE_MAP, Size::new(1, 1)).is_none());
    }

    #[test]
    fn list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let found = list_images(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.jpg", "b.png"]);
    }

    #[test]
    fn save_image_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::new(2, 2);
        assert!(save_image(&img, &dir.path().join("out.xyz")).is_err());
    }
}
