use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use watermark_estimation::gap_fill::MAX_RADIUS;
use watermark_estimation::progress::{Progress, ProgressCallback};
use watermark_estimation::synthetic;
use watermark_estimation::{
    save_image, DirectoryLayout, EstimationOptions, ProcessOptions, ProcessResult, Size,
    WatermarkEngine,
};

#[derive(Parser)]
#[command(
    name = "wm-remover",
    about = "Estimate a shared semi-transparent watermark from sample images and remove it",
    version,
    after_help = "Expects <root>/samples (images sharing the watermark) and <root>/targets \
                  (images to clean).\nDerived maps and cleaned images go to <root>/outputs; \
                  <root>/precomputed caches the expected-value and variance maps."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate the watermark and clean every target
    Remove(RemoveArgs),
    /// Generate synthetic watermarked samples from an RGBA overlay
    Synth(SynthArgs),
}

#[derive(Args)]
struct RemoveArgs {
    /// Working directory holding samples/, targets/, outputs/ and precomputed/
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Sample directory (default: <root>/samples)
    #[arg(long)]
    samples: Option<PathBuf>,

    /// Target directory (default: <root>/targets)
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Output directory (default: <root>/outputs)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Cache directory (default: <root>/precomputed)
    #[arg(long)]
    precomputed: Option<PathBuf>,

    /// Reference size as WIDTHxHEIGHT (default: size of the first target)
    #[arg(long)]
    size: Option<Size>,

    /// Use at most this many samples
    #[arg(short = 'n', long)]
    max_samples: Option<usize>,

    /// Variance below which a pixel is treated as watermarked (0-255)
    #[arg(long, default_value_t = EstimationOptions::default().low_variance)]
    low_variance: u8,

    /// Variance at or above which a pixel is treated as clean (0-255)
    #[arg(long, default_value_t = EstimationOptions::default().high_variance)]
    high_variance: u8,

    /// Gap-filling search radius in pixels
    #[arg(
        short,
        long,
        default_value_t = EstimationOptions::default().radius,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_RADIUS))
    )]
    radius: u32,

    /// Ignore and do not write precomputed maps
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct SynthArgs {
    /// RGBA overlay image; its alpha channel is the watermark opacity
    #[arg(long)]
    overlay: PathBuf,

    /// Number of samples to generate
    #[arg(short = 'n', long, default_value_t = 100)]
    count: usize,

    /// Seed for reproducible content
    #[arg(long)]
    seed: Option<u64>,

    /// Directory to write the samples to
    #[arg(short, long, default_value = "samples")]
    output: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let code = match cli.command {
        Command::Remove(args) => remove(&args, cli.quiet),
        Command::Synth(args) => synth(&args),
    };
    process::exit(code);
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn stage_logger() -> ProgressCallback {
    Some(Arc::new(|p: Progress| {
        if p.completed == p.total {
            debug!(stage = ?p.stage, total = p.total, "stage complete");
        }
    }))
}

fn remove(args: &RemoveArgs, quiet: bool) -> i32 {
    let mut layout = DirectoryLayout::under(&args.root);
    if let Some(p) = &args.samples {
        layout.samples.clone_from(p);
    }
    if let Some(p) = &args.targets {
        layout.targets.clone_from(p);
    }
    if let Some(p) = &args.output {
        layout.outputs.clone_from(p);
    }
    if let Some(p) = &args.precomputed {
        layout.precomputed.clone_from(p);
    }

    let opts = ProcessOptions {
        size: args.size,
        max_samples: args.max_samples,
        estimation: EstimationOptions {
            low_variance: args.low_variance,
            high_variance: args.high_variance,
            radius: args.radius,
        },
        use_cache: !args.no_cache,
    };

    let engine = match WatermarkEngine::new(opts) {
        Ok(e) => e.with_progress(stage_logger()),
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };

    let results = match engine.run(&layout) {
        Ok(results) => results,
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, quiet);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if !quiet {
        eprintln!();
        eprint!("[Summary] Cleaned: {success_count}");
        if skip_count > 0 {
            eprint!(", Skipped: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    i32::from(fail_count > 0)
}

fn print_result(result: &ProcessResult, quiet: bool) {
    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.skipped {
        eprintln!("[SKIP] {filename}: {}", result.message);
    } else if result.success {
        if !quiet {
            eprintln!("[OK] {filename}");
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }
}

fn synth(args: &SynthArgs) -> i32 {
    match write_synthetic(args) {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            1
        }
    }
}

fn write_synthetic(args: &SynthArgs) -> watermark_estimation::Result<()> {
    let overlay = synthetic::load_overlay(&args.overlay)?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    std::fs::create_dir_all(&args.output)?;
    let samples = synthetic::random_samples(&overlay, args.count, &mut rng);
    for (i, sample) in samples.iter().enumerate() {
        let path = sample_path(&args.output, i);
        save_image(&sample.to_rgb(), &path)?;
        debug!(path = %path.display(), "created sample");
    }
    info!(count = samples.len(), dir = %args.output.display(), "generated synthetic samples");
    Ok(())
}

fn sample_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("test_img{index}.png"))
}
