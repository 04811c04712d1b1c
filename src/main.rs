use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, LevelFilter};
use rand::prelude::*;
use rand_pcg::Pcg64;
use simple_logger::SimpleLogger;

use tiltrecon::angles::evenly_spaced;
use tiltrecon::tomo_image::Image;
use tiltrecon::tomo_scan::{project, tilt_series_from_sinograms};
use tiltrecon::{
    CancelToken, Execution, Interpolation, Normalization, ProjectionFilter, ReconstructedSlice,
    ReconstructionConfig, ReconstructionDriver, RunOutcome, Sinogram,
};

////////////////////////////////////////////////////////////////////////
// Main entry point
//

/// Scans a phantom image into a tilt series, reconstructs it slice by
/// slice, and compares the result with the phantom.
#[derive(Parser)]
#[command(version, about = "Tilt-series reconstruction by back-projection")]
struct Opts {
    /// Input image file: the phantom cross-section, extruded along x.
    #[arg(long)]
    input_image: PathBuf,
    /// Number of x-slices in the generated tilt series.
    #[arg(long, default_value_t = 1)]
    slices: usize,
    /// Number of tilt angles. Defaults to the image resolution.
    #[arg(long)]
    angles: Option<usize>,
    /// First tilt angle, in degrees.
    #[arg(long, default_value_t = -70.0, allow_negative_numbers = true)]
    start_angle: f64,
    /// Last tilt angle, in degrees.
    #[arg(long, default_value_t = 70.0, allow_negative_numbers = true)]
    end_angle: f64,
    /// Number of parallel rays per projection. Defaults to the image resolution.
    #[arg(long)]
    rays: Option<usize>,
    /// Side of the reconstructed slices. Defaults to the ray count.
    #[arg(long)]
    size: Option<usize>,
    /// Projection weighting filter: none, ramp, shepp-logan, cosine, hamming or hann.
    #[arg(long, default_value_t = ProjectionFilter::None)]
    filter: ProjectionFilter,
    /// How rays are sampled during back-projection: linear or nearest.
    #[arg(long, default_value_t = Interpolation::Linear)]
    interpolation: Interpolation,
    /// Tilt axis offset from the detector centre, in rays.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    axis_shift: f64,
    /// Tilt axis rotation in the projection plane, in degrees.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    axis_angle: f64,
    /// Leave back-projected sums unnormalised.
    #[arg(long)]
    no_normalize: bool,
    /// Set negative reconstructed values to zero.
    #[arg(long)]
    clip_negative: bool,
    /// How much uniform noise to add to the scan, as fraction of maximum scan value.
    #[arg(long)]
    noise: Option<f64>,
    /// Seed for the random noise (for reproducibility).
    #[arg(long)]
    seed: Option<u64>,
    /// Worker threads. 1 reconstructs serially, in slice order.
    #[arg(long)]
    threads: Option<usize>,
    /// File to write the sinogram of the first slice to.
    #[arg(long)]
    output_scan: Option<PathBuf>,
    /// File to write the first reconstructed slice to.
    #[arg(long)]
    output_image: Option<PathBuf>,
    /// Where to write the diff between input and reconstructed image to.
    #[arg(long)]
    diff_image: Option<PathBuf>,
    /// More logging; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    SimpleLogger::new().with_level(level).init()?;
    Ok(())
}

// Scan the phantom, returning it alongside its sinogram.
fn generate_scan(opts: &Opts) -> Result<(Image, Vec<f64>, Sinogram)> {
    let image = Image::load(&opts.input_image)
        .with_context(|| format!("Could not load {}", opts.input_image.display()))?;
    let resolution = image.width.max(image.height);

    let num_angles = opts.angles.unwrap_or_else(|| {
        info!("--angles not specified, using {}", resolution);
        resolution
    });
    let rays = opts.rays.unwrap_or_else(|| {
        info!("--rays not specified, using {}", resolution);
        resolution
    });
    ensure!(num_angles > 0, "--angles must be at least 1");

    let angles = evenly_spaced(opts.start_angle, opts.end_angle, num_angles);
    let sinogram = project(&image, &angles, rays)?;
    Ok((image, angles, sinogram))
}

fn add_noise(sinogram: &Sinogram, opts: &Opts) -> Result<Sinogram> {
    const DEFAULT_SEED: u64 = 42;

    let Some(noise) = opts.noise else {
        ensure!(opts.seed.is_none(), "--seed can only be used with --noise");
        return Ok(sinogram.clone());
    };
    ensure!(noise >= 0.0, "--noise must not be negative");

    let mut rng = Pcg64::seed_from_u64(opts.seed.unwrap_or(DEFAULT_SEED));
    Ok(sinogram.add_noise(&mut rng, noise))
}

fn build_config(opts: &Opts) -> Result<ReconstructionConfig> {
    let mut config = ReconstructionConfig::default()
        .with_filter(opts.filter)
        .with_interpolation(opts.interpolation)
        .with_clip_negative(opts.clip_negative)
        .with_axis_shift(opts.axis_shift)
        .with_axis_angle(opts.axis_angle);
    if let Some(size) = opts.size {
        config = config.with_output_size(size);
    }
    if opts.no_normalize {
        config = config.with_normalization(Normalization::None);
    }

    let execution = match opts.threads {
        Some(0) => bail!("--threads must be at least 1"),
        Some(1) => Execution::Serial,
        Some(threads) => {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .context("Could not start the worker pool")?;
            Execution::Parallel
        }
        None => Execution::Parallel,
    };
    config = config.with_execution(execution);
    config.validate()?;
    Ok(config)
}

fn calculate_error(base_image: &Image, new_image: &Image) -> Result<()> {
    if (base_image.width, base_image.height) != (new_image.width, new_image.height) {
        eprintln!(
            "Base image size does not match reconstructed image size ({}x{} vs. {}x{}). Not calculating error.",
            base_image.width, base_image.height, new_image.width, new_image.height
        );
        return Ok(());
    }

    let rms_error = base_image.rms_diff(new_image)?;
    println!("RMS of per-pixel error: {}", rms_error);
    Ok(())
}

fn save(image: &Image, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Could not write {}", path.display()))
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();
    init_logging(opts.verbose)?;
    ensure!(opts.slices > 0, "--slices must be at least 1");

    let (input_image, angles, sinogram) = generate_scan(&opts)?;
    let sinogram = add_noise(&sinogram, &opts)?;
    let series = tilt_series_from_sinograms(&vec![sinogram.clone(); opts.slices], &angles)?;
    let config = build_config(&opts)?;

    let mut driver = ReconstructionDriver::new(config);
    let bar = ProgressBar::new(driver.total_progress_steps(&series) as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} slices [{elapsed_precise}]")
            .context("Bad progress bar template")?,
    );
    let progress = |_: usize, _: &ReconstructedSlice| bar.inc(1);
    let outcome = driver.run(&series, &progress, &CancelToken::new())?;
    bar.finish_and_clear();

    let volume = match outcome {
        RunOutcome::Completed(volume) => volume,
        RunOutcome::Canceled { slices_done, .. } => {
            bail!("Reconstruction stopped after {} slices", slices_done)
        }
    };
    let reconstruction = Image::from_slice(&ReconstructedSlice {
        size: volume.size(),
        data: volume.slice(0).to_vec(),
    });

    calculate_error(&input_image, &reconstruction)?;

    if let Some(path) = &opts.output_scan {
        save(&Image::from_sinogram(&sinogram).rescaled(), path)?;
    }

    if let Some(path) = &opts.output_image {
        save(&reconstruction.rescaled(), path)?;
    }

    if let Some(path) = &opts.diff_image {
        // Diffs are offset into the middle of the 0..255 range; "save"
        // clamps anything beyond that.
        let diff = input_image
            .diff(&reconstruction)
            .context("--diff-image needs a reconstruction the same size as the input image")?;
        save(&diff.offset_values(128.0), path)?;
    }

    Ok(())
}
