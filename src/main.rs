use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use ndarray::Array3;

use paravision::engine::{self, FilterOutput, Variant};
use paravision::filters::grayscale::GrayscaleMethod;
use paravision::{FilterConfig, TimingRecord};

/// Apply a high-pass (edge) filter with a sequential, threaded or
/// message-passing engine and report how long it took.
#[derive(Parser, Debug)]
#[command(name = "hpf")]
#[command(about = "High-pass filter an image and time it")]
struct Args {
    /// Input image (any format the image crate decodes)
    input: PathBuf,

    /// Output image; only written if the pass succeeds
    #[arg(default_value = "HPF_outputRes.png")]
    output: PathBuf,

    /// Execution mode: seq, omp (threads) or mpi (ranks)
    #[arg(short, long)]
    mode: Option<Variant>,

    /// Odd kernel size, 3-11
    #[arg(short, long)]
    kernel_size: Option<usize>,

    /// Thread or process count for the parallel modes
    #[arg(short = 'n', long)]
    workers: Option<usize>,

    /// JSON config file, overridden by environment and flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds allowed for gathering every rank reply in mpi mode
    #[arg(long)]
    timeout: Option<f64>,

    /// Filter every color channel instead of converting to grayscale
    #[arg(long)]
    keep_color: bool,

    /// Grayscale reduction: average or bt709
    #[arg(long, default_value = "average")]
    gray: GrayscaleMethod,

    /// Write the timing report here (time.txt format)
    #[arg(long)]
    time_file: Option<PathBuf>,

    /// Print the timing record as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = build_config(&args)?;
    config.validate()?;

    let workers = config.workers();
    if let Ok(hw) = std::thread::available_parallelism() {
        if workers > hw.get() {
            warn!("{workers} workers requested but only {} cores available", hw.get());
        }
    }

    let input = load_image(&args.input, args.keep_color, args.gray)?;
    let (height, width, channels) = input.dim();
    info!(
        "running {} filter on {} ({height}x{width}x{channels}), k={}, workers={workers}",
        config.variant,
        args.input.display(),
        config.kernel_size,
    );

    let timing = filter_and_save(&args.output, || engine::run(input.view(), &config))
        .with_context(|| format!("{} pass failed", config.variant))?;

    if args.json {
        println!("{}", timing.to_json()?);
    } else {
        timing.write_report(std::io::stdout().lock())?;
    }
    if let Some(path) = &args.time_file {
        let file = File::create(path)
            .with_context(|| format!("creating time file {}", path.display()))?;
        timing.write_report(BufWriter::new(file))?;
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<FilterConfig> {
    let mut config = match &args.config {
        Some(path) => FilterConfig::from_json_file(path)?,
        None => FilterConfig::default(),
    };
    config.apply_env()?;

    if let Some(mode) = args.mode {
        config.variant = mode;
    }
    if let Some(k) = args.kernel_size {
        config.kernel_size = k;
    }
    if let Some(n) = args.workers {
        config = config.with_workers(n);
    }
    if let Some(secs) = args.timeout {
        let timeout = Duration::try_from_secs_f64(secs)
            .map_err(|e| anyhow!("invalid timeout {secs}: {e}"))?;
        config = config.with_worker_timeout(timeout);
    }
    Ok(config)
}

/// Run `pass` and encode its image to `path`. A failed pass writes nothing.
fn filter_and_save<F>(path: &Path, pass: F) -> Result<TimingRecord>
where
    F: FnOnce() -> paravision::Result<FilterOutput>,
{
    let output = pass()?;
    save_image(path, output.image)?;
    info!("high-pass filtered image saved to {}", path.display());
    Ok(output.timing)
}

fn load_image(path: &Path, keep_color: bool, gray: GrayscaleMethod) -> Result<Array3<u8>> {
    let decoded = image::open(path).with_context(|| format!("cannot load image {}", path.display()))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    let color = Array3::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw())
        .context("decoded image has inconsistent dimensions")?;

    if keep_color {
        Ok(color)
    } else {
        Ok(gray.apply(color.view()))
    }
}

fn save_image(path: &Path, buffer: Array3<u8>) -> Result<()> {
    let (height, width, channels) = buffer.dim();
    let (data, _) = buffer.into_raw_vec_and_offset();
    let (width, height) = (width as u32, height as u32);

    let saved = match channels {
        1 => image::GrayImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("output buffer does not match {width}x{height}"))?
            .save(path),
        3 => image::RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("output buffer does not match {width}x{height}"))?
            .save(path),
        n => bail!("cannot encode {n}-channel output"),
    };
    saved.with_context(|| format!("writing {}", path.display()))
}
