//! Single-threaded engine: one pass over the whole image on the calling thread.

use log::{debug, info};
use ndarray::ArrayView3;

use super::{FilterOutput, Variant};
use crate::config::FilterConfig;
use crate::error::Result;
use crate::filters::core::{alloc_output, convolve_rows, validate_image};
use crate::filters::kernel::build_high_pass_kernel;
use crate::timing::Stopwatch;

/// Filter `image` sequentially.
///
/// Only `config.kernel_size` is used. Timing covers the convolution pass.
pub fn run(image: ArrayView3<u8>, config: &FilterConfig) -> Result<FilterOutput> {
    config.validate_for(Variant::Sequential)?;
    validate_image(&image)?;
    let kernel = build_high_pass_kernel(config.kernel_size)?;
    let (height, width, channels) = image.dim();
    debug!("sequential: {height}x{width}x{channels}, k={}", kernel.size());

    let mut output = alloc_output(image.dim())?;

    let stopwatch = Stopwatch::start();
    convolve_rows(image, &kernel, 0..height, output.view_mut());
    let timing = stopwatch.finish(Variant::Sequential, kernel.size(), 1);

    info!("sequential pass finished in {:.3} ms", timing.elapsed_ms());
    Ok(FilterOutput {
        image: output,
        timing,
    })
}
