//! Shared-memory engine.
//!
//! The output buffer is split into disjoint mutable row bands before any
//! thread starts, one band per worker of a dedicated rayon pool. Every worker
//! reads the shared input view and writes only its own band, so there is no
//! locking on either buffer. The rayon scope is the join barrier: the output is
//! handed back only after every band has been written.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use ndarray::{ArrayView3, ArrayViewMut3, Axis};

use super::partition::{partition_rows, PartitionDescriptor};
use super::{FilterOutput, Variant};
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filters::core::{alloc_output, convolve_rows, validate_image};
use crate::filters::kernel::{build_high_pass_kernel, Kernel};
use crate::timing::Stopwatch;

/// Filter `image` with `config.threads` worker threads.
///
/// Thread counts above the hardware concurrency are allowed and only logged.
/// Timing covers the parallel region, not pool construction.
pub fn run(image: ArrayView3<u8>, config: &FilterConfig) -> Result<FilterOutput> {
    run_with(image, config, |band, source, kernel, out| {
        convolve_rows(source, kernel, band.rows.clone(), out)
    })
}

/// Same as [`run`] with the per-band computation supplied by the caller.
pub(crate) fn run_with<F>(image: ArrayView3<u8>, config: &FilterConfig, compute: F) -> Result<FilterOutput>
where
    F: Fn(&PartitionDescriptor, ArrayView3<u8>, &Kernel, ArrayViewMut3<u8>) + Sync,
{
    config.validate_for(Variant::SharedMemory)?;
    validate_image(&image)?;
    let kernel = build_high_pass_kernel(config.kernel_size)?;
    let threads = config.threads;
    if let Ok(hw) = std::thread::available_parallelism() {
        if threads > hw.get() {
            warn!("shared: {threads} threads requested, {} available; oversubscribing", hw.get());
        }
    }

    let (height, width, channels) = image.dim();
    let bands = partition_rows(height, threads, 0)?;
    debug!(
        "shared: {height}x{width}x{channels}, k={}, bands={:?}",
        kernel.size(),
        bands.iter().map(|b| b.rows.clone()).collect::<Vec<_>>()
    );

    let mut output = alloc_output(image.dim())?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("hpf-shared-{i}"))
        .build()
        .map_err(|e| FilterError::ResourceExhaustion(format!("thread pool: {e}")))?;

    let completed: Vec<AtomicBool> = bands.iter().map(|_| AtomicBool::new(false)).collect();
    let views = split_bands(output.view_mut(), &bands);

    let stopwatch = Stopwatch::start();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        pool.scope(|s| {
            for (band, view) in bands.iter().zip(views) {
                let kernel = &kernel;
                let compute = &compute;
                let done = &completed[band.index];
                s.spawn(move |_| {
                    compute(band, image, kernel, view);
                    done.store(true, Ordering::Release);
                });
            }
        })
    }));
    let timing = stopwatch.finish(Variant::SharedMemory, kernel.size(), threads);

    if outcome.is_err() {
        let band = completed
            .iter()
            .position(|done| !done.load(Ordering::Acquire))
            .unwrap_or(0);
        warn!("shared: worker for band {band} panicked, discarding output");
        return Err(FilterError::worker(band, "worker thread panicked"));
    }

    info!("shared pass ({threads} threads) finished in {:.3} ms", timing.elapsed_ms());
    Ok(FilterOutput {
        image: output,
        timing,
    })
}

/// Carve `output` into one mutable view per band, in band order.
fn split_bands<'a>(
    output: ArrayViewMut3<'a, u8>,
    bands: &[PartitionDescriptor],
) -> Vec<ArrayViewMut3<'a, u8>> {
    let mut views = Vec::with_capacity(bands.len());
    let mut rest = output;
    for band in bands {
        let (head, tail) = rest.split_at(Axis(0), band.len());
        views.push(head);
        rest = tail;
    }
    views
}
