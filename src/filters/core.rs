//! Core convolution shared by every engine.
//!
//! This module provides the per-pixel rule all three engines run:
//! - Edge replication at the borders (coordinates clamp into the source)
//! - Integer accumulation, clamped to 0-255 with no wraparound
//! - Channels filtered independently
//!
//! Engines differ only in which rows they hand to [`convolve_rows`] and where
//! the results land.

use std::ops::Range;

use ndarray::{Array3, ArrayView3, ArrayViewMut3};

use super::kernel::Kernel;
use crate::error::{FilterError, Result};

/// Clamp an accumulated sum into the 8-bit sample range.
#[inline]
pub fn clamp_sample(sum: i32) -> u8 {
    sum.clamp(0, 255) as u8
}

/// Filter a single sample at `(y, x, c)` of `source`.
///
/// Neighbors outside `source` are replaced by the nearest edge sample.
#[inline]
pub fn convolve_pixel(source: &ArrayView3<u8>, kernel: &Kernel, y: usize, x: usize, c: usize) -> u8 {
    let (height, width, _) = source.dim();
    let r = kernel.radius() as isize;
    let max_y = height as isize - 1;
    let max_x = width as isize - 1;

    let mut sum = 0i32;
    for dy in -r..=r {
        let sy = (y as isize + dy).clamp(0, max_y) as usize;
        for dx in -r..=r {
            let sx = (x as isize + dx).clamp(0, max_x) as usize;
            sum += source[[sy, sx, c]] as i32 * kernel.weight(dy, dx);
        }
    }

    clamp_sample(sum)
}

/// Convolve `rows` of `source` into `out`.
///
/// `rows` is expressed in `source` coordinates; `out` must have exactly
/// `rows.len()` rows and the same width and channel count as `source`. Rows of
/// `source` outside `rows` are only read, never written, which is what lets a
/// worker hold halo context it does not own.
pub fn convolve_rows(
    source: ArrayView3<u8>,
    kernel: &Kernel,
    rows: Range<usize>,
    mut out: ArrayViewMut3<u8>,
) {
    let (_, width, channels) = source.dim();
    debug_assert_eq!(out.dim(), (rows.len(), width, channels));

    for (oy, y) in rows.enumerate() {
        for x in 0..width {
            for c in 0..channels {
                out[[oy, x, c]] = convolve_pixel(&source, kernel, y, x, c);
            }
        }
    }
}

/// Reject buffers with a zero dimension.
pub fn validate_image(image: &ArrayView3<u8>) -> Result<()> {
    let (height, width, channels) = image.dim();
    if height == 0 || width == 0 || channels == 0 {
        return Err(FilterError::invalid(
            "image",
            format!("dimensions must be non-zero, got {height}x{width}x{channels}"),
        ));
    }
    Ok(())
}

/// Allocate a zeroed output buffer, reporting allocation failure instead of
/// aborting.
pub fn alloc_output(dim: (usize, usize, usize)) -> Result<Array3<u8>> {
    let (height, width, channels) = dim;
    let len = height
        .checked_mul(width)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| {
            FilterError::ResourceExhaustion(format!(
                "output size {height}x{width}x{channels} overflows"
            ))
        })?;

    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|e| {
        FilterError::ResourceExhaustion(format!("cannot allocate {len} output samples: {e}"))
    })?;
    data.resize(len, 0u8);

    Array3::from_shape_vec(dim, data)
        .map_err(|e| FilterError::ResourceExhaustion(format!("output buffer shape: {e}")))
}
