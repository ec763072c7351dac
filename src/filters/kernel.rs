//! High-pass kernel construction.
//!
//! The kernel is the negative of an unnormalized box filter with the center
//! boosted to `k*k - 1`:
//!
//! ```text
//! k = 3:   -1 -1 -1
//!          -1  8 -1
//!          -1 -1 -1
//! ```
//!
//! Weights sum to 0, so smooth regions map to 0 and only edges survive the
//! final clamp to 0-255. Weights are integers, which keeps every engine
//! bit-identical regardless of how the image is split up.

use ndarray::{Array2, ArrayView2};

use crate::error::{FilterError, Result};

/// Smallest accepted kernel side length.
pub const MIN_KERNEL_SIZE: usize = 3;
/// Largest accepted kernel side length.
pub const MAX_KERNEL_SIZE: usize = 11;

/// Square, odd-sized convolution kernel with integer weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    weights: Array2<i32>,
}

impl Kernel {
    /// Side length `k`.
    pub fn size(&self) -> usize {
        self.weights.nrows()
    }

    /// Number of neighbor rows/columns on each side of the center, `(k-1)/2`.
    pub fn radius(&self) -> usize {
        self.size() / 2
    }

    /// Weight at offset `(dy, dx)` from the center.
    #[inline]
    pub fn weight(&self, dy: isize, dx: isize) -> i32 {
        let r = self.radius() as isize;
        self.weights[[(dy + r) as usize, (dx + r) as usize]]
    }

    /// Sum of all weights (the DC response).
    pub fn sum(&self) -> i32 {
        self.weights.sum()
    }

    pub fn view(&self) -> ArrayView2<'_, i32> {
        self.weights.view()
    }
}

/// Check that `size` is an odd kernel side length in `3..=11`.
pub fn validate_kernel_size(size: usize) -> Result<()> {
    if !(MIN_KERNEL_SIZE..=MAX_KERNEL_SIZE).contains(&size) {
        return Err(FilterError::invalid(
            "kernel_size",
            format!("must be between {MIN_KERNEL_SIZE} and {MAX_KERNEL_SIZE}, got {size}"),
        ));
    }
    if size % 2 == 0 {
        return Err(FilterError::invalid(
            "kernel_size",
            format!("must be odd, got {size}"),
        ));
    }
    Ok(())
}

/// Build the `size x size` high-pass kernel.
///
/// # Errors
/// `InvalidParameter` for even sizes or sizes outside `3..=11`.
pub fn build_high_pass_kernel(size: usize) -> Result<Kernel> {
    validate_kernel_size(size)?;

    let mut weights = Array2::<i32>::from_elem((size, size), -1);
    let center = size / 2;
    weights[[center, center]] = (size * size - 1) as i32;

    Ok(Kernel { weights })
}
