//! ParaVision high-pass filter engine
//!
//! Edge-enhancing high-pass filtering of 8-bit raster images, implemented
//! three ways so throughput can be compared across concurrency models:
//! sequential, shared-memory threads, and message-passing ranks. All three
//! produce identical pixels for the same input.
//!
//! ## Image Format
//! Images are `ndarray` buffers shaped `(height, width, channels)`:
//! - **Grayscale**: (height, width, 1)
//! - **RGB**: (height, width, 3)
//! - **RGBA**: (height, width, 4)
//!
//! Every channel is filtered independently.
//!
//! ## Filter Contract
//! - Kernel: `k x k` (odd, 3-11), all weights `-1` except a center of
//!   `k*k - 1`, summing to 0
//! - Borders: edge replication
//! - Output: integer sum clamped to 0-255, same dimensions as the input
//!
//! ## Bindings
//! Python bindings via PyO3 (`python` feature) and WASM bindings for
//! JavaScript (`wasm` feature).

pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod timing;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::{ConfigError, FilterConfig};
pub use engine::{run, FilterOutput, Variant};
pub use error::{FilterError, Result};
pub use filters::kernel::{build_high_pass_kernel, Kernel};
pub use timing::TimingRecord;

// Python bindings (only when python feature is enabled)
#[cfg(feature = "python")]
mod python {
    use numpy::{IntoPyArray, PyArray3, PyReadonlyArray3};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    use crate::config::FilterConfig;
    use crate::engine::{self, Variant};
    use crate::error::FilterError;
    use crate::filters::grayscale::GrayscaleMethod;

    fn to_py_err(err: FilterError) -> PyErr {
        match err {
            FilterError::InvalidParameter { .. } => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }

    /// Apply the high-pass filter.
    ///
    /// # Arguments
    /// * `image` - u8 image (height, width, channels)
    /// * `kernel_size` - Odd kernel size, 3-11
    /// * `mode` - "sequential"/"seq", "shared"/"omp", "distributed"/"mpi"
    /// * `workers` - Thread or process count for the parallel modes
    ///
    /// # Returns
    /// Tuple of (filtered image, elapsed seconds)
    #[pyfunction]
    #[pyo3(signature = (image, kernel_size=3, mode="sequential", workers=1))]
    pub fn high_pass_filter<'py>(
        py: Python<'py>,
        image: PyReadonlyArray3<'py, u8>,
        kernel_size: usize,
        mode: &str,
        workers: usize,
    ) -> PyResult<(Bound<'py, PyArray3<u8>>, f64)> {
        let variant: Variant = mode.parse().map_err(PyValueError::new_err)?;
        let config = FilterConfig::new(variant, kernel_size).with_workers(workers);
        let input = image.as_array();

        let output = py
            .allow_threads(|| engine::run(input, &config))
            .map_err(to_py_err)?;
        let seconds = output.timing.elapsed_secs();
        Ok((output.image.into_pyarray(py), seconds))
    }

    /// Reduce a 1, 3 or 4 channel image to (height, width, 1).
    ///
    /// `method` is "average" (default) or "bt709".
    #[pyfunction]
    #[pyo3(signature = (image, method="average"))]
    pub fn to_grayscale<'py>(
        py: Python<'py>,
        image: PyReadonlyArray3<'py, u8>,
        method: &str,
    ) -> PyResult<Bound<'py, PyArray3<u8>>> {
        let method: GrayscaleMethod = method.parse().map_err(PyValueError::new_err)?;
        Ok(method.apply(image.as_array()).into_pyarray(py))
    }

    /// ParaVision Rust extension module
    #[pymodule]
    pub fn paravision(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(high_pass_filter, m)?)?;
        m.add_function(wrap_pyfunction!(to_grayscale, m)?)?;
        Ok(())
    }
}

#[cfg(feature = "python")]
pub use python::paravision;
