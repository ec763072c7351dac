//! Error types for high-pass filter passes.
//!
//! Every failure is fatal to the single pass that raised it and never to the
//! host process. Engines validate parameters before touching any pixel, so an
//! `InvalidParameter` always means no work was done.

use thiserror::Error;

/// Result alias used throughout the engines.
pub type Result<T> = std::result::Result<T, FilterError>;

/// Errors that can abort a filter pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// A parameter was rejected before any compute began.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Human readable explanation.
        reason: String,
    },

    /// A worker did not return a usable result for its band.
    #[error("worker for band {band} failed: {reason}")]
    WorkerFailure {
        /// Index of the first band with no result.
        band: usize,
        /// What went wrong with that band.
        reason: String,
    },

    /// Working buffers, threads or channels could not be allocated.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),
}

impl FilterError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        FilterError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn worker(band: usize, reason: impl Into<String>) -> Self {
        FilterError::WorkerFailure {
            band,
            reason: reason.into(),
        }
    }

    /// True for errors raised by parameter validation.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, FilterError::InvalidParameter { .. })
    }

    /// Band index for worker failures.
    pub fn failed_band(&self) -> Option<usize> {
        match self {
            FilterError::WorkerFailure { band, .. } => Some(*band),
            _ => None,
        }
    }
}
