//! Filter engines.
//!
//! Three interchangeable strategies share one numeric contract: same kernel,
//! same edge-replication rule, same clamping. For any valid input they return
//! identical pixels.
//!
//! | Variant | Concurrency | Module |
//! |---------|-------------|--------|
//! | Sequential | calling thread | [`sequential`] |
//! | Shared memory | rayon pool over disjoint output bands | [`shared`] |
//! | Distributed | coordinator + message-passing workers | [`distributed`] |

use std::fmt;
use std::str::FromStr;

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::error::Result;
use crate::timing::TimingRecord;

pub mod distributed;
pub mod partition;
pub mod sequential;
pub mod shared;

pub use distributed::{BandWorker, ConvolutionWorker, DistributedEngine, GatherMessage, ScatterMessage};
pub use partition::{partition_rows, PartitionDescriptor};

/// Execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Variant {
    #[default]
    #[serde(rename = "sequential", alias = "seq")]
    Sequential,
    #[serde(rename = "shared", alias = "omp", alias = "openmp", alias = "threads")]
    SharedMemory,
    #[serde(rename = "distributed", alias = "mpi", alias = "processes")]
    Distributed,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Sequential, Variant::SharedMemory, Variant::Distributed];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Sequential => "sequential",
            Variant::SharedMemory => "shared",
            Variant::Distributed => "distributed",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(Variant::Sequential),
            "shared" | "omp" | "openmp" | "threads" => Ok(Variant::SharedMemory),
            "distributed" | "mpi" | "processes" => Ok(Variant::Distributed),
            other => Err(format!("unknown mode '{other}' (expected seq, omp or mpi)")),
        }
    }
}

/// Result of a successful pass.
#[derive(Debug, Clone)]
pub struct FilterOutput {
    /// Filtered image, same dimensions as the input.
    pub image: Array3<u8>,
    pub timing: TimingRecord,
}

/// Run the variant selected by `config`.
pub fn run(image: ArrayView3<u8>, config: &FilterConfig) -> Result<FilterOutput> {
    match config.variant {
        Variant::Sequential => sequential::run(image, config),
        Variant::SharedMemory => shared::run(image, config),
        Variant::Distributed => distributed::run(image, config),
    }
}
