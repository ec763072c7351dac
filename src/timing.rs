//! Wall-clock timing of filter passes.
//!
//! Each engine starts a [`Stopwatch`] at the beginning of the region it is
//! responsible for and finalizes it into one [`TimingRecord`] per pass. The
//! record is what the reporting side consumes, either as the plain-text
//! `time.txt` report or as JSON.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

use crate::engine::Variant;

/// Running wall-clock measurement.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop and tag the measurement.
    pub fn finish(self, variant: Variant, kernel_size: usize, workers: usize) -> TimingRecord {
        TimingRecord {
            variant,
            elapsed: self.elapsed(),
            kernel_size,
            workers,
        }
    }
}

/// Elapsed time of one filter pass, tagged with the variant that ran it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingRecord {
    pub variant: Variant,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub kernel_size: usize,
    /// Thread or process count; 1 for the sequential variant.
    pub workers: usize,
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(elapsed.as_secs_f64())
}

impl TimingRecord {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Write the plain-text report read by the front-end.
    ///
    /// ```text
    /// Variant: distributed
    /// Execution time: 12.345 ms
    /// Processes: 4
    /// Kernel size used: 5
    /// ```
    pub fn write_report<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "Variant: {}", self.variant)?;
        writeln!(out, "Execution time: {:.3} ms", self.elapsed_ms())?;
        match self.variant {
            Variant::Sequential => {}
            Variant::SharedMemory => writeln!(out, "Threads: {}", self.workers)?,
            Variant::Distributed => writeln!(out, "Processes: {}", self.workers)?,
        }
        writeln!(out, "Kernel size used: {}", self.kernel_size)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
