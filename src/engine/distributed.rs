//! Distributed-memory engine.
//!
//! Modeled as cooperating ranks that share nothing and talk only through
//! channels, the way an MPI job would:
//!
//! 1. Rank 0, the coordinator, owns the full image. It partitions the rows
//!    into `processes` bands and sends every other rank an owned copy of its
//!    band plus `(k-1)/2` halo rows on each side (clamped at the image border)
//!    together with an owned copy of the kernel.
//! 2. Each worker rank runs on its own OS thread, computes only its assigned
//!    rows (halo rows are read-only context) and sends the band back.
//! 3. The coordinator computes band 0 itself, blocks until every band has
//!    arrived, and copies the bands into the output in row order.
//!
//! Gather is all-or-nothing. A rank that panics, reports an error or returns
//! a band of the wrong shape fails the whole pass with
//! [`FilterError::WorkerFailure`] naming its band.
//!
//! `worker_timeout` is one deadline for the whole gather, not per reply. When
//! it passes, the lowest missing band is reported and ranks still computing
//! are abandoned: their threads are detached, run to completion on their own
//! band copies, and their replies go nowhere.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use log::{debug, info, warn};
use ndarray::{s, Array3, ArrayView3};

use super::partition::{partition_rows, PartitionDescriptor};
use super::{FilterOutput, Variant};
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filters::core::{alloc_output, convolve_rows, validate_image};
use crate::filters::kernel::{build_high_pass_kernel, Kernel};
use crate::timing::Stopwatch;

/// Coordinator to worker: one band with its halo context.
#[derive(Debug, Clone)]
pub struct ScatterMessage {
    pub rank: usize,
    pub partition: PartitionDescriptor,
    pub kernel: Kernel,
    /// Input rows `partition.halo`, owned by the receiving rank.
    pub rows: Array3<u8>,
}

/// Worker to coordinator: the computed band, or why it could not be computed.
#[derive(Debug, Clone)]
pub struct GatherMessage {
    pub rank: usize,
    pub result: std::result::Result<Array3<u8>, String>,
}

/// Computation a worker rank performs on its scattered band.
///
/// Must return exactly `task.partition.len()` rows with the width and channel
/// count of `task.rows`.
pub trait BandWorker: Send + Sync {
    fn compute(&self, task: &ScatterMessage) -> Result<Array3<u8>>;
}

/// Default worker: the high-pass convolution over the assigned rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvolutionWorker;

impl BandWorker for ConvolutionWorker {
    fn compute(&self, task: &ScatterMessage) -> Result<Array3<u8>> {
        let (_, width, channels) = task.rows.dim();
        let mut out = alloc_output((task.partition.len(), width, channels))?;
        convolve_rows(
            task.rows.view(),
            &task.kernel,
            task.partition.local_rows(),
            out.view_mut(),
        );
        Ok(out)
    }
}

/// Coordinator for a distributed pass.
pub struct DistributedEngine {
    worker: Arc<dyn BandWorker>,
}

impl Default for DistributedEngine {
    fn default() -> Self {
        Self::new(Arc::new(ConvolutionWorker))
    }
}

impl DistributedEngine {
    /// Use `worker` on every rank other than the coordinator.
    pub fn new(worker: Arc<dyn BandWorker>) -> Self {
        Self { worker }
    }

    /// Filter `image` across `config.processes` ranks.
    ///
    /// Timing runs from partitioning to the end of reassembly, so scatter and
    /// gather are included.
    pub fn run(&self, image: ArrayView3<u8>, config: &FilterConfig) -> Result<FilterOutput> {
        config.validate_for(Variant::Distributed)?;
        validate_image(&image)?;
        let kernel = build_high_pass_kernel(config.kernel_size)?;
        let processes = config.processes;
        let (height, width, channels) = image.dim();

        let stopwatch = Stopwatch::start();
        let partitions = partition_rows(height, processes, kernel.radius())?;
        debug!(
            "distributed: {height}x{width}x{channels}, k={}, {processes} ranks",
            kernel.size()
        );

        let mut bands: Vec<Option<Array3<u8>>> = Vec::new();
        bands
            .try_reserve_exact(processes)
            .map_err(|e| FilterError::ResourceExhaustion(format!("gather slots: {e}")))?;
        bands.resize_with(processes, || None);
        let (gather_tx, gather_rx) = unbounded();
        let mut handles = Vec::new();
        handles
            .try_reserve_exact(processes - 1)
            .map_err(|e| FilterError::ResourceExhaustion(format!("rank handles: {e}")))?;
        for partition in partitions.iter().skip(1) {
            handles.push(self.scatter(image, &kernel, partition, &gather_tx)?);
        }
        // Only workers hold senders now, so a disconnect means they all exited.
        drop(gather_tx);

        let own = &partitions[0];
        let mut own_rows = alloc_output((own.len(), width, channels))?;
        convolve_rows(
            image.slice(s![own.halo.clone(), .., ..]),
            &kernel,
            own.local_rows(),
            own_rows.view_mut(),
        );
        bands[0] = Some(own_rows);

        // Dropping `handles` on error detaches ranks that are still running.
        gather(&gather_rx, &partitions, &mut bands, config, (width, channels))?;

        for (rank, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                return Err(FilterError::worker(rank + 1, "worker panicked after replying"));
            }
        }

        let mut output = alloc_output(image.dim())?;
        for (partition, band) in partitions.iter().zip(bands) {
            let band = band.ok_or_else(|| FilterError::worker(partition.index, "band missing at reassembly"))?;
            output
                .slice_mut(s![partition.rows.clone(), .., ..])
                .assign(&band);
        }
        let timing = stopwatch.finish(Variant::Distributed, kernel.size(), processes);

        info!(
            "distributed pass ({processes} ranks) finished in {:.3} ms",
            timing.elapsed_ms()
        );
        Ok(FilterOutput {
            image: output,
            timing,
        })
    }

    /// Start one worker rank and send it its band.
    fn scatter(
        &self,
        image: ArrayView3<u8>,
        kernel: &Kernel,
        partition: &PartitionDescriptor,
        gather_tx: &Sender<GatherMessage>,
    ) -> Result<JoinHandle<()>> {
        let rank = partition.index;
        let (scatter_tx, scatter_rx) = bounded(1);
        let outbox = gather_tx.clone();
        let worker = Arc::clone(&self.worker);

        let handle = thread::Builder::new()
            .name(format!("hpf-rank-{rank}"))
            .spawn(move || worker_main(rank, scatter_rx, outbox, worker))
            .map_err(|e| FilterError::ResourceExhaustion(format!("spawning rank {rank}: {e}")))?;

        debug!(
            "distributed: scatter rank {rank} rows {:?} with halo {:?}",
            partition.rows, partition.halo
        );
        let message = ScatterMessage {
            rank,
            partition: partition.clone(),
            kernel: kernel.clone(),
            rows: image.slice(s![partition.halo.clone(), .., ..]).to_owned(),
        };
        scatter_tx
            .send(message)
            .map_err(|_| FilterError::worker(rank, "worker exited before receiving its band"))?;

        Ok(handle)
    }
}

/// Filter `image` with the default convolution worker.
pub fn run(image: ArrayView3<u8>, config: &FilterConfig) -> Result<FilterOutput> {
    DistributedEngine::default().run(image, config)
}

fn worker_main(
    rank: usize,
    inbox: Receiver<ScatterMessage>,
    outbox: Sender<GatherMessage>,
    worker: Arc<dyn BandWorker>,
) {
    let Ok(task) = inbox.recv() else {
        debug!("rank {rank}: coordinator hung up before scatter");
        return;
    };
    let result = worker.compute(&task).map_err(|e| e.to_string());
    if outbox.send(GatherMessage { rank, result }).is_err() {
        debug!("rank {rank}: coordinator gone, dropping band");
    }
}

/// Block until every missing band has arrived, a worker is known lost, or
/// the gather deadline passes.
fn gather(
    gather_rx: &Receiver<GatherMessage>,
    partitions: &[PartitionDescriptor],
    bands: &mut [Option<Array3<u8>>],
    config: &FilterConfig,
    (width, channels): (usize, usize),
) -> Result<()> {
    // A timeout too large to represent as an Instant never expires.
    let deadline = config
        .worker_timeout
        .and_then(|timeout| Instant::now().checked_add(timeout).map(|at| (timeout, at)));

    while bands.iter().any(Option::is_none) {
        let received = match deadline {
            Some((timeout, at)) => gather_rx.recv_deadline(at).map_err(|e| match e {
                RecvTimeoutError::Timeout => format!("no reply within {timeout:?} of gather start"),
                RecvTimeoutError::Disconnected => "worker exited without returning its band".to_string(),
            }),
            None => gather_rx
                .recv()
                .map_err(|_| "worker exited without returning its band".to_string()),
        };

        let message = match received {
            Ok(message) => message,
            Err(reason) => {
                let band = bands.iter().position(Option::is_none).unwrap_or(0);
                warn!("distributed: band {band} lost: {reason}");
                return Err(FilterError::worker(band, reason));
            }
        };

        let rank = message.rank;
        let rows = message.result.map_err(|reason| {
            warn!("distributed: rank {rank} reported failure: {reason}");
            FilterError::worker(rank, reason)
        })?;

        let expected = (partitions[rank].len(), width, channels);
        if rows.dim() != expected {
            return Err(FilterError::worker(
                rank,
                format!("returned shape {:?}, expected {expected:?}", rows.dim()),
            ));
        }
        debug!("distributed: gathered rank {rank}");
        bands[rank] = Some(rows);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::sequential;

    fn gradient_image(h: usize, w: usize, c: usize) -> Array3<u8> {
        Array3::from_shape_fn((h, w, c), |(y, x, ch)| ((y * y * 3 + x * 29 + ch * 71) % 256) as u8)
    }

    fn config(k: usize, processes: usize) -> FilterConfig {
        FilterConfig::new(Variant::Distributed, k).with_processes(processes)
    }

    struct FailOnRank<F> {
        rank: usize,
        fail: F,
    }

    impl<F> BandWorker for FailOnRank<F>
    where
        F: Fn(&ScatterMessage) -> Result<Array3<u8>> + Send + Sync,
    {
        fn compute(&self, task: &ScatterMessage) -> Result<Array3<u8>> {
            if task.rank == self.rank {
                (self.fail)(task)
            } else {
                ConvolutionWorker.compute(task)
            }
        }
    }

    #[test]
    fn test_single_process_equals_sequential() {
        let img = gradient_image(12, 10, 1);
        let seq = sequential::run(img.view(), &FilterConfig::new(Variant::Sequential, 3)).unwrap();
        let dist = run(img.view(), &config(3, 1)).unwrap();
        assert_eq!(dist.image, seq.image);
    }

    #[test]
    fn test_bands_with_halo_equal_sequential() {
        let img = gradient_image(19, 8, 3);
        for k in [3, 5, 9, 11] {
            let seq = sequential::run(img.view(), &FilterConfig::new(Variant::Sequential, k)).unwrap();
            for processes in [2, 3, 4, 7, 19, 25] {
                let dist = run(img.view(), &config(k, processes)).unwrap();
                assert_eq!(dist.image, seq.image, "k={k} processes={processes}");
            }
        }
    }

    #[test]
    fn test_workers_receive_halo_rows() {
        struct CheckHalo;
        impl BandWorker for CheckHalo {
            fn compute(&self, task: &ScatterMessage) -> Result<Array3<u8>> {
                assert_eq!(task.rows.dim().0, task.partition.halo.len());
                assert!(task.partition.halo.start <= task.partition.rows.start);
                assert!(task.partition.halo.end >= task.partition.rows.end);
                ConvolutionWorker.compute(task)
            }
        }

        let img = gradient_image(16, 5, 1);
        let engine = DistributedEngine::new(Arc::new(CheckHalo));
        let out = engine.run(img.view(), &config(5, 4)).unwrap();
        let seq = sequential::run(img.view(), &FilterConfig::new(Variant::Sequential, 5)).unwrap();
        assert_eq!(out.image, seq.image);
    }

    #[test]
    fn test_killed_worker_is_worker_failure() {
        let img = gradient_image(20, 6, 1);
        let engine = DistributedEngine::new(Arc::new(FailOnRank {
            rank: 2,
            fail: |_: &ScatterMessage| -> Result<Array3<u8>> { panic!("rank killed") },
        }));

        let err = engine.run(img.view(), &config(3, 4)).unwrap_err();
        assert_eq!(err.failed_band(), Some(2));
    }

    #[test]
    fn test_worker_error_is_reported_with_band() {
        let img = gradient_image(20, 6, 1);
        let engine = DistributedEngine::new(Arc::new(FailOnRank {
            rank: 3,
            fail: |_: &ScatterMessage| -> Result<Array3<u8>> {
                Err(FilterError::ResourceExhaustion("out of memory".into()))
            },
        }));

        let err = engine.run(img.view(), &config(3, 4)).unwrap_err();
        assert_eq!(err.failed_band(), Some(3));
        assert!(err.to_string().contains("out of memory"));
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let img = gradient_image(20, 6, 1);
        let engine = DistributedEngine::new(Arc::new(FailOnRank {
            rank: 1,
            fail: |task: &ScatterMessage| -> Result<Array3<u8>> { Ok(task.rows.clone()) },
        }));

        let err = engine.run(img.view(), &config(3, 3)).unwrap_err();
        assert_eq!(err.failed_band(), Some(1));
    }

    #[test]
    fn test_hung_worker_times_out() {
        let img = gradient_image(12, 4, 1);
        let engine = DistributedEngine::new(Arc::new(FailOnRank {
            rank: 1,
            fail: |task: &ScatterMessage| -> Result<Array3<u8>> {
                thread::sleep(Duration::from_secs(2));
                ConvolutionWorker.compute(task)
            },
        }));
        let config = config(3, 3).with_worker_timeout(Duration::from_millis(100));

        let err = engine.run(img.view(), &config).unwrap_err();
        assert_eq!(err.failed_band(), Some(1));
        assert!(err.to_string().contains("no reply"));
    }

    #[test]
    fn test_deadline_covers_the_whole_gather() {
        // Replies arrive 500 ms apart, each gap inside the timeout, but rank 2
        // lands after the deadline for the gather as a whole.
        struct Staggered;
        impl BandWorker for Staggered {
            fn compute(&self, task: &ScatterMessage) -> Result<Array3<u8>> {
                thread::sleep(Duration::from_millis(500 * task.rank as u64));
                ConvolutionWorker.compute(task)
            }
        }

        let img = gradient_image(16, 4, 1);
        let engine = DistributedEngine::new(Arc::new(Staggered));
        let config = config(3, 4).with_worker_timeout(Duration::from_millis(900));

        let started = Instant::now();
        let err = engine.run(img.view(), &config).unwrap_err();
        assert_eq!(err.failed_band(), Some(2));
        // Rank 3 is abandoned, not waited for.
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[test]
    fn test_zero_timeout_rejected_before_scatter() {
        let img = gradient_image(40, 8, 1);
        let engine = DistributedEngine::new(Arc::new(FailOnRank {
            rank: 1,
            fail: |_: &ScatterMessage| -> Result<Array3<u8>> { panic!("no rank may start") },
        }));
        let config = config(11, 2).with_worker_timeout(Duration::ZERO);

        match engine.run(img.view(), &config) {
            Err(FilterError::InvalidParameter { name, .. }) => assert_eq!(name, "worker_timeout"),
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_processes_rejected() {
        let img = gradient_image(4, 4, 1);
        assert!(run(img.view(), &config(3, 0)).unwrap_err().is_invalid_parameter());

        let sequential_config = FilterConfig::new(Variant::Sequential, 3).with_processes(0);
        assert!(run(img.view(), &sequential_config).unwrap_err().is_invalid_parameter());
    }

    #[test]
    fn test_unbackable_process_count_is_resource_exhaustion() {
        let img = gradient_image(4, 4, 1);
        match run(img.view(), &config(3, usize::MAX / 4)) {
            Err(FilterError::ResourceExhaustion(_)) => {}
            other => panic!("expected ResourceExhaustion, got {other:?}"),
        }
    }
}
