//! Static row-band partitioning.
//!
//! Bands are computed once per pass from the image height and worker count.
//! Band `i` covers rows `[start_i, end_i)` in ascending order; the first
//! `height % count` bands get one extra row. When `count > height` the
//! trailing bands are empty.

use std::ops::Range;

use serde::Serialize;

use crate::error::{FilterError, Result};

/// Row range owned by one worker, plus the context rows it may read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionDescriptor {
    /// Band index, equal to the worker rank that owns it.
    pub index: usize,
    /// Output rows this band computes.
    pub rows: Range<usize>,
    /// Input rows needed to compute `rows`: `rows` widened by the halo on
    /// each side and clamped to the image.
    pub halo: Range<usize>,
}

impl PartitionDescriptor {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Assigned rows expressed relative to the start of the halo slice.
    pub fn local_rows(&self) -> Range<usize> {
        let offset = self.halo.start;
        (self.rows.start - offset)..(self.rows.end - offset)
    }
}

/// Split `height` rows into `count` balanced bands with `halo` context rows.
///
/// `count` must be at least 1. A count whose descriptors cannot be allocated
/// is [`FilterError::ResourceExhaustion`].
pub fn partition_rows(height: usize, count: usize, halo: usize) -> Result<Vec<PartitionDescriptor>> {
    debug_assert!(count >= 1);
    let base = height / count;
    let extra = height % count;

    let mut bands = Vec::new();
    bands.try_reserve_exact(count).map_err(|e| {
        FilterError::ResourceExhaustion(format!("cannot partition rows into {count} bands: {e}"))
    })?;

    let mut start = 0;
    for index in 0..count {
        let len = base + usize::from(index < extra);
        let end = start + len;
        bands.push(PartitionDescriptor {
            index,
            rows: start..end,
            halo: if len == 0 {
                start..end
            } else {
                start.saturating_sub(halo)..(end + halo).min(height)
            },
        });
        start = end;
    }
    Ok(bands)
}
