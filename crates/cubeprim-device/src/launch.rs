use crate::{PrimError, TilePartition};
use cubeprim_runtime::{CubeKernel, Stream};
use std::time::Instant;

/// Launch `kernel` once per launch of the partition.
pub(crate) fn launch_tiles<K: CubeKernel + Clone>(
    stream: &Stream,
    kernel: &K,
    partition: &TilePartition,
) -> Result<(), PrimError> {
    for launch in partition.launches() {
        stream.launch_with_offset(kernel.clone(), launch.cube_count, launch.cube_offset)?;
    }
    Ok(())
}

/// Tracks the stages of a primitive, synchronizing after each one in debug mode.
pub(crate) struct Stages<'a> {
    primitive: &'static str,
    stream: &'a Stream,
    debug_synchronous: bool,
    start: Instant,
}

impl<'a> Stages<'a> {
    pub(crate) fn new(primitive: &'static str, stream: &'a Stream, debug_synchronous: bool) -> Self {
        Self {
            primitive,
            stream,
            debug_synchronous,
            start: Instant::now(),
        }
    }

    /// Mark the end of the submission of `stage`.
    pub(crate) fn finish(&mut self, stage: &str) -> Result<(), PrimError> {
        if !self.debug_synchronous {
            return Ok(());
        }

        if self.stream.is_capturing() {
            log::warn!(
                "{}: skipping synchronization after {stage}, stream {} is capturing",
                self.primitive,
                self.stream.id().value
            );
            return Ok(());
        }

        self.stream.sync()?;
        log::debug!(
            "{}: {stage} completed in {:?}",
            self.primitive,
            self.start.elapsed()
        );
        self.start = Instant::now();
        Ok(())
    }
}
