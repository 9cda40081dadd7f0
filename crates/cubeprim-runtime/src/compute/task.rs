use crate::{CubeCount, CubeKernel, storage::Handle};
use core::fmt::Debug;
use std::sync::Arc;

/// Work executed in order by a stream.
#[derive(Clone)]
pub(crate) enum Task {
    Launch {
        kernel: Arc<dyn CubeKernel>,
        cube_count: CubeCount,
        cube_offset: u64,
    },
    Write {
        data: Arc<[u8]>,
        handle: Handle,
    },
    Copy {
        source: Handle,
        destination: Handle,
    },
}

impl Debug for Task {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Task::Launch {
                kernel,
                cube_count,
                cube_offset,
            } => f
                .debug_struct("Launch")
                .field("kernel", &kernel.name())
                .field("cube_count", cube_count)
                .field("cube_offset", cube_offset)
                .finish(),
            Task::Write { data, handle } => f
                .debug_struct("Write")
                .field("bytes", &data.len())
                .field("handle", handle)
                .finish(),
            Task::Copy {
                source,
                destination,
            } => f
                .debug_struct("Copy")
                .field("source", source)
                .field("destination", destination)
                .finish(),
        }
    }
}
