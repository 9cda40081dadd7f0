#![warn(missing_docs)]

//! Parallel primitives executed on a compute device.
//!
//! - [runtime]: allocations, streams, graphs and the cube scheduler.
//! - [block]: cooperative algorithms over the units of a cube.
//! - Device primitives, re-exported at the root: scans, reductions, merge sort, searches and
//!   the [segmented] variants.

pub use cubeprim_common::*;
pub use cubeprim_device::*;

pub use cubeprim_block as block;
pub use cubeprim_runtime as runtime;

pub use cubeprim_runtime::{ComputeClient, DeviceProperties, DeviceSlice, Handle, Stream};
