#![warn(missing_docs)]

//! Execution runtime of cubeprim.
//!
//! A [ComputeClient] owns a pool of workers that execute the cubes of launched kernels. Work is
//! submitted to [streams](Stream), which execute it asynchronously and in order, and can record
//! it into [graphs](Graph) to be replayed later.

#[macro_use]
extern crate derive_new;

mod client;
mod compute;
mod graph;
mod kernel;
mod stream;

/// Configuration module.
pub mod config;
/// Execution logging module.
pub mod logging;
/// Error types of the runtime.
pub mod server;
/// Device memory module.
pub mod storage;

pub use client::*;
pub use graph::*;
pub use kernel::*;
pub use storage::{DeviceSlice, Handle};
pub use stream::*;
