#![warn(missing_docs)]

//! Device-wide primitives of cubeprim.
//!
//! Every primitive follows the same two call protocol. Called without temporary storage, it only
//! writes the number of bytes of temporary storage it needs into `storage_size`:
//!
//! ```ignore
//! let mut storage_size = 0;
//! inclusive_scan(None, &mut storage_size, input.clone(), &output, len, Plus, &stream, false)?;
//! let storage = client.empty(storage_size);
//! inclusive_scan(Some(&storage), &mut storage_size, input, &output, len, Plus, &stream, false)?;
//! stream.sync()?;
//! ```
//!
//! Called with temporary storage, it checks its size and submits its kernels to the stream
//! without waiting for them. Errors raised by the kernels surface when the stream is
//! synchronized, unless `debug_synchronous` is set, in which case every stage is synchronized
//! and checked.

#[macro_use]
extern crate derive_new;

mod binary_search;
mod config;
mod error;
mod iterator;
mod launch;
mod lookback;
mod merge_sort;
mod partition;
mod reduce;
mod scan;
mod search;
mod temp_storage;

/// Primitives operating independently on every segment of a sequence.
pub mod segmented;

pub use binary_search::*;
pub use config::*;
pub use error::*;
pub use iterator::*;
pub use lookback::{LookbackLayout, LookbackState, TileStatus};
pub use merge_sort::*;
pub use partition::*;
pub use reduce::*;
pub use scan::*;
pub use search::*;
pub use temp_storage::*;

#[cfg(feature = "export_tests")]
#[allow(missing_docs)]
pub mod tests;
