#![warn(missing_docs)]

//! Cooperative primitives executed by all the units of a cube.
//!
//! Block primitives operate on the items of a tile held by the units of a cube in blocked
//! arrangement: unit `u` owns items `u * items_per_unit .. (u + 1) * items_per_unit`. Units run
//! in lockstep phases, communicating through scratch memory carved from the shared memory of
//! the cube with a [SharedLayout].

#[macro_use]
extern crate derive_new;

mod adjacent_difference;
mod layout;
mod merge;
mod radix_rank;
mod reduce;
mod scan;
mod shared;
mod sort;

pub use adjacent_difference::*;
pub use layout::*;
pub use merge::*;
pub use radix_rank::*;
pub use reduce::*;
pub use scan::*;
pub use shared::*;
pub use sort::*;
