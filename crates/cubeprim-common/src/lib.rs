#![warn(missing_docs)]

//! Element types, operators and radix keys shared by the cubeprim crates.

#[macro_use]
extern crate derive_new;

mod element;
mod operator;
mod radix;
mod vector;

pub use element::*;
pub use operator::*;
pub use radix::*;
pub use vector::*;

pub use half::{bf16, f16};
