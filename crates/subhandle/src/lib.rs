#![doc = include_str!("../README.md")]

mod denylist;
mod error;
mod handle;
mod registry;
mod resolver;
mod store;

pub use denylist::*;
pub use error::*;
pub use handle::*;
pub use registry::*;
pub use resolver::*;
pub use store::*;
