//! Dataset discovery, sample indexing and splitting.

mod catalog;
mod filter;
mod folder;
mod split;

pub use catalog::*;
pub use filter::*;
pub use folder::*;
pub use split::*;
