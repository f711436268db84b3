//! Building blocks for training and serving a leaf disease classifier.

pub mod batch;
pub mod checkpoint;
mod common;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod optim;
pub mod processor;
pub mod serde_opt_device;

pub use error::*;
