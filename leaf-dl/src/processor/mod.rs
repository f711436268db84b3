//! Image preprocessing and augmentation.

mod color_jitter;
mod preprocess;
mod preview;
mod random_affine;
mod random_resized_crop;
mod transform;

pub use color_jitter::*;
pub use preprocess::*;
pub use preview::*;
pub use random_affine::*;
pub use random_resized_crop::*;
pub use transform::*;
